//! Coordination Core
//!
//! In-process simulation of a small cluster:
//! - Lamport clocks per node
//! - Highest-id coordinator election
//! - Timestamp-ordered mutual exclusion
//! - Best-effort replication to peers
//! - Least-loaded work placement

pub mod balancer;
pub mod clock;
pub mod election;
pub mod mutex;
pub mod node;
pub mod replication;

pub use balancer::LoadBalancer;
pub use clock::LogicalClock;
pub use election::CoordinatorElector;
pub use mutex::{Abandoned, CriticalSection, CriticalSectionRequest, Grant, MutexManager};
pub use node::{Node, NodeSet};
pub use replication::{ReplicationManager, ReplicationReport};
