//! Cluster Types
//!
//! Value types shared across the coordination core:
//! - Node identification and roles
//! - Requester identities and timestamps for the critical section
//! - Point-in-time node snapshots

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique, totally ordered node identifier. Doubles as the port offset of
/// the node's endpoint relative to the rendezvous address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u16);

impl NodeId {
    pub fn offset(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<u16> for NodeId {
    fn from(id: u16) -> Self {
        NodeId(id)
    }
}

/// Node roles in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Elected node serving session-mutating requests
    Coordinator,
    /// Every other node; receives replicas
    Follower,
}

/// Identity of a party competing for a critical section (a session code,
/// or a node acting on its own behalf).
pub type RequesterId = String;

/// Priority of a critical-section request; lower wins.
pub type Timestamp = u64;

/// Replicated payload: record key to record value.
pub type Record = HashMap<String, serde_json::Value>;

/// Point-in-time view of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub role: NodeRole,
    pub logical_clock: u64,
    pub load: u64,
    pub reachable: bool,
    /// Keys currently held in the node's replica store, sorted
    pub replica_keys: Vec<String>,
}

/// Rendezvous answer: who coordinates, and where to find it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderInfo {
    pub node_id: NodeId,
    pub offset: u16,
}

impl From<NodeId> for LeaderInfo {
    fn from(node_id: NodeId) -> Self {
        Self { node_id, offset: node_id.offset() }
    }
}

/// A client session bound to the coordinator that served its bootstrap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_code: String,
    pub coordinator: NodeId,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
