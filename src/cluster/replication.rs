use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::error::{CoordError, Result};
use crate::types::{NodeId, Record};
use super::clock::LogicalClock;
use super::node::{Node, NodeSet};

/// Per-peer outcome of one replication call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationReport {
    pub source: NodeId,
    pub delivered: Vec<NodeId>,
    pub failed: Vec<NodeId>,
}

impl ReplicationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// The degraded-mode error for this call, if any peer missed it
    pub fn partial_failure(&self) -> Option<CoordError> {
        if self.failed.is_empty() {
            None
        } else {
            Some(CoordError::ReplicationPartialFailure { failed: self.failed.clone() })
        }
    }
}

/// One-directional, best-effort fan-out of committed writes. The source's
/// commit has already happened and is never rolled back here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicationManager;

impl ReplicationManager {
    pub fn new() -> Self {
        Self
    }

    /// Merge `record` into every peer other than `source`, stamping each
    /// delivery with a send tick on the source and a receive on the peer.
    pub fn replicate(&self, source: &Node, record: &Record, peers: &NodeSet) -> ReplicationReport {
        let mut report = ReplicationReport {
            source: source.id(),
            delivered: Vec::new(),
            failed: Vec::new(),
        };

        for peer in peers.iter().filter(|peer| peer.id() != source.id()) {
            match Self::deliver(source, peer, record) {
                Ok(clock) => {
                    debug!("Replicated {} keys {} -> {} (clock {})", record.len(), source.id(), peer.id(), clock);
                    report.delivered.push(peer.id());
                }
                Err(e) => {
                    debug!("Replication {} -> {} failed: {}", source.id(), peer.id(), e);
                    report.failed.push(peer.id());
                }
            }
        }

        if let Some(e) = report.partial_failure() {
            warn!("{}; source {} commit stands", e, source.id());
        }
        report
    }

    fn deliver(source: &Node, peer: &Node, record: &Record) -> Result<u64> {
        if !peer.is_reachable() {
            return Err(CoordError::Connection(format!("{} unreachable", peer.id())));
        }
        let sent = LogicalClock::tick(source);
        peer.merge_replica(record);
        Ok(LogicalClock::observe(peer, sent))
    }
}
