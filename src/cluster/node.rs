//! Simulated cluster nodes
//!
//! Nodes are logically distinct but live in one process. Each mutable
//! attribute sits behind its own serialisation primitive so that clock
//! ticks, replica merges and load updates on different nodes never contend.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use crate::error::{CoordError, Result};
use crate::types::{NodeId, NodeRole, NodeSnapshot, Record};

#[derive(Debug)]
pub struct Node {
    id: NodeId,
    clock: Mutex<u64>,
    coordinator: AtomicBool,
    load: AtomicU64,
    reachable: AtomicBool,
    replica_store: RwLock<Record>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            clock: Mutex::new(0),
            coordinator: AtomicBool::new(false),
            load: AtomicU64::new(0),
            reachable: AtomicBool::new(true),
            replica_store: RwLock::new(Record::new()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn logical_clock(&self) -> u64 {
        *self.clock.lock()
    }

    pub(crate) fn clock_cell(&self) -> &Mutex<u64> {
        &self.clock
    }

    pub fn is_coordinator(&self) -> bool {
        self.coordinator.load(Ordering::SeqCst)
    }

    pub(crate) fn set_coordinator(&self, value: bool) {
        self.coordinator.store(value, Ordering::SeqCst);
    }

    pub fn role(&self) -> NodeRole {
        if self.is_coordinator() {
            NodeRole::Coordinator
        } else {
            NodeRole::Follower
        }
    }

    pub fn load(&self) -> u64 {
        self.load.load(Ordering::SeqCst)
    }

    /// Record that one more unit of work is owned by this node
    pub fn add_load(&self) -> u64 {
        self.load.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Simulate a peer dropping off (or coming back) for replication
    pub fn set_reachable(&self, reachable: bool) {
        debug!("{} reachable={}", self.id, reachable);
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Key-wise upsert of a replicated record
    pub(crate) fn merge_replica(&self, record: &Record) {
        let mut store = self.replica_store.write();
        for (key, value) in record {
            store.insert(key.clone(), value.clone());
        }
    }

    pub fn replica(&self, key: &str) -> Option<serde_json::Value> {
        self.replica_store.read().get(key).cloned()
    }

    pub fn replica_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.replica_store.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            role: self.role(),
            logical_clock: self.logical_clock(),
            load: self.load(),
            reachable: self.is_reachable(),
            replica_keys: self.replica_keys(),
        }
    }
}

/// Fixed, ordered membership. No joins or leaves after bootstrap.
#[derive(Debug, Default)]
pub struct NodeSet {
    nodes: Vec<Node>,
}

impl NodeSet {
    /// Build a membership from explicit ids, keeping the given order
    pub fn new(ids: impl IntoIterator<Item = NodeId>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for id in ids {
            if !seen.insert(id) {
                return Err(CoordError::config(format!("Duplicate node id {}", id)));
            }
            nodes.push(Node::new(id));
        }
        Ok(Self { nodes })
    }

    /// Nodes `0..count`, the usual bootstrap shape
    pub fn bootstrap(count: u16) -> Self {
        Self {
            nodes: (0..count).map(|i| Node::new(NodeId(i))).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(Node::id).collect()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn require(&self, id: NodeId) -> Result<&Node> {
        self.get(id).ok_or(CoordError::UnknownNode(id))
    }

    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes.iter().map(Node::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_membership() {
        let nodes = NodeSet::bootstrap(3);
        assert_eq!(nodes.ids(), vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert!(nodes.iter().all(|n| n.logical_clock() == 0 && n.load() == 0));
        assert!(nodes.iter().all(|n| !n.is_coordinator()));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = NodeSet::new([NodeId(1), NodeId(1)]).unwrap_err();
        assert!(matches!(err, CoordError::Config(_)));
    }

    #[test]
    fn test_require_unknown_node() {
        let nodes = NodeSet::bootstrap(2);
        assert_eq!(nodes.require(NodeId(9)).unwrap_err(), CoordError::UnknownNode(NodeId(9)));
    }

    #[test]
    fn test_merge_replica_upserts() {
        let node = Node::new(NodeId(0));
        let mut record = Record::new();
        record.insert("a".into(), serde_json::json!(1));
        node.merge_replica(&record);
        record.insert("a".into(), serde_json::json!(2));
        record.insert("b".into(), serde_json::json!(3));
        node.merge_replica(&record);

        assert_eq!(node.replica("a"), Some(serde_json::json!(2)));
        assert_eq!(node.replica_keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
