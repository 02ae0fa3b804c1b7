use parking_lot::Mutex;
use tracing::debug;
use crate::error::{CoordError, Result};
use super::node::{Node, NodeSet};

/// Least-loaded placement of new work items
#[derive(Debug, Default)]
pub struct LoadBalancer {
    assign_lock: Mutex<()>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node with minimum load; ties go to the earliest node in membership
    /// order. Selection alone never changes any load.
    pub fn pick_least_loaded<'a>(&self, nodes: &'a NodeSet) -> Result<&'a Node> {
        nodes
            .iter()
            .min_by_key(|node| node.load())
            .ok_or(CoordError::NoNodesAvailable)
    }

    /// Pick and charge one unit of load to the chosen node in one step
    pub fn assign<'a>(&self, nodes: &'a NodeSet) -> Result<&'a Node> {
        let _guard = self.assign_lock.lock();
        let node = self.pick_least_loaded(nodes)?;
        let load = node.add_load();
        debug!("Assigned work to {} (load {})", node.id(), load);
        Ok(node)
    }

    /// Pick the least-loaded node and run `work` on it while holding the
    /// assignment lock. Load is charged only when `work` succeeds.
    pub fn place<'a, T>(&self, nodes: &'a NodeSet, work: impl FnOnce(&'a Node) -> Result<T>) -> Result<T> {
        let _guard = self.assign_lock.lock();
        let node = self.pick_least_loaded(nodes)?;
        let placed = work(node)?;
        let load = node.add_load();
        debug!("Placed work on {} (load {})", node.id(), load);
        Ok(placed)
    }
}
