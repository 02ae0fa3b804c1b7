use parking_lot::RwLock;
use tracing::info;
use crate::error::{CoordError, Result};
use crate::types::NodeId;
use super::node::NodeSet;

/// Closed-membership bully election: the highest id wins. There is no
/// message exchange or failure detection, so the outcome is a pure
/// function of the membership.
#[derive(Debug, Default)]
pub struct CoordinatorElector {
    current: RwLock<Option<NodeId>>,
}

impl CoordinatorElector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Elect over `nodes`, flag exactly one node as coordinator and
    /// remember the result for the rendezvous.
    pub fn elect(&self, nodes: &NodeSet) -> Result<NodeId> {
        let winner = nodes
            .iter()
            .map(|node| node.id())
            .max()
            .ok_or(CoordError::NoNodesAvailable)?;

        // Flags and the remembered result change under one guard
        let mut current = self.current.write();
        for node in nodes.iter() {
            node.set_coordinator(node.id() == winner);
        }
        if *current != Some(winner) {
            info!("{} elected coordinator over {} nodes", winner, nodes.len());
        }
        *current = Some(winner);
        Ok(winner)
    }

    /// Result of the last election, if one has run
    pub fn current(&self) -> Option<NodeId> {
        *self.current.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_id_wins() {
        let nodes = NodeSet::bootstrap(3);
        let elector = CoordinatorElector::new();
        assert_eq!(elector.current(), None);
        assert_eq!(elector.elect(&nodes).unwrap(), NodeId(2));
        assert_eq!(elector.current(), Some(NodeId(2)));
        assert_eq!(nodes.iter().filter(|n| n.is_coordinator()).count(), 1);
    }

    #[test]
    fn test_election_is_idempotent() {
        let nodes = NodeSet::new([NodeId(4), NodeId(9), NodeId(1)]).unwrap();
        let elector = CoordinatorElector::new();
        let first = elector.elect(&nodes).unwrap();
        let second = elector.elect(&nodes).unwrap();
        assert_eq!(first, NodeId(9));
        assert_eq!(first, second);
        assert!(nodes.get(NodeId(9)).unwrap().is_coordinator());
        assert!(!nodes.get(NodeId(4)).unwrap().is_coordinator());
    }

    #[test]
    fn test_empty_membership() {
        let elector = CoordinatorElector::new();
        assert_eq!(elector.elect(&NodeSet::default()).unwrap_err(), CoordError::NoNodesAvailable);
        assert_eq!(elector.current(), None);
    }
}
