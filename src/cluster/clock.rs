use tracing::debug;
use super::node::Node;

/// Lamport clock operations over a node's counter. Both operations hold the
/// node's clock lock for their full read-modify-write.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalClock;

impl LogicalClock {
    /// Advance for a send event and return the new value
    pub fn tick(node: &Node) -> u64 {
        let mut clock = node.clock_cell().lock();
        *clock += 1;
        debug!("{} tick -> {}", node.id(), *clock);
        *clock
    }

    /// Merge a received timestamp: `max(local, incoming) + 1`
    pub fn observe(node: &Node, incoming: u64) -> u64 {
        let mut clock = node.clock_cell().lock();
        *clock = (*clock).max(incoming) + 1;
        debug!("{} observe {} -> {}", node.id(), incoming, *clock);
        *clock
    }
}
