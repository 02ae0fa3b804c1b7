pub mod cluster;
pub mod exam;

// Re-export cluster types
pub use cluster::*;
// Re-export exam types
pub use exam::*;
