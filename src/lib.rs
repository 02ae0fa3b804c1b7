pub mod api;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod server;
pub mod store;
pub mod types;

// Re-export common types
pub use config::Config;
pub use coordinator::CoordinationContext;
pub use error::{CoordError, Result};
pub use server::Server;
