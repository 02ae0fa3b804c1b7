use thiserror::Error;
use std::io;
use crate::types::NodeId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoordError {
    /// Election was asked to run over an empty membership
    #[error("No nodes available")]
    NoNodesAvailable,

    #[error("Unknown coordinator: {0}")]
    UnknownCoordinator(String),

    #[error("Release of {resource} by {requester}, which does not hold it")]
    DoubleRelease { resource: String, requester: String },

    #[error("Conflicting request on {resource}: {requester} already holds or waits for it")]
    ConflictingRequest { resource: String, requester: String },

    #[error("Replication failed for peers {failed:?}")]
    ReplicationPartialFailure { failed: Vec<NodeId> },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Record already exists: {0}")]
    DuplicateRecord(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("System error: {0}")]
    System(String),
}

pub type Result<T> = std::result::Result<T, CoordError>;

impl CoordError {
    pub fn system(msg: impl Into<String>) -> Self {
        CoordError::System(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        CoordError::Config(msg.into())
    }

    /// Degraded-mode errors never fail the operation that produced them.
    pub fn is_degraded(&self) -> bool {
        matches!(self, CoordError::ReplicationPartialFailure { .. } | CoordError::DoubleRelease { .. })
    }
}

impl From<io::Error> for CoordError {
    fn from(e: io::Error) -> Self {
        CoordError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CoordError {
    fn from(e: serde_json::Error) -> Self {
        CoordError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for CoordError {
    fn from(e: serde_yaml::Error) -> Self {
        CoordError::Yaml(e.to_string())
    }
}

impl From<reqwest::Error> for CoordError {
    fn from(e: reqwest::Error) -> Self {
        CoordError::Connection(e.to_string())
    }
}
