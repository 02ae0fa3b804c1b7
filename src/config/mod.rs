//! Configuration Management
//!
//! Provides functionality for:
//! - Loading/saving configuration
//! - Configuration validation
//! - Default configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use crate::error::CoordError;
use crate::types::ExamRecord;
use std::fs;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of simulated nodes, ids `0..node_count`
    #[serde(default = "default_node_count")]
    pub node_count: u16,
    /// Host every endpoint binds to
    #[serde(default = "default_host")]
    pub host: String,
    /// Well-known rendezvous port; node `n` serves on `base_port + n`
    #[serde(default = "default_base_port")]
    pub base_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for daily-rolling JSON logs; console only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Exams preloaded into the record store
    #[serde(default)]
    pub exams: Vec<ExamRecord>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_count: default_node_count(),
            host: default_host(),
            base_port: default_base_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            logging: LoggingConfig::default(),
            exams: Vec::new(),
        }
    }
}

fn default_node_count() -> u16 { 3 }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_base_port() -> u16 { 5000 }
fn default_log_level() -> String { "info".to_string() }

impl ClusterConfig {
    pub fn rendezvous_addr(&self) -> Result<SocketAddr, CoordError> {
        endpoint(&self.host, self.base_port, 0)
    }

    /// Address of the node whose id is `offset`
    pub fn node_addr(&self, offset: u16) -> Result<SocketAddr, CoordError> {
        endpoint(&self.host, self.base_port, offset)
    }
}

/// `host:(base_port + offset)`, the address derivation shared by server
/// and clients
pub fn endpoint(host: &str, base_port: u16, offset: u16) -> Result<SocketAddr, CoordError> {
    let port = base_port
        .checked_add(offset)
        .ok_or_else(|| CoordError::config(format!("Port {} + {} overflows", base_port, offset)))?;
    format!("{}:{}", host, port)
        .parse()
        .map_err(|e| CoordError::config(format!("Invalid address {}:{}: {}", host, port, e)))
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, CoordError> {
        if !path.exists() {
            debug!("Configuration file not found at {:?}, creating default", path);
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CoordError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| CoordError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), CoordError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CoordError::Config(format!("Failed to create config directory: {}", e)))?;
        }
        let contents = serde_yaml::to_string(&self)
            .map_err(|e| CoordError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, contents)
            .map_err(|e| CoordError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoordError> {
        if self.cluster.node_count == 0 {
            return Err(CoordError::config("cluster.node_count must be at least 1"));
        }
        self.cluster.rendezvous_addr()?;
        self.cluster.node_addr(self.cluster.node_count - 1)?;
        Ok(())
    }

    /// Get configuration file path
    pub fn get_config_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".config").join("exam-coord").join("config.yml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yml");
        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            "cluster:\n  node_count: 5\nexams:\n  - id: 1\n    name: DSGT\n    exam_date: 2024-11-04\n    start_time: \"10:00:00\"\n    duration: 90\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.cluster.node_count, 5);
        assert_eq!(config.cluster.base_port, 5000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.exams.len(), 1);
        assert_eq!(config.exams[0].students_registered, 0);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.cluster.node_count = 0;
        assert!(matches!(config.validate(), Err(CoordError::Config(_))));

        config.cluster.node_count = 10;
        config.cluster.base_port = u16::MAX - 2;
        assert!(matches!(config.validate(), Err(CoordError::Config(_))));
    }

    #[test]
    fn test_endpoint_derivation() {
        let cluster = ClusterConfig::default();
        assert_eq!(cluster.rendezvous_addr().unwrap().port(), 5000);
        assert_eq!(cluster.node_addr(2).unwrap().to_string(), "127.0.0.1:5002");
    }
}
