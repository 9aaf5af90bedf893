//! Warehouse connection configuration
//!
//! Pipelines reference a connection by id (e.g. `cdw-impala`). The ids are
//! resolved through a YAML connections file:
//!
//! ```yaml
//! connections:
//!   cdw-impala:
//!     host: coordinator.example.com
//!     port: 443
//!     use_ssl: true
//!     ldap: true
//!     user: etl
//! ```

use crate::warehouse::WarehouseError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the connections file location
pub const CONNECTIONS_PATH_ENV: &str = "DQ_PIPELINE_CONNECTIONS";

/// Settings for one warehouse connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Coordinator host
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub use_ssl: bool,

    /// Default database for unqualified table names
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    /// Authenticate with LDAP
    #[serde(default)]
    pub ldap: bool,

    /// Timeout per statement in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Path to the `impala-shell` executable
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Extra arguments appended before the query
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_port() -> u16 {
    21000
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_executable() -> String {
    "impala-shell".to_string()
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            use_ssl: false,
            database: None,
            user: None,
            ldap: false,
            timeout_secs: default_timeout_secs(),
            executable: default_executable(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// `host:port` as passed to `impala-shell -i`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// All configured connections by id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionsFile {
    #[serde(default)]
    pub connections: HashMap<String, ConnectionConfig>,
}

impl ConnectionsFile {
    /// `$DQ_PIPELINE_CONNECTIONS`, else `<config dir>/dq-pipeline/connections.yaml`
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONNECTIONS_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dq-pipeline")
            .join("connections.yaml")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read connections file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: ConnectionsFile =
            serde_yaml::from_str(yaml).context("Invalid connections file")?;
        for (id, connection) in &file.connections {
            if connection.host.trim().is_empty() {
                anyhow::bail!("Connection '{}' has an empty host", id);
            }
        }
        Ok(file)
    }

    pub fn get(&self, id: &str) -> Result<&ConnectionConfig, WarehouseError> {
        self.connections
            .get(id)
            .ok_or_else(|| WarehouseError::UnknownConnection(id.to_string()))
    }
}
