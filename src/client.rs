//! Collaborators that talk to the server once it is up.
//!
//! The harness does not ship a Thrift client. It calls out to a
//! [`ConnectionPool`] to drop connections cached from a previous server
//! instance, and to a [`ClusterMembership`] probe to wait for a cluster to
//! form. [`ClientConfig`] carries the settings a client needs to reach the
//! supervised node.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Per-operation timeout advertised for a supervised node.
pub const NODE_OPERATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Per-operation timeout advertised for the plain local configuration.
pub const LOCAL_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Pool of cached client connections.
///
/// A test run can bring a server down and up again many times in one process;
/// connections pooled against the old instance must be dropped once the new one
/// is ready.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Close every pooled connection to `host:port`.
    async fn clear(&self, host: &str, port: u16, timeout: Duration) -> Result<()>;
}

/// Blocks until a cluster reports enough members.
///
/// Retry and backoff policy belong to the implementation.
#[async_trait]
pub trait ClusterMembership: Send + Sync {
    async fn wait_for_cluster_size(&self, host: &str, port: u16, min_size: usize) -> Result<()>;
}

/// Settings a client needs to reach a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Local storage directory of the graph store.
    pub storage_directory: PathBuf,
    /// Address the client connects to.
    pub hostname: String,
    /// Address the node knows itself by, when it differs from the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_hostname: Option<String>,
    /// Timeout of a single client operation, in milliseconds.
    pub timeout_ms: u64,
}

impl ClientConfig {
    /// Configuration for the node listening on `hostname`.
    pub fn for_node(storage_directory: impl Into<PathBuf>, hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        Self {
            storage_directory: storage_directory.into(),
            self_hostname: Some(hostname.clone()),
            hostname,
            timeout_ms: NODE_OPERATION_TIMEOUT.as_millis() as u64,
        }
    }

    /// Configuration for a single node on `127.0.0.1` with a short timeout.
    pub fn local(storage_directory: impl Into<PathBuf>) -> Self {
        Self {
            storage_directory: storage_directory.into(),
            hostname: "127.0.0.1".to_string(),
            self_hostname: None,
            timeout_ms: LOCAL_OPERATION_TIMEOUT.as_millis() as u64,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_config_names_itself() {
        let config = ClientConfig::for_node("/tmp/graph", "127.0.0.2");

        assert_eq!(config.hostname, "127.0.0.2");
        assert_eq!(config.self_hostname.as_deref(), Some("127.0.0.2"));
        assert_eq!(config.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_local_config_serializes_without_self_hostname() {
        let config = ClientConfig::local("/tmp/graph");
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["hostname"], "127.0.0.1");
        assert_eq!(json["timeoutMs"], 10_000);
        assert!(json.get("selfHostname").is_none());
    }
}
