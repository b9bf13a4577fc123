use crate::error::{Error, Result};
use crate::server::Endpoint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Thrift port of a Cassandra node.
pub const DEFAULT_PORT: u16 = 9160;

/// Line Cassandra logs once its Thrift listener is bound.
pub const DEFAULT_READINESS_MARKER: &str = "Listening for thrift clients...";

/// Root under which per-address config and work directories live.
const TMP_ROOT: &str = "target/cassandra-tmp";

/// Name of the include script inside the config directory.
const INCLUDE_SCRIPT: &str = "cassandra.in.sh";

/// Configuration for a single supervised server.
///
/// Every field has a default, so an empty JSON object is a valid configuration
/// for a node on `127.0.0.1`. Directory fields left out are derived from the
/// address, mirroring the layout the build tool prepares ahead of the tests:
///
/// ```text
/// target/cassandra-tmp/conf/<address>/cassandra.in.sh
/// target/cassandra-tmp/workdir/<address>
/// ```
///
/// # JSON Schema
///
/// ```json
/// {
///   "command": "cassandra",
///   "args": ["-f"],
///   "address": "127.0.0.1",
///   "port": 9160,
///   "configDir": "target/cassandra-tmp/conf/127.0.0.1",
///   "resetData": true,
///   "logOutput": false,
///   "startupTimeoutMs": 10000,
///   "env": { "MAX_HEAP_SIZE": "256M" }
/// }
/// ```
///
/// # Examples
///
/// ```
/// use cassandra_harness::config::HarnessConfig;
///
/// let config = HarnessConfig::for_address("127.0.0.2");
/// assert_eq!(config.endpoint().to_string(), "127.0.0.2:9160");
/// assert!(config.data_dir().ends_with("workdir/127.0.0.2"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarnessConfig {
    /// Command used to launch the server.
    pub command: String,

    /// Arguments passed to the command; `-f` keeps Cassandra in the foreground.
    pub args: Vec<String>,

    /// Address the server listens on and the probe connects to.
    pub address: String,

    /// Client-facing port of the server.
    pub port: u16,

    /// Directory holding the server configuration.
    pub config_dir: Option<PathBuf>,

    /// Include script sourced by the launch script.
    pub include_file: Option<PathBuf>,

    /// Data directory, wiped before launch when `reset_data` is set.
    pub data_dir: Option<PathBuf>,

    /// Environment variable receiving the config directory.
    pub config_dir_env: String,

    /// Environment variable receiving the include script path.
    pub include_file_env: String,

    /// Additional environment entries for the child.
    pub env: HashMap<String, String>,

    /// Remove the data directory before each start.
    pub reset_data: bool,

    /// Forward every output line of the server to the log sink.
    pub log_output: bool,

    /// Trailing text of the log line that signals readiness.
    pub readiness_marker: String,

    /// How long to wait for the readiness marker once the port accepts connections.
    pub startup_timeout_ms: u64,

    /// Timeout of a single connection attempt.
    pub connect_attempt_timeout_ms: u64,

    /// Growth of the delay between connection attempts.
    pub backoff_increment_ms: u64,

    /// Optional bound on the connection phase; unbounded when absent.
    pub connect_deadline_ms: Option<u64>,

    /// Timeout handed to the connection pool when clearing stale connections.
    pub pool_timeout_ms: u64,

    /// Storage directory advertised in client configurations.
    pub storage_directory: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::for_address("127.0.0.1")
    }
}

impl HarnessConfig {
    /// Creates the default configuration for a node bound to `address`.
    pub fn for_address(address: impl Into<String>) -> Self {
        Self {
            command: "cassandra".to_string(),
            args: vec!["-f".to_string()],
            address: address.into(),
            port: DEFAULT_PORT,
            config_dir: None,
            include_file: None,
            data_dir: None,
            config_dir_env: "CASSANDRA_CONF".to_string(),
            include_file_env: "CASSANDRA_INCLUDE".to_string(),
            env: HashMap::new(),
            reset_data: true,
            log_output: true,
            readiness_marker: DEFAULT_READINESS_MARKER.to_string(),
            startup_timeout_ms: 10_000,
            connect_attempt_timeout_ms: 50,
            backoff_increment_ms: 100,
            connect_deadline_ms: None,
            pool_timeout_ms: 10_000,
            storage_directory: None,
        }
    }

    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The contents do not parse
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_from_yaml_str(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// The probe target of this configuration.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }

    /// Config directory, derived from the address when not set.
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir
            .clone()
            .unwrap_or_else(|| Path::new(TMP_ROOT).join("conf").join(&self.address))
    }

    /// Include script, `cassandra.in.sh` inside the config directory when not set.
    pub fn include_file(&self) -> PathBuf {
        self.include_file
            .clone()
            .unwrap_or_else(|| self.config_dir().join(INCLUDE_SCRIPT))
    }

    /// Data directory, derived from the address when not set.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| Path::new(TMP_ROOT).join("workdir").join(&self.address))
    }

    /// Storage directory for client configurations; the data directory when not set.
    pub fn storage_directory(&self) -> PathBuf {
        self.storage_directory
            .clone()
            .unwrap_or_else(|| self.data_dir())
    }

    /// Environment handed to the child.
    ///
    /// The config directory and include script entries always win over `env`.
    pub fn launch_env(&self) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.insert(
            self.config_dir_env.clone(),
            self.config_dir().to_string_lossy().into_owned(),
        );
        env.insert(
            self.include_file_env.clone(),
            self.include_file().to_string_lossy().into_owned(),
        );
        env
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn connect_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_attempt_timeout_ms)
    }

    pub fn backoff_increment(&self) -> Duration {
        Duration::from_millis(self.backoff_increment_ms)
    }

    pub fn connect_deadline(&self) -> Option<Duration> {
        self.connect_deadline_ms.map(Duration::from_millis)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }
}
