// Shared fixtures for the integration tests that launch real child processes.
#![allow(dead_code)]

use cassandra_harness::HarnessConfig;
use cassandra_harness::server::LineSink;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpListener;

pub const MARKER_LINE: &str =
    "INFO [main] 2012-01-01 00:00:00,000 CassandraDaemon.java (line 212) Listening for thrift clients...";

/// Shell script that logs readiness and then stays alive.
pub fn ready_script() -> String {
    format!("echo 'Starting up'; echo '{}'; exec sleep 30", MARKER_LINE)
}

/// Configuration running `script` under `sh` against a local port.
pub fn script_config(script: &str, port: u16, dir: &Path) -> HarnessConfig {
    let mut config = HarnessConfig::for_address("127.0.0.1");
    config.command = "sh".to_string();
    config.args = vec!["-c".to_string(), script.to_string()];
    config.port = port;
    config.config_dir = Some(dir.join("conf"));
    config.data_dir = Some(dir.join("data"));
    config.startup_timeout_ms = 5_000;
    config
}

/// A bound listener; connections complete in the backlog without accepting.
pub async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// A port nothing listens on, at least for the moment.
pub async fn closed_port() -> u16 {
    let (listener, port) = listener().await;
    drop(listener);
    port
}

/// Records every forwarded line as `"<prefix> <line>"`.
#[derive(Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    /// Lines from the two pipes interleave freely; give a late one time to arrive.
    pub async fn eventually_contains(&self, needle: &str) -> bool {
        for _ in 0..100 {
            if self.contains(needle) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl LineSink for CollectingSink {
    fn forward(&self, prefix: &str, line: &str) {
        self.lines.lock().unwrap().push(format!("{} {}", prefix, line));
    }
}
