/// Error handling module for the Cassandra harness.
///
/// This module defines the error types used throughout the library.
/// Only two conditions are fatal during startup: the process could not be
/// launched, or it never logged readiness. Everything else that can go wrong
/// while bringing a server up is folded into [`Error::Startup`].
///
/// # Example
///
/// ```
/// use cassandra_harness::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Server is ready"),
///         Err(Error::Launch(msg)) => println!("Could not launch server: {}", msg),
///         Err(Error::ReadinessTimeout { endpoint, timeout }) => {
///             println!("{} not ready after {:?}", endpoint, timeout)
///         }
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the cassandra-harness library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration file cannot be read
    /// - The JSON or YAML is malformed
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    ///
    /// This error occurs when:
    /// - The command is empty
    /// - The port or a timeout is zero
    /// - The config directory or include script does not exist
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The server process could not be spawned.
    ///
    /// Fatal and never retried.
    #[error("Failed to launch server process: {0}")]
    Launch(String),

    /// The server accepted connections but never logged the readiness marker.
    ///
    /// The process is left running; call `stop()` to release it.
    #[error("Server {endpoint} did not log readiness within {timeout:?}")]
    ReadinessTimeout {
        /// `host:port` of the supervised server.
        endpoint: String,
        /// The startup timeout that elapsed.
        timeout: Duration,
    },

    /// Any other failure while bringing the server up.
    ///
    /// This error occurs when:
    /// - Startup is cancelled through the supervisor's cancellation token
    /// - The optional connect deadline elapses before the port opens
    /// - The output pipes of the child could not be taken
    #[error("Server startup failed: {0}")]
    Startup(String),

    /// An operation was called in a state that does not allow it.
    #[error("Invalid supervisor state: {0}")]
    InvalidState(String),

    /// A step of the teardown sequence failed.
    ///
    /// Teardown still runs every remaining step; only the first failure is reported.
    #[error("Teardown error: {0}")]
    Teardown(String),

    /// The connection pool collaborator failed.
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// The cluster membership collaborator failed.
    #[error("Cluster error: {0}")]
    Cluster(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Returns `true` for the errors that leave a supervisor unusable after `start()`.
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            Error::Launch(_) | Error::ReadinessTimeout { .. } | Error::Startup(_)
        )
    }
}

/// Result type for cassandra-harness operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_startup_classification() {
        assert!(Error::Launch("missing".into()).is_fatal_startup());
        assert!(
            Error::ReadinessTimeout {
                endpoint: "127.0.0.1:9160".into(),
                timeout: Duration::from_millis(200),
            }
            .is_fatal_startup()
        );
        assert!(Error::Startup("cancelled".into()).is_fatal_startup());
        assert!(!Error::Teardown("kill".into()).is_fatal_startup());
        assert!(!Error::Pool("clear".into()).is_fatal_startup());
    }

    #[test]
    fn test_readiness_timeout_message() {
        let err = Error::ReadinessTimeout {
            endpoint: "127.0.0.1:9160".into(),
            timeout: Duration::from_millis(200),
        };
        assert_eq!(
            err.to_string(),
            "Server 127.0.0.1:9160 did not log readiness within 200ms"
        );
    }
}
