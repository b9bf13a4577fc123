//! # Reachability polling.
//!
//! [`ReachabilityPoller`] repeatedly opens a short-lived TCP connection to the
//! server until one succeeds, the caller cancels, or an optional deadline passes.
//! Failed attempts are expected while the server boots and are never surfaced.
//!
//! Delays grow linearly by a fixed increment with no cap:
//!
//! ```rust
//! use std::time::Duration;
//! use cassandra_harness::server::LinearBackoff;
//!
//! let backoff = LinearBackoff::new(Duration::from_millis(100));
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay(30), Duration::from_secs(3));
//! ```

use crate::server::Endpoint;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Linear backoff: the delay after the `n`th failed attempt is `n × increment`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinearBackoff {
    /// Growth of the delay per failed attempt.
    pub increment: Duration,
}

impl Default for LinearBackoff {
    /// 100ms per attempt.
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl LinearBackoff {
    pub fn new(increment: Duration) -> Self {
        Self { increment }
    }

    /// Delay to wait after `failed_attempts` consecutive failures (1-based).
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        self.increment.saturating_mul(failed_attempts)
    }
}

/// Result of a polling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A connection was established and closed again.
    Reachable {
        /// Time since the first attempt.
        elapsed: Duration,
        attempts: u32,
    },
    /// The cancellation token fired.
    Cancelled { attempts: u32 },
    /// The deadline passed without a successful attempt.
    TimedOut { elapsed: Duration, attempts: u32 },
}

impl PollOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, PollOutcome::Reachable { .. })
    }
}

/// Polls a TCP endpoint until it accepts a connection.
#[derive(Debug, Clone)]
pub struct ReachabilityPoller {
    endpoint: Endpoint,
    attempt_timeout: Duration,
    backoff: LinearBackoff,
    deadline: Option<Duration>,
}

impl ReachabilityPoller {
    /// Poller with a 50ms attempt timeout, 100ms backoff increment and no deadline.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            attempt_timeout: Duration::from_millis(50),
            backoff: LinearBackoff::default(),
            deadline: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: LinearBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Bound the whole run; `None` polls until cancelled.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn backoff(&self) -> LinearBackoff {
        self.backoff
    }

    /// Attempt connections until success, cancellation or the deadline.
    pub async fn poll(&self, cancel: &CancellationToken) -> PollOutcome {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        tracing::debug!(endpoint = %self.endpoint, "Attempting to connect");
        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled { attempts };
            }

            attempts = attempts.saturating_add(1);
            let result = tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled { attempts },
                result = self.attempt() => result,
            };

            let error = match result {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        elapsed_ms = elapsed.as_millis() as u64,
                        attempts,
                        "Connection succeeded"
                    );
                    return PollOutcome::Reachable { elapsed, attempts };
                }
                Err(e) => e,
            };

            let mut delay = self.backoff.delay(attempts);
            if let Some(deadline) = self.deadline {
                let elapsed = started.elapsed();
                if elapsed >= deadline {
                    tracing::debug!(endpoint = %self.endpoint, attempts, "Connect deadline exceeded");
                    return PollOutcome::TimedOut { elapsed, attempts };
                }
                delay = delay.min(deadline - elapsed);
            }

            tracing::debug!(
                endpoint = %self.endpoint,
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                "Connection failed; retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled { attempts },
                _ = time::sleep(delay) => {}
            }
        }
    }

    /// One connection attempt. The socket is closed when it drops.
    async fn attempt(&self) -> io::Result<()> {
        let connect = TcpStream::connect((self.endpoint.host(), self.endpoint.port()));
        let stream = time::timeout(self.attempt_timeout, connect)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect attempt timed out"))??;
        drop(stream);
        Ok(())
    }
}
