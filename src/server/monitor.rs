//! Background reader for the server's output.
//!
//! The [`OutputMonitor`] consumes the merged output stream of the server line by
//! line on a spawned task. A line ending with the readiness marker flips the
//! shared [`ReadinessState`] latch; with forwarding enabled every line also goes
//! to a [`LineSink`].
//!
//! ```text
//! child stdout ─┐
//!               ├─ merged lines ─> read loop ─┬─> ReadinessState (marker only)
//! child stderr ─┘                             └─> LineSink (every line, optional)
//! ```
//!
//! End of stream, a read error and cancellation all end the task without
//! signaling; the caller's timed wait then reports `false`.

use crate::error::{Error, Result};
use crate::server::Endpoint;
use futures::{Stream, StreamExt};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Target used by [`TracingSink`] for forwarded server output.
pub const OUTPUT_TARGET: &str = "cassandra_harness::output";

/// Receives forwarded output lines.
pub trait LineSink: Send + Sync {
    /// Called once per line; `prefix` identifies the server, e.g. `[127.0.0.1:9160]`.
    fn forward(&self, prefix: &str, line: &str);
}

/// Writes forwarded lines to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LineSink for TracingSink {
    fn forward(&self, prefix: &str, line: &str) {
        tracing::debug!(target: OUTPUT_TARGET, "{} {}", prefix, line);
    }
}

/// One-shot readiness latch.
///
/// Moves from pending to signaled at most once and never goes back. Clones
/// share the latch; waiters block on a watch channel instead of polling.
#[derive(Debug, Clone)]
pub struct ReadinessState {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal readiness. Returns `true` only for the call that flipped the latch.
    pub fn signal(&self) -> bool {
        self.tx.send_if_modified(|signaled| {
            if *signaled {
                false
            } else {
                *signaled = true;
                true
            }
        })
    }

    pub fn is_signaled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait up to `timeout` for the latch; `true` iff it was signaled in time.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|signaled| *signaled)).await {
            Ok(Ok(_)) => true,
            // The sender lives as long as `self`, so the channel cannot close here.
            Ok(Err(_)) => self.is_signaled(),
            Err(_) => false,
        }
    }
}

/// How the read loop ended on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorExit {
    /// The process closed its output
    EndOfStream,
    /// Reading failed; the message of the I/O error
    ReadError(String),
}

/// Watches a server's output for the readiness marker.
pub struct OutputMonitor {
    endpoint: Endpoint,
    readiness: ReadinessState,
    task: Option<JoinHandle<MonitorExit>>,
}

impl OutputMonitor {
    /// Spawn the read loop on the current Tokio runtime.
    ///
    /// Pass `sink: None` to disable forwarding; the marker is detected either way.
    pub fn spawn<S>(
        lines: S,
        endpoint: Endpoint,
        marker: impl Into<String>,
        sink: Option<Arc<dyn LineSink>>,
    ) -> Self
    where
        S: Stream<Item = io::Result<String>> + Send + Unpin + 'static,
    {
        let readiness = ReadinessState::new();
        let task = tokio::spawn(read_lines(
            lines,
            marker.into(),
            endpoint.log_prefix(),
            readiness.clone(),
            sink,
        ));

        Self {
            endpoint,
            readiness,
            task: Some(task),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Shared view of the readiness latch.
    pub fn readiness(&self) -> ReadinessState {
        self.readiness.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_signaled()
    }

    /// Block up to `timeout` for the marker. Never errors on timeout.
    pub async fn await_ready(&self, timeout: Duration) -> bool {
        self.readiness.wait(timeout).await
    }

    /// Whether the read loop has ended, on its own or by cancellation.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Stop the read loop and wait for it.
    ///
    /// Aborting drops the stream, which closes the pipes and unblocks a pending
    /// read. A cancelled join counts as success; only a panic in the loop is
    /// reported. Calling it again is a no-op.
    pub async fn cancel(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        task.abort();
        match task.await {
            Ok(exit) => {
                tracing::debug!(endpoint = %self.endpoint, ?exit, "Output monitor had already finished");
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!(endpoint = %self.endpoint, "Output monitor cancelled");
                Ok(())
            }
            Err(e) => Err(Error::Teardown(format!(
                "Output monitor for {} failed: {}",
                self.endpoint, e
            ))),
        }
    }
}

impl Drop for OutputMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn read_lines<S>(
    mut lines: S,
    marker: String,
    prefix: String,
    readiness: ReadinessState,
    sink: Option<Arc<dyn LineSink>>,
) -> MonitorExit
where
    S: Stream<Item = io::Result<String>> + Unpin,
{
    while let Some(next) = lines.next().await {
        let line = match next {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(%prefix, error = %e, "Output stream read failed");
                return MonitorExit::ReadError(e.to_string());
            }
        };

        if line.ends_with(&marker) && readiness.signal() {
            tracing::debug!(%prefix, "Readiness marker observed");
        }

        if let Some(sink) = &sink {
            sink.forward(&prefix, &line);
        }
    }

    tracing::debug!(%prefix, "Output stream closed");
    MonitorExit::EndOfStream
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latch_signals_once() {
        let state = ReadinessState::new();
        assert!(!state.is_signaled());

        assert!(state.signal());
        assert!(!state.signal());
        assert!(state.is_signaled());
        assert!(state.wait(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_latch_wait_times_out_when_pending() {
        let state = ReadinessState::new();
        assert!(!state.wait(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_clones_share_the_latch() {
        let writer = ReadinessState::new();
        let reader = writer.clone();

        let waiter = tokio::spawn(async move { reader.wait(Duration::from_secs(5)).await });
        writer.signal();

        assert!(waiter.await.unwrap());
    }
}
