/// Server supervision building blocks for the Cassandra harness.
///
/// This module holds the pieces the [`ProcessSupervisor`](crate::ProcessSupervisor)
/// coordinates while a server comes up and goes down.
/// All public components log through `tracing`.
///
/// # Components
///
/// * `endpoint` - The `(host, port)` the server listens on
/// * `lifecycle` - Supervisor state machine and identifiers
/// * `monitor` - Background reader watching the output for the readiness marker
/// * `poller` - TCP reachability polling with linear backoff
/// * `process` - The launched server process and its kill handle
/// * `shutdown` - Kill-on-exit hooks for abnormal host termination
///
/// # Examples
///
/// Waiting for a marker on an arbitrary line stream:
///
/// ```no_run
/// use cassandra_harness::server::{Endpoint, OutputMonitor};
/// use futures::stream;
/// use std::time::Duration;
///
/// # async fn run() {
/// let lines = stream::iter(vec![Ok("INFO Listening for thrift clients...".to_string())]);
/// let monitor = OutputMonitor::spawn(
///     lines,
///     Endpoint::new("127.0.0.1", 9160),
///     "Listening for thrift clients...",
///     None,
/// );
/// assert!(monitor.await_ready(Duration::from_secs(1)).await);
/// # }
/// ```
///
/// Polling a port until it opens:
///
/// ```no_run
/// use cassandra_harness::server::{Endpoint, ReachabilityPoller};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() {
/// let poller = ReachabilityPoller::new(Endpoint::new("127.0.0.1", 9160));
/// let outcome = poller.poll(&CancellationToken::new()).await;
/// assert!(outcome.is_reachable());
/// # }
/// ```
mod endpoint;
pub mod lifecycle;
pub mod monitor;
pub mod poller;
mod process;
pub mod shutdown;

pub use endpoint::Endpoint;
pub use lifecycle::{SupervisorId, SupervisorState};
pub use monitor::{LineSink, MonitorExit, OutputMonitor, ReadinessState, TracingSink};
pub use poller::{LinearBackoff, PollOutcome, ReachabilityPoller};
pub use process::{OutputLines, ProcessKiller, SupervisedProcess, lossy_lines};
pub use shutdown::{ShutdownCoordinator, TerminationHandler};
