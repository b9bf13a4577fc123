use crate::client::{ClientConfig, ClusterMembership, ConnectionPool};
use crate::config::{HarnessConfig, validate_config};
use crate::error::{Error, Result};
use crate::server::{
    Endpoint, LineSink, LinearBackoff, OutputMonitor, PollOutcome, ReachabilityPoller,
    ShutdownCoordinator, SupervisedProcess, SupervisorId, SupervisorState, TracingSink,
};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Brings one server process up, checks that it is ready, and tears it down.
///
/// Startup runs in a fixed order: launch the process, register the kill-on-exit
/// hook, start the output monitor, wait until the port accepts a connection,
/// then wait (bounded by the startup timeout) for the readiness marker. Both
/// signals are required.
///
/// All public methods are instrumented with `tracing` spans.
///
/// # Examples
///
/// ```no_run
/// use cassandra_harness::{HarnessConfig, ProcessSupervisor, Result};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let mut supervisor = ProcessSupervisor::new(HarnessConfig::for_address("127.0.0.1"))
///         .with_output_logging(false);
///
///     if let Err(e) = supervisor.start().await {
///         supervisor.stop().await?;
///         return Err(e);
///     }
///
///     // ... run tests against supervisor.endpoint() ...
///
///     supervisor.stop().await
/// }
/// ```
pub struct ProcessSupervisor {
    id: SupervisorId,
    config: HarnessConfig,
    endpoint: Endpoint,
    state: SupervisorState,
    process: Option<SupervisedProcess>,
    monitor: Option<OutputMonitor>,
    shutdown: ShutdownCoordinator,
    pool: Option<Arc<dyn ConnectionPool>>,
    sink: Arc<dyn LineSink>,
    cancel: CancellationToken,
}

impl ProcessSupervisor {
    /// Create a supervisor for the given configuration
    #[tracing::instrument(skip(config), fields(endpoint = %config.endpoint()))]
    pub fn new(config: HarnessConfig) -> Self {
        let id = SupervisorId::new();
        tracing::debug!(supervisor_id = %id, "Creating new ProcessSupervisor");
        Self {
            id,
            endpoint: config.endpoint(),
            config,
            state: SupervisorState::NotStarted,
            process: None,
            monitor: None,
            shutdown: ShutdownCoordinator::new(),
            pool: None,
            sink: Arc::new(TracingSink),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a supervisor from a JSON or YAML configuration file
    ///
    /// The values are checked with [`validate_config`]; paths are not, so a
    /// config directory prepared later still loads.
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = HarnessConfig::from_file(path)?;
        validate_config(&config)?;
        Ok(Self::new(config))
    }

    /// Pool whose connections to this server are cleared after every successful start.
    pub fn with_connection_pool(mut self, pool: Arc<dyn ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Where forwarded output lines go; `tracing` by default.
    pub fn with_line_sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Whether to remove the data directory before launching.
    pub fn with_reset_data(mut self, reset_data: bool) -> Self {
        self.config.reset_data = reset_data;
        self
    }

    /// Whether to forward every output line of the server.
    pub fn with_output_logging(mut self, enabled: bool) -> Self {
        self.config.log_output = enabled;
        self
    }

    pub fn output_logging(&self) -> bool {
        self.config.log_output
    }

    pub fn id(&self) -> SupervisorId {
        self.id
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Token that interrupts a running `start()` when cancelled.
    ///
    /// `stop()` cancels it as well; a stopped supervisor cannot be restarted.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// OS process id of the server while it is owned by this supervisor.
    pub fn process_id(&self) -> Option<u32> {
        self.process.as_ref().map(SupervisedProcess::id)
    }

    pub fn is_process_running(&self) -> bool {
        self.process
            .as_ref()
            .is_some_and(SupervisedProcess::is_running)
    }

    /// Whether a kill-on-exit hook is currently registered.
    pub fn has_exit_hook(&self) -> bool {
        self.shutdown.is_registered()
    }

    /// Launch the server and wait until it is ready.
    ///
    /// Only valid once, from [`SupervisorState::NotStarted`]. On error the
    /// supervisor is [`SupervisorState::Failed`] and the process (if launched)
    /// is left running; call [`stop`](Self::stop) to release it.
    #[tracing::instrument(skip(self), fields(supervisor_id = %self.id, endpoint = %self.endpoint))]
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SupervisorState::NotStarted {
            return Err(Error::InvalidState(format!(
                "start() requires a supervisor that has not been started, found {}",
                self.state
            )));
        }

        self.transition(SupervisorState::Starting);
        match self.run_startup().await {
            Ok(()) => {
                self.transition(SupervisorState::Ready);
                tracing::info!("Server is ready");
                self.clear_pooled_connections().await;
                Ok(())
            }
            Err(e) => {
                self.transition(SupervisorState::Failed);
                tracing::error!(error = %e, "Server failed to start");
                Err(match e {
                    Error::Launch(_) | Error::ReadinessTimeout { .. } | Error::Startup(_) => e,
                    other => Error::Startup(other.to_string()),
                })
            }
        }
    }

    async fn run_startup(&mut self) -> Result<()> {
        // A zero attempt timeout would poll forever.
        validate_config(&self.config)?;

        if self.config.reset_data {
            reset_data_dir(&self.config.data_dir());
        }

        let mut process = SupervisedProcess::spawn(
            &self.config.command,
            &self.config.args,
            self.config.launch_env(),
        )?;
        self.shutdown
            .register_kill_on_exit(process.killer(), self.endpoint.to_string());

        let lines = process.take_output();
        self.process = Some(process);

        tracing::debug!("Starting output monitor");
        let sink = self.config.log_output.then(|| Arc::clone(&self.sink));
        let monitor = OutputMonitor::spawn(
            lines?,
            self.endpoint.clone(),
            self.config.readiness_marker.clone(),
            sink,
        );
        let readiness = monitor.readiness();
        self.monitor = Some(monitor);

        let poller = ReachabilityPoller::new(self.endpoint.clone())
            .with_attempt_timeout(self.config.connect_attempt_timeout())
            .with_backoff(LinearBackoff::new(self.config.backoff_increment()))
            .with_deadline(self.config.connect_deadline());
        match poller.poll(&self.cancel).await {
            PollOutcome::Reachable { elapsed, attempts } => {
                tracing::debug!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    attempts,
                    "Port accepted a connection"
                );
            }
            PollOutcome::Cancelled { attempts } => {
                return Err(Error::Startup(format!(
                    "Cancelled while waiting for {} to accept connections ({} attempts)",
                    self.endpoint, attempts
                )));
            }
            PollOutcome::TimedOut { elapsed, attempts } => {
                return Err(Error::Startup(format!(
                    "{} did not accept connections within {:?} ({} attempts)",
                    self.endpoint, elapsed, attempts
                )));
            }
        }

        let timeout = self.config.startup_timeout();
        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Waiting for readiness marker");
        let ready = tokio::select! {
            ready = readiness.wait(timeout) => ready,
            _ = self.cancel.cancelled() => {
                return Err(Error::Startup(format!(
                    "Cancelled while waiting for {} to log readiness",
                    self.endpoint
                )));
            }
        };

        if !ready {
            return Err(Error::ReadinessTimeout {
                endpoint: self.endpoint.to_string(),
                timeout,
            });
        }
        Ok(())
    }

    async fn clear_pooled_connections(&self) {
        let Some(pool) = &self.pool else {
            return;
        };

        tracing::debug!("Clearing pooled connections");
        if let Err(e) = pool
            .clear(
                self.endpoint.host(),
                self.endpoint.port(),
                self.config.pool_timeout(),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to clear pooled connections");
        }
    }

    /// Tear the server down.
    ///
    /// Cancels the output monitor, kills the process and waits for it, then
    /// removes the kill-on-exit hook. Every step runs even if an earlier one
    /// failed; the first failure is returned. Calling it on a supervisor that
    /// never started or is already stopped is a no-op.
    #[tracing::instrument(skip(self), fields(supervisor_id = %self.id, endpoint = %self.endpoint))]
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            SupervisorState::NotStarted => {
                tracing::debug!("Supervisor was never started; nothing to stop");
                return Ok(());
            }
            SupervisorState::Stopped => {
                tracing::debug!("Supervisor already stopped");
                return Ok(());
            }
            _ => {}
        }

        tracing::info!("Stopping server");
        self.cancel.cancel();
        let mut first_error: Option<Error> = None;

        if let Some(mut monitor) = self.monitor.take() {
            if let Err(e) = monitor.cancel().await {
                tracing::warn!(error = %e, "Failed to cancel output monitor");
                first_error.get_or_insert(e);
            }
        }

        if let Some(mut process) = self.process.take() {
            match process.kill_and_wait().await {
                Ok(Some(status)) => tracing::debug!(status = %status, "Server process stopped"),
                Ok(None) => tracing::debug!("Server process was already torn down"),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to stop server process");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.shutdown.deregister();
        self.transition(SupervisorState::Stopped);

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!("Server stopped successfully");
                Ok(())
            }
        }
    }

    /// Settings for a client of the supervised node.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::for_node(self.config.storage_directory(), self.endpoint.host())
    }

    /// Settings for a plain local single-node client.
    pub fn local_client_config(&self) -> ClientConfig {
        ClientConfig::local(self.config.storage_directory())
    }

    /// Wait until the cluster the node belongs to reports at least `min_size` members.
    #[tracing::instrument(skip(self, membership), fields(endpoint = %self.endpoint))]
    pub async fn wait_for_cluster_size(
        &self,
        membership: &dyn ClusterMembership,
        min_size: usize,
    ) -> Result<()> {
        if self.state != SupervisorState::Ready {
            return Err(Error::InvalidState(format!(
                "wait_for_cluster_size() requires a ready server, found {}",
                self.state
            )));
        }

        membership
            .wait_for_cluster_size(self.endpoint.host(), self.endpoint.port(), min_size)
            .await
    }

    fn transition(&mut self, next: SupervisorState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "Supervisor state change");
        self.state = next;
    }
}

/// Remove whatever sits at `path`, tolerating absence. Failures are only logged.
fn reset_data_dir(path: &Path) {
    let shown = path.display();
    let result = if path.is_dir() {
        tracing::debug!(path = %shown, "Deleting data directory");
        std::fs::remove_dir_all(path)
    } else if path.is_file() {
        tracing::debug!(path = %shown, "Deleting data file");
        std::fs::remove_file(path)
    } else {
        tracing::debug!(path = %shown, "Data directory does not exist; letting the server create it");
        return;
    };

    match result {
        Ok(()) => tracing::debug!(path = %shown, "Deleted data directory"),
        Err(e) => tracing::warn!(path = %shown, error = %e, "Failed to delete data directory"),
    }
}
