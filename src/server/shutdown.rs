//! # Kill-on-exit hooks.
//!
//! A supervised server must not outlive the test process that started it. A
//! [`ShutdownCoordinator`] registers a [`TerminationHandler`] in a process-wide
//! hook registry for as long as the server runs:
//!
//! - **Termination signal** (Unix: `SIGINT`, `SIGTERM`, `SIGQUIT`): a listener
//!   thread, installed on first registration, fires every registered handler and
//!   then re-raises the signal with its default action so the host still exits.
//!   Elsewhere a Ctrl-C listener fires the handlers and exits with status 130.
//! - **Unwinding / drop**: a coordinator dropped while still registered fires its
//!   handler.
//! - **Orderly shutdown**: [`ShutdownCoordinator::deregister`] removes the hook
//!   without firing it.
//!
//! Handlers fire at most once and never fail; kill errors are only logged.

use crate::server::ProcessKiller;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, Once};

/// Kills one supervised process when the host goes down.
#[derive(Debug)]
pub struct TerminationHandler {
    description: String,
    killer: ProcessKiller,
    fired: AtomicBool,
}

impl TerminationHandler {
    fn new(killer: ProcessKiller, description: String) -> Self {
        Self {
            description,
            killer,
            fired: AtomicBool::new(false),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Kill the process. Only the first call acts; returns `true` for that call.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }

        tracing::warn!(
            server = %self.description,
            pid = self.killer.id(),
            "Terminating server process"
        );
        if !self.killer.kill() {
            tracing::debug!(server = %self.description, "Server process was already gone");
        }
        true
    }
}

struct HookRegistry {
    hooks: Mutex<BTreeMap<u64, Arc<TerminationHandler>>>,
    next_id: AtomicU64,
    listener: Once,
}

static REGISTRY: LazyLock<HookRegistry> = LazyLock::new(|| HookRegistry {
    hooks: Mutex::new(BTreeMap::new()),
    next_id: AtomicU64::new(1),
    listener: Once::new(),
});

impl HookRegistry {
    fn hooks(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Arc<TerminationHandler>>> {
        self.hooks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, handler: Arc<TerminationHandler>) -> u64 {
        self.listener.call_once(install_signal_listener);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.hooks().insert(id, handler);
        id
    }

    fn remove(&self, id: u64) -> bool {
        self.hooks().remove(&id).is_some()
    }

    fn snapshot(&self) -> Vec<Arc<TerminationHandler>> {
        self.hooks().values().cloned().collect()
    }
}

/// Fire every registered handler, as the signal listener does.
///
/// Returns how many handlers killed their process on this call.
pub fn run_exit_hooks() -> usize {
    // Fire outside the lock so a handler can never block registration.
    REGISTRY
        .snapshot()
        .iter()
        .filter(|handler| handler.fire())
        .count()
}

/// Number of handlers currently registered in this process.
pub fn registered_hooks() -> usize {
    REGISTRY.hooks().len()
}

#[cfg(unix)]
fn install_signal_listener() {
    use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM, SIGQUIT]) {
        Ok(signals) => signals,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install exit signal listener; only drop hooks are active");
            return;
        }
    };

    let spawned = std::thread::Builder::new()
        .name("harness-exit-hooks".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                let fired = run_exit_hooks();
                tracing::warn!(signal, fired, "Host received termination signal");
                if let Err(e) = signal_hook::low_level::emulate_default_handler(signal) {
                    tracing::warn!(signal, error = %e, "Failed to re-raise signal");
                }
                std::process::exit(exit_code(signal));
            }
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Failed to spawn exit signal listener thread");
    }
}

#[cfg(not(unix))]
fn install_signal_listener() {
    // Ctrl-C reports as SIGINT.
    const CTRL_C: i32 = 2;

    let spawned = std::thread::Builder::new()
        .name("harness-exit-hooks".to_string())
        .spawn(|| {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to build runtime for Ctrl-C listener; only drop hooks are active");
                    return;
                }
            };

            if let Err(e) = runtime.block_on(tokio::signal::ctrl_c()) {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C; only drop hooks are active");
                return;
            }
            let fired = run_exit_hooks();
            tracing::warn!(fired, "Host received Ctrl-C");
            std::process::exit(exit_code(CTRL_C));
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Failed to spawn Ctrl-C listener thread");
    }
}

/// Conventional exit status of a host killed by `signal`.
fn exit_code(signal: i32) -> i32 {
    128 + signal
}

struct Registration {
    id: u64,
    handler: Arc<TerminationHandler>,
}

/// Owns the kill-on-exit registration of one supervised process.
#[derive(Default)]
pub struct ShutdownCoordinator {
    registration: Option<Registration>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a hook that kills the process behind `killer` if the host exits
    /// without an orderly shutdown.
    ///
    /// Replaces (without firing) any hook this coordinator registered before.
    pub fn register_kill_on_exit(
        &mut self,
        killer: ProcessKiller,
        description: impl Into<String>,
    ) -> Arc<TerminationHandler> {
        self.deregister();

        let handler = Arc::new(TerminationHandler::new(killer, description.into()));
        let id = REGISTRY.insert(Arc::clone(&handler));
        tracing::debug!(server = %handler.description(), hook_id = id, "Registered kill-on-exit hook");

        self.registration = Some(Registration {
            id,
            handler: Arc::clone(&handler),
        });
        handler
    }

    /// Remove the hook without firing it.
    ///
    /// Returns `false` if nothing was registered; repeated calls are no-ops.
    pub fn deregister(&mut self) -> bool {
        let Some(registration) = self.registration.take() else {
            return false;
        };

        REGISTRY.remove(registration.id);
        tracing::debug!(
            server = %registration.handler.description(),
            hook_id = registration.id,
            "Deregistered kill-on-exit hook"
        );
        true
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    /// The registered handler, if any.
    pub fn handler(&self) -> Option<Arc<TerminationHandler>> {
        self.registration
            .as_ref()
            .map(|registration| Arc::clone(&registration.handler))
    }
}

impl Drop for ShutdownCoordinator {
    fn drop(&mut self) {
        if let Some(registration) = self.registration.take() {
            REGISTRY.remove(registration.id);
            registration.handler.fire();
        }
    }
}
