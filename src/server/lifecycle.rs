use std::fmt;
use uuid::Uuid;

/// Unique identifier for a supervisor instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SupervisorId(Uuid);

impl SupervisorId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SupervisorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a supervisor.
///
/// ```text
/// NotStarted -> Starting -> Ready -> Stopped
///                  |                   ^
///                  +-----> Failed -----+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// `start()` has not been called
    NotStarted,
    /// Process launched, waiting for the port and the readiness marker
    Starting,
    /// Server accepted a connection and logged readiness
    Ready,
    /// Startup failed; call `stop()` to release resources
    Failed,
    /// Torn down
    Stopped,
}

impl SupervisorState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: SupervisorState) -> bool {
        use SupervisorState::*;
        matches!(
            (self, next),
            (NotStarted, Starting)
                | (Starting, Ready)
                | (Starting, Failed)
                | (Starting, Stopped)
                | (Ready, Stopped)
                | (Failed, Stopped)
        )
    }

    /// `Stopped` and `Failed` end the useful life of a supervisor.
    pub fn is_terminal(self) -> bool {
        matches!(self, SupervisorState::Stopped | SupervisorState::Failed)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::NotStarted => "not started",
            SupervisorState::Starting => "starting",
            SupervisorState::Ready => "ready",
            SupervisorState::Failed => "failed",
            SupervisorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
