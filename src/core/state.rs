use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one execution.
///
/// ```text
/// Idle -> Running <-> Paused
///            |          |
///            +-> Stopping <-+
///                  |
///          Completed | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Idle,
    Running,
    Paused,
    Stopping,
    Completed,
    Failed,
}

impl ExecutionState {
    /// Running or paused: the loop is alive and accepts signals.
    pub fn is_active(self) -> bool {
        matches!(self, ExecutionState::Running | ExecutionState::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Failed)
    }

    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Stopping)
                | (Paused, Stopping)
                | (Stopping, Completed)
                | (Stopping, Failed)
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Running => "running",
            ExecutionState::Paused => "paused",
            ExecutionState::Stopping => "stopping",
            ExecutionState::Completed => "completed",
            ExecutionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionState::*;
    use super::*;

    const ALL: [ExecutionState; 6] = [Idle, Running, Paused, Stopping, Completed, Failed];

    #[test]
    fn test_terminal_states_are_immutable() {
        for next in ALL {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_terminal_only_through_stopping() {
        for from in ALL {
            if from != Stopping {
                assert!(!from.can_transition_to(Completed), "{from} -> completed");
                assert!(!from.can_transition_to(Failed), "{from} -> failed");
            }
        }
    }

    #[test]
    fn test_pause_resume_self_loop() {
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(!Idle.can_transition_to(Paused));
        assert!(Running.is_active() && Paused.is_active());
        assert!(!Stopping.is_active());
    }
}
