use serde::{Deserialize, Serialize};

/// Lifecycle state of one RPA session.
///
/// Transitions are monotonic except `Running` ⇄ `WaitingForUserInput`,
/// which may alternate when a flow needs more than one round of human
/// input (SMS code, then a confirmation).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Initialized,
    Running,
    WaitingForUserInput,
    Completed,
    Error,
    CleanedUp,
}

impl SessionStatus {
    /// Terminal states: no further steps may execute.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Error | SessionStatus::CleanedUp
        )
    }
}
