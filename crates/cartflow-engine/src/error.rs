//! Engine error taxonomy.

use cartflow_models::SessionStatus;
use cartflow_traits::DriverError;

/// Failure of one step. Optional steps downgrade these to a skipped
/// result; critical steps downgrade to a warning; everything else
/// aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("step `{step_id}` timed out after {timeout_ms}ms")]
    Timeout { step_id: String, timeout_ms: u64 },

    #[error("step `{step_id}` failed: {reason}")]
    Failure { step_id: String, reason: String },

    #[error("step `{step_id}` misconfigured: {reason}")]
    Config { step_id: String, reason: String },

    #[error("browser driver already released for this session")]
    DriverGone,
}

impl StepError {
    pub fn failure(step_id: &str, reason: impl std::fmt::Display) -> Self {
        Self::Failure {
            step_id: step_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn config(step_id: &str, reason: impl std::fmt::Display) -> Self {
        Self::Config {
            step_id: step_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn from_driver(step_id: &str, step_timeout_ms: u64, err: DriverError) -> Self {
        match err {
            DriverError::WaitTimeout { .. } => Self::Timeout {
                step_id: step_id.to_string(),
                timeout_ms: step_timeout_ms,
            },
            other => Self::failure(step_id, other),
        }
    }
}

/// Protocol errors on the engine's public surface.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session `{0}` not found")]
    SessionNotFound(String),

    #[error("session `{session_id}` is not waiting for user input (status: {status:?})")]
    SessionNotWaiting {
        session_id: String,
        status: SessionStatus,
    },

    #[error("invalid user input for `{session_id}`: {reason}")]
    InvalidUserInput { session_id: String, reason: String },

    #[error("invalid site config: {0}")]
    Config(#[from] cartflow_models::ConfigError),

    #[error("failed to launch browser driver: {0}")]
    DriverLaunch(#[from] DriverError),
}
