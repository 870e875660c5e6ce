use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one executed step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Skipped,
    Warning,
    Error,
    WaitingForUserInput,
    Timeout,
}

/// Result record for one step. Immutable once stored in a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Action-specific payload: resolved value, matched URL, cookie
    /// count, extracted QR link, redirect `verified` flag.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl StepResult {
    pub fn success() -> Self {
        Self { status: StepStatus::Success, message: None, payload: Value::Null }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            message: Some(reason.into()),
            payload: Value::Null,
        }
    }

    pub fn warning(reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Warning,
            message: Some(reason.into()),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// A dependency is satisfied by a successful result whose payload
    /// did not explicitly record `verified: false` (redirect checks do).
    pub fn satisfies_dependency(&self) -> bool {
        self.is_success()
            && self
                .payload
                .get("verified")
                .and_then(Value::as_bool)
                .unwrap_or(true)
    }
}

/// What a run returns to the caller: either it finished, it is parked
/// on a human, or it died on a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    Completed {
        session_id: String,
        /// Id of the step marked `success`, when one fired.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success_step: Option<String>,
        /// Steps executed after the success step (the guaranteed tail).
        tail_steps_executed: usize,
        /// How many of those were critical (cookie save, cleanup, ...).
        critical_steps_executed: usize,
    },
    WaitingForUserInput {
        session_id: String,
        prompt: String,
        input_type: crate::step::InputType,
        paused_at_step: String,
        remaining_steps: usize,
    },
    Failed {
        session_id: String,
        failed_step: String,
        reason: String,
    },
}

impl RunResult {
    pub fn session_id(&self) -> &str {
        match self {
            RunResult::Completed { session_id, .. }
            | RunResult::WaitingForUserInput { session_id, .. }
            | RunResult::Failed { session_id, .. } => session_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed { .. })
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, RunResult::WaitingForUserInput { .. })
    }
}
