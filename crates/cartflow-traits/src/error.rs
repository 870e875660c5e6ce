//! Driver error types.

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("wait timed out after {timeout_ms}ms")]
    WaitTimeout { timeout_ms: u64 },

    #[error("element is no longer attached to the page")]
    StaleElement,

    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    #[error("browser session already closed")]
    SessionClosed,

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
