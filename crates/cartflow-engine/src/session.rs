use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, warn};
use uuid::Uuid;

use cartflow_models::{SessionStatus, SiteConfig, StepResult};
use cartflow_traits::BrowserDriver;

use crate::context::SessionContext;
use crate::error::StepError;

/// One end-to-end automation run against one browser instance.
///
/// Owned exclusively by the engine; mutated only from the engine's
/// single driving loop. Holds the ordered step list (shared, read-only
/// config), the per-step results in attempt order, the free-form
/// context, and the exclusively-owned driver handle.
pub struct RpaSession {
    pub id: String,
    pub config: Arc<SiteConfig>,
    pub status: SessionStatus,
    pub current_step_index: usize,
    /// Append-only, insertion-ordered; a completed step's result is
    /// never overwritten.
    step_results: IndexMap<String, StepResult>,
    pub context: SessionContext,
    driver: Option<Arc<dyn BrowserDriver>>,
    pub created_at: DateTime<Utc>,
}

impl RpaSession {
    pub fn new(config: Arc<SiteConfig>, driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            id: format!("rpa_{}", Uuid::new_v4()),
            config,
            status: SessionStatus::Created,
            current_step_index: 0,
            step_results: IndexMap::new(),
            context: SessionContext::new(),
            driver: Some(driver),
            created_at: Utc::now(),
        }
    }

    pub fn driver(&self) -> Result<Arc<dyn BrowserDriver>, StepError> {
        self.driver.clone().ok_or(StepError::DriverGone)
    }

    pub fn has_driver(&self) -> bool {
        self.driver.is_some()
    }

    /// Close and drop the browser handle. Safe to call twice; after the
    /// first call any step needing the driver fails fast with
    /// `DriverGone`.
    pub async fn release_driver(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Err(err) = driver.close().await {
                warn!(session_id = %self.id, error = %err, "Driver close reported an error");
            }
        }
    }

    /// Record a step's result. First write wins: re-entry after resume
    /// must not rewrite history.
    pub fn record_result(&mut self, step_id: &str, result: StepResult) {
        if self.step_results.contains_key(step_id) {
            debug!(session_id = %self.id, step_id, "Result already recorded, keeping the first");
            return;
        }
        self.step_results.insert(step_id.to_string(), result);
    }

    pub fn result(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.get(step_id)
    }

    /// Results in the order steps were attempted.
    pub fn results(&self) -> impl Iterator<Item = (&str, &StepResult)> {
        self.step_results.iter().map(|(id, r)| (id.as_str(), r))
    }

    pub fn results_len(&self) -> usize {
        self.step_results.len()
    }
}
