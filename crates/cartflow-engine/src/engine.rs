use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use cartflow_models::{
    Credentials, InputType, RunResult, SessionStatus, SiteConfig, StepAction, StepDefinition,
    StepResult, StepStatus, credentials::keys as credential_keys,
};
use cartflow_traits::{BrowserDriver, CookieStore, DriverFactory, Notifier, QrDecoder};

use crate::context::keys;
use crate::error::EngineError;
use crate::executor::StepExecutor;
use crate::session::RpaSession;

/// Step ids the original site configs rely on being treated as critical
/// even when their action kind alone would not mark them so.
const CRITICAL_STEP_IDS: &[&str] = &[
    "save_cookies",
    "save_session",
    "verify_success",
    "cleanup_session",
    "enter_sms",
    "submit_sms",
];

static SMS_CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4,6}$").expect("Invalid regex"));

/// Critical steps fail soft: a raised failure becomes a warning and the
/// run continues.
fn is_critical(step: &StepDefinition) -> bool {
    matches!(step.action, StepAction::SaveCookies | StepAction::Cleanup)
        || CRITICAL_STEP_IDS.contains(&step.id.as_str())
}

struct SessionEntry {
    session: Arc<Mutex<RpaSession>>,
    /// Kept alongside the session so `cancel` can slam the browser shut
    /// without waiting for the session lock.
    driver: Arc<dyn BrowserDriver>,
}

/// Owns the set of active sessions and drives step execution.
///
/// `start` and `continue_with_user_input` are the only mutators exposed
/// to outside callers; within one session all steps run from a single
/// driving loop, strictly in order.
pub struct Engine {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    drivers: Arc<dyn DriverFactory>,
    executor: StepExecutor,
    notifier: Arc<dyn Notifier>,
}

impl Engine {
    pub fn new(
        drivers: Arc<dyn DriverFactory>,
        cookies: Arc<dyn CookieStore>,
        notifier: Arc<dyn Notifier>,
        qr: Arc<dyn QrDecoder>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            drivers,
            executor: StepExecutor::new(cookies, notifier.clone(), qr),
            notifier,
        }
    }

    /// Start a new session: acquire a driver, seed the context from the
    /// credentials, and run the step list to completion, suspension, or
    /// failure.
    pub async fn start(
        &self,
        config: SiteConfig,
        credentials: Credentials,
    ) -> Result<RunResult, EngineError> {
        config.validate()?;
        let config = Arc::new(config);

        let driver = self.drivers.launch(&config).await?;
        let mut session = RpaSession::new(config.clone(), driver.clone());
        session.status = SessionStatus::Initialized;
        session.context.seed_credentials(&credentials);

        let session_id = session.id.clone();
        info!(session_id = %session_id, destination = %config.name, steps = config.steps.len(),
            "Started RPA session");

        let entry = SessionEntry {
            session: Arc::new(Mutex::new(session)),
            driver,
        };
        let handle = entry.session.clone();
        self.sessions.write().await.insert(session_id.clone(), entry);

        let mut session = handle.lock().await;
        let result = self.run_from(&mut session, 0, &credentials).await;
        drop(session);

        self.finalize(&session_id, &result).await;
        Ok(result)
    }

    /// Resume a suspended session with the user's out-of-band input.
    ///
    /// Rejects unknown sessions and sessions that are not parked; an
    /// input failing validation leaves the session waiting so the user
    /// can retry.
    pub async fn continue_with_user_input(
        &self,
        session_id: &str,
        user_input: &str,
    ) -> Result<RunResult, EngineError> {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions
                .get(session_id)
                .map(|entry| entry.session.clone())
                .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?
        };

        let mut session = handle.lock().await;
        if session.status != SessionStatus::WaitingForUserInput {
            return Err(EngineError::SessionNotWaiting {
                session_id: session_id.to_string(),
                status: session.status,
            });
        }

        let input_type = session.context.waiting_input_type();
        validate_user_input(session_id, input_type, user_input)?;

        let resume_index = match session.context.paused_at_step() {
            Some(index) => index + 1,
            // Older flows recorded only the waiting step id.
            None => session
                .context
                .get_str(keys::WAITING_STEP)
                .and_then(|id| session.config.step_index(id))
                .map(|index| index + 1)
                .unwrap_or(0),
        };

        info!(session_id = %session_id, resume_index, "Resuming session with user input");

        let overlay = Credentials::new()
            .with(credential_keys::USER_INPUT, user_input)
            .with(input_type.credential_key(), user_input);
        let credentials = session.context.stored_credentials().merged_with(&overlay);
        session
            .context
            .set(input_type.credential_key(), Value::String(user_input.to_string()));

        session.context.clear_waiting();
        session.status = SessionStatus::Running;

        let result = self.run_from(&mut session, resume_index, &credentials).await;
        drop(session);

        self.finalize(session_id, &result).await;
        Ok(result)
    }

    pub async fn status(&self, session_id: &str) -> Option<SessionStatus> {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).map(|entry| entry.session.clone())
        }?;
        let session = handle.lock().await;
        Some(session.status)
    }

    /// Force a session's cleanup effect out of band: the browser is
    /// closed immediately (so an in-flight step fails fast) and the
    /// session is dropped from the table. Safe to call mid-step; the
    /// in-flight step's result is discarded with the session.
    pub async fn cancel(&self, session_id: &str) -> Result<(), EngineError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        if let Err(err) = entry.driver.close().await {
            warn!(session_id = %session_id, error = %err, "Driver close during cancel failed");
        }

        let mut session = entry.session.lock().await;
        session.release_driver().await;
        session.context.clear_waiting();
        session.status = SessionStatus::CleanedUp;
        info!(session_id = %session_id, "Session cancelled");
        Ok(())
    }

    /// Cancel every active session.
    pub async fn cleanup_all(&self) {
        let session_ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for session_id in session_ids {
            if let Err(err) = self.cancel(&session_id).await {
                warn!(session_id = %session_id, error = %err, "Cleanup failed");
            }
        }
    }

    // ── the driving loop ─────────────────────────────────────────

    /// Execute steps from `start_index` to the end, applying the
    /// suspend, success and failure rules.
    async fn run_from(
        &self,
        session: &mut RpaSession,
        start_index: usize,
        credentials: &Credentials,
    ) -> RunResult {
        session.status = SessionStatus::Running;
        let config = session.config.clone();
        let total = config.steps.len();

        for index in start_index..total {
            let step = &config.steps[index];
            session.current_step_index = index;
            info!(session_id = %session.id, step_id = %step.id,
                progress = %format!("{}/{}", index + 1, total), "Running step");

            match self.executor.execute(session, step, credentials).await {
                Ok(result) => {
                    let status = result.status;
                    let message = result.message.clone();
                    session.record_result(&step.id, result);

                    if status == StepStatus::WaitingForUserInput {
                        let prompt =
                            message.unwrap_or_else(|| "User input required".to_string());
                        let remaining = total - index - 1;
                        let input_type = step.input_type();
                        session.context.mark_waiting(
                            index,
                            &step.id,
                            remaining,
                            input_type,
                            &prompt,
                        );
                        session.status = SessionStatus::WaitingForUserInput;
                        info!(session_id = %session.id, step_id = %step.id, remaining,
                            "Session paused for user input");
                        return RunResult::WaitingForUserInput {
                            session_id: session.id.clone(),
                            prompt,
                            input_type,
                            paused_at_step: step.id.clone(),
                            remaining_steps: remaining,
                        };
                    }

                    if step.success && status == StepStatus::Success {
                        return self.complete_after_success(session, &config, index, credentials).await;
                    }

                    if session.status == SessionStatus::CleanedUp {
                        // A cleanup step ran; nothing may execute after it.
                        return RunResult::Completed {
                            session_id: session.id.clone(),
                            success_step: session
                                .context
                                .get_str(keys::SUCCESS_STEP)
                                .map(str::to_string),
                            tail_steps_executed: 0,
                            critical_steps_executed: 0,
                        };
                    }
                }
                Err(err) => {
                    if is_critical(step) {
                        warn!(session_id = %session.id, step_id = %step.id, error = %err,
                            "Critical step failed, continuing");
                        session.record_result(&step.id, StepResult::warning(err.to_string()));
                        continue;
                    }
                    error!(session_id = %session.id, step_id = %step.id, error = %err,
                        "Step failed, aborting run");
                    session.record_result(
                        &step.id,
                        StepResult {
                            status: StepStatus::Error,
                            message: Some(err.to_string()),
                            payload: Value::Null,
                        },
                    );
                    session.status = SessionStatus::Error;
                    return RunResult::Failed {
                        session_id: session.id.clone(),
                        failed_step: step.id.clone(),
                        reason: err.to_string(),
                    };
                }
            }
        }

        // Ran out of steps without an explicit success marker. Treated
        // as success for compatibility with cleanup-only step lists.
        if !config.steps.iter().any(|step| step.success) {
            warn!(session_id = %session.id,
                "Step list has no success step; run completed by exhaustion");
        }
        if session.status != SessionStatus::CleanedUp {
            session.status = SessionStatus::Completed;
        }
        RunResult::Completed {
            session_id: session.id.clone(),
            success_step: None,
            tail_steps_executed: 0,
            critical_steps_executed: 0,
        }
    }

    /// The success step fired: announce it, then synchronously execute
    /// every remaining step so persistence and cleanup always run, even
    /// though the visible goal is already achieved.
    async fn complete_after_success(
        &self,
        session: &mut RpaSession,
        config: &SiteConfig,
        success_index: usize,
        credentials: &Credentials,
    ) -> RunResult {
        let success_step = config.steps[success_index].id.clone();
        info!(session_id = %session.id, step_id = %success_step,
            "Success step completed, executing remaining steps");
        session
            .context
            .set(keys::SUCCESS_STEP, Value::String(success_step.clone()));

        self.announce_success(session, credentials).await;

        let mut executed = 0usize;
        let mut critical_executed = 0usize;
        for index in success_index + 1..config.steps.len() {
            let step = &config.steps[index];
            session.current_step_index = index;
            let critical = is_critical(step);
            info!(session_id = %session.id, step_id = %step.id, critical,
                "Executing post-success step");

            match self.executor.execute(session, step, credentials).await {
                Ok(mut result) => {
                    // The tail never re-suspends: the goal is achieved,
                    // an input request here can only be a config mistake.
                    if result.status == StepStatus::WaitingForUserInput {
                        warn!(session_id = %session.id, step_id = %step.id,
                            "Post-success step requested input, downgrading");
                        result.status = StepStatus::Warning;
                    }
                    session.record_result(&step.id, result);
                }
                Err(err) => {
                    warn!(session_id = %session.id, step_id = %step.id, error = %err,
                        "Post-success step failed, continuing");
                    session.record_result(&step.id, StepResult::warning(err.to_string()));
                }
            }
            executed += 1;
            if critical {
                critical_executed += 1;
            }

            if session.status == SessionStatus::CleanedUp && index + 1 < config.steps.len() {
                warn!(session_id = %session.id, step_id = %step.id,
                    "Cleanup ran before the end of the tail; later steps skipped");
                break;
            }
        }

        info!(session_id = %session.id, executed, critical_executed,
            "Post-success tail finished");
        if session.status != SessionStatus::CleanedUp {
            session.status = SessionStatus::Completed;
        }
        RunResult::Completed {
            session_id: session.id.clone(),
            success_step: Some(success_step),
            tail_steps_executed: executed,
            critical_steps_executed: critical_executed,
        }
    }

    async fn announce_success(&self, session: &RpaSession, credentials: &Credentials) {
        let owner = credentials
            .get(credential_keys::OWNER_ID)
            .map(str::to_string)
            .or_else(|| {
                session
                    .context
                    .get_str(credential_keys::OWNER_ID)
                    .map(str::to_string)
            });
        let Some(owner) = owner else {
            warn!(session_id = %session.id, "No owner id, skipping success notification");
            return;
        };
        if let Err(err) = self
            .notifier
            .announce_success(&owner, session.config.display_name())
            .await
        {
            warn!(session_id = %session.id, error = %err, "Success notification failed");
        }
    }

    /// Sessions are destroyed on completion or unrecoverable error;
    /// suspended sessions keep their browser open until resumed or
    /// cancelled.
    async fn finalize(&self, session_id: &str, result: &RunResult) {
        if result.is_waiting() {
            return;
        }
        let entry = self.sessions.write().await.remove(session_id);
        if let Some(entry) = entry {
            let mut session = entry.session.lock().await;
            session.release_driver().await;
            info!(session_id = %session_id, status = ?session.status, "Session finalized");
        }
    }
}

fn validate_user_input(
    session_id: &str,
    input_type: InputType,
    input: &str,
) -> Result<(), EngineError> {
    match input_type {
        InputType::SmsCode if !SMS_CODE_REGEX.is_match(input.trim()) => {
            Err(EngineError::InvalidUserInput {
                session_id: session_id.to_string(),
                reason: "SMS code must be 4-6 digits".to_string(),
            })
        }
        _ => Ok(()),
    }
}
