use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use cartflow_models::{
    Credentials, StepAction, StepDefinition, StepResult, StepStatus, credentials::keys,
};
use cartflow_traits::{CookieStore, ElementHandle, NavigationWait, Notifier, QrDecoder};

use crate::context::SessionContext;
use crate::error::StepError;
use crate::locator::{self, DEFAULT_POLL_INTERVAL, FindMode};
use crate::session::RpaSession;

const NAVIGATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Dispatches one step definition to the action implementation matching
/// its kind, applying the step's timeout/optional policy.
pub struct StepExecutor {
    cookies: Arc<dyn CookieStore>,
    notifier: Arc<dyn Notifier>,
    qr: Arc<dyn QrDecoder>,
}

impl StepExecutor {
    pub fn new(
        cookies: Arc<dyn CookieStore>,
        notifier: Arc<dyn Notifier>,
        qr: Arc<dyn QrDecoder>,
    ) -> Self {
        Self { cookies, notifier, qr }
    }

    /// Execute one step against the session.
    ///
    /// Dependency skips and optional downgrades happen here; raised
    /// failures propagate to the session loop for classification.
    pub async fn execute(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
        credentials: &Credentials,
    ) -> Result<StepResult, StepError> {
        if let Some(dep) = &step.depends_on {
            match session.result(dep) {
                None => {
                    warn!(session_id = %session.id, step_id = %step.id, dependency = %dep,
                        "Skipping step, dependency not executed");
                    return Ok(StepResult::skipped(format!("dependency `{dep}` not executed")));
                }
                Some(result) if !result.satisfies_dependency() => {
                    warn!(session_id = %session.id, step_id = %step.id, dependency = %dep,
                        "Skipping step, dependency did not succeed");
                    return Ok(StepResult::skipped(format!("dependency `{dep}` failed")));
                }
                Some(_) => {}
            }
        }

        info!(session_id = %session.id, step_id = %step.id, action = ?step.action, "Executing step");

        let outcome = self.run_action(session, step, credentials).await;
        match outcome {
            Ok(result) => {
                if result.status == StepStatus::Success
                    && let Some(wait_after) = step.wait_after_ms
                    && wait_after > 0
                {
                    tokio::time::sleep(Duration::from_millis(wait_after)).await;
                }
                Ok(result)
            }
            Err(err) if step.optional => {
                debug!(session_id = %session.id, step_id = %step.id, error = %err,
                    "Optional step failed, downgrading to skipped");
                Ok(StepResult::skipped(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn run_action(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
        credentials: &Credentials,
    ) -> Result<StepResult, StepError> {
        match step.action {
            StepAction::Navigate => self.navigate(session, step, credentials).await,
            StepAction::Click | StepAction::WaitAndClick => {
                self.click(session, step).await
            }
            StepAction::Hover => self.hover(session, step).await,
            StepAction::WaitForElement => self.wait_for_element(session, step).await,
            StepAction::WaitForNavigation => self.wait_for_navigation(session, step).await,
            StepAction::Type => self.type_text(session, step, credentials).await,
            StepAction::TypeMultiField => self.type_multi_field(session, step, credentials).await,
            StepAction::Uncheck => self.uncheck(session, step).await,
            StepAction::Clear | StepAction::ClearAndWait => self.clear(session, step).await,
            StepAction::ScrollIntoView => self.scroll_into_view(session, step).await,
            StepAction::SaveCookies => self.save_cookies(session, step, credentials).await,
            StepAction::ExtractQrLink => self.extract_qr_link(session, credentials).await,
            StepAction::VerifyRedirect => self.verify_redirect(session, step).await,
            StepAction::RequestSmsCode => self.request_sms_code(session, step, credentials).await,
            StepAction::Cleanup => self.cleanup(session).await,
        }
    }

    // ── element primitives ───────────────────────────────────────

    /// Poll for the first interactable (or visible) candidate until the
    /// step's budget expires.
    async fn locate(
        &self,
        session: &RpaSession,
        step: &StepDefinition,
        mode: FindMode,
    ) -> Result<Arc<dyn ElementHandle>, StepError> {
        let driver = session.driver()?;
        let timeout = Duration::from_millis(step.timeout_ms());
        let poll = step
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let found = locator::find_within(driver.as_ref(), &step.selectors, mode, timeout, poll)
            .await
            .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;

        found.ok_or_else(|| StepError::Timeout {
            step_id: step.id.clone(),
            timeout_ms: step.timeout_ms(),
        })
    }

    fn resolve_value(
        &self,
        session: &SessionContext,
        step: &StepDefinition,
        credentials: &Credentials,
    ) -> Result<String, StepError> {
        let template = step
            .value
            .as_deref()
            .ok_or_else(|| StepError::config(&step.id, "missing `value`"))?;
        session
            .resolve_template(template, credentials)
            .map_err(|reason| StepError::config(&step.id, reason))
    }

    fn owner_id(
        &self,
        session: &SessionContext,
        credentials: &Credentials,
        step_id: &str,
    ) -> Result<String, StepError> {
        credentials
            .get(keys::OWNER_ID)
            .map(str::to_string)
            .or_else(|| session.get_str(keys::OWNER_ID).map(str::to_string))
            .ok_or_else(|| StepError::config(step_id, "missing `owner_id` in credentials"))
    }

    // ── actions ──────────────────────────────────────────────────

    async fn navigate(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
        credentials: &Credentials,
    ) -> Result<StepResult, StepError> {
        let template = step
            .url
            .as_deref()
            .ok_or_else(|| StepError::config(&step.id, "missing `url`"))?;
        let url = session
            .context
            .resolve_template(template, credentials)
            .map_err(|reason| StepError::config(&step.id, reason))?;

        let driver = session.driver()?;
        driver
            .navigate(
                &url,
                NavigationWait::DomContentLoaded,
                Duration::from_millis(step.timeout_ms()),
            )
            .await
            .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;

        let current = driver.current_url().await.unwrap_or_else(|_| url.clone());
        Ok(StepResult::success().with_payload(json!({ "url": current })))
    }

    async fn click(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
    ) -> Result<StepResult, StepError> {
        let element = self.locate(session, step, FindMode::Interactable).await?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;
        element
            .click()
            .await
            .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;
        Ok(StepResult::success())
    }

    async fn hover(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
    ) -> Result<StepResult, StepError> {
        let element = self.locate(session, step, FindMode::Visible).await?;
        element
            .hover()
            .await
            .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;
        Ok(StepResult::success())
    }

    async fn wait_for_element(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
    ) -> Result<StepResult, StepError> {
        self.locate(session, step, FindMode::Visible).await?;
        Ok(StepResult::success())
    }

    /// Poll the current URL against `url_contains`, ignoring matches on
    /// known still-on-auth-page patterns, until the budget expires.
    async fn wait_for_navigation(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
    ) -> Result<StepResult, StepError> {
        let expected = step
            .url_contains
            .as_deref()
            .ok_or_else(|| StepError::config(&step.id, "missing `url_contains`"))?;
        let driver = session.driver()?;
        let poll = step
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(NAVIGATION_POLL_INTERVAL);
        let deadline = Instant::now() + Duration::from_millis(step.timeout_ms());

        loop {
            let url = driver
                .current_url()
                .await
                .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;

            let excluded = step.exclude_urls.iter().any(|pattern| url.contains(pattern));
            if !excluded && url.contains(expected) {
                info!(session_id = %session.id, step_id = %step.id, url = %url, "Navigation detected");
                return Ok(StepResult::success().with_payload(json!({ "url": url })));
            }

            if Instant::now() + poll > deadline {
                // Waits whose completion is the user's job (QR auth) are
                // configured optional; their expiry is an outcome, not a
                // failure.
                if step.optional {
                    return Ok(StepResult {
                        status: StepStatus::Timeout,
                        message: Some(format!("navigation to `{expected}` not detected")),
                        payload: json!({ "url": url }),
                    });
                }
                return Err(StepError::Timeout {
                    step_id: step.id.clone(),
                    timeout_ms: step.timeout_ms(),
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn type_text(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
        credentials: &Credentials,
    ) -> Result<StepResult, StepError> {
        let value = self.resolve_value(&session.context, step, credentials)?;
        let element = self.locate(session, step, FindMode::Interactable).await?;
        let map_err = |e| StepError::from_driver(&step.id, step.timeout_ms(), e);

        element.focus().await.map_err(map_err)?;
        element.clear().await.map_err(map_err)?;
        if step.per_char {
            // Keystroke-at-a-time for inputs that reject bulk paste.
            let mut buffer = [0u8; 4];
            for ch in value.chars() {
                element
                    .type_text(ch.encode_utf8(&mut buffer))
                    .await
                    .map_err(map_err)?;
            }
        } else {
            element.type_text(&value).await.map_err(map_err)?;
        }

        Ok(StepResult::success().with_payload(json!({ "value": value })))
    }

    /// Distribute the resolved value one character per matched input
    /// field (SMS codes split across per-digit boxes).
    async fn type_multi_field(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
        credentials: &Credentials,
    ) -> Result<StepResult, StepError> {
        let value = self.resolve_value(&session.context, step, credentials)?;
        let driver = session.driver()?;

        let mut fields: Vec<Arc<dyn ElementHandle>> = Vec::new();
        for raw in &step.selectors {
            let selector = cartflow_models::Selector::parse(raw.as_str());
            let handles = driver
                .find_all(&selector)
                .await
                .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;
            for handle in handles {
                if handle.is_visible().await.unwrap_or(false) {
                    fields.push(handle);
                }
            }
            if !fields.is_empty() {
                break;
            }
        }
        if fields.is_empty() {
            return Err(StepError::Timeout {
                step_id: step.id.clone(),
                timeout_ms: step.timeout_ms(),
            });
        }

        let chars: Vec<char> = value.trim().chars().collect();
        if chars.len() > fields.len() {
            warn!(session_id = %session.id, step_id = %step.id,
                chars = chars.len(), fields = fields.len(),
                "More characters than fields, truncating");
        }

        let map_err = |e| StepError::from_driver(&step.id, step.timeout_ms(), e);
        let mut buffer = [0u8; 4];
        let mut filled = 0usize;
        for (field, ch) in fields.iter().zip(chars.iter()) {
            field.focus().await.map_err(map_err)?;
            field.clear().await.map_err(map_err)?;
            field
                .type_text(ch.encode_utf8(&mut buffer))
                .await
                .map_err(map_err)?;
            filled += 1;
        }

        Ok(StepResult::success()
            .with_payload(json!({ "fields_filled": filled, "total_fields": fields.len() })))
    }

    async fn uncheck(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
    ) -> Result<StepResult, StepError> {
        let element = self.locate(session, step, FindMode::Interactable).await?;
        let map_err = |e| StepError::from_driver(&step.id, step.timeout_ms(), e);

        if element.is_checked().await.map_err(map_err)? {
            element.uncheck().await.map_err(map_err)?;
            Ok(StepResult::success().with_payload(json!({ "action": "unchecked" })))
        } else {
            Ok(StepResult::success().with_payload(json!({ "action": "already_unchecked" })))
        }
    }

    async fn clear(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
    ) -> Result<StepResult, StepError> {
        let element = self.locate(session, step, FindMode::Interactable).await?;
        element
            .clear()
            .await
            .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;
        Ok(StepResult::success())
    }

    async fn scroll_into_view(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
    ) -> Result<StepResult, StepError> {
        let element = self.locate(session, step, FindMode::Visible).await?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;
        Ok(StepResult::success())
    }

    /// Capture the full cookie jar and hand it to the persistence
    /// collaborator. A refused or failed save degrades to a warning;
    /// the run decides what that means.
    async fn save_cookies(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
        credentials: &Credentials,
    ) -> Result<StepResult, StepError> {
        let driver = session.driver()?;
        let cookies = driver
            .cookies()
            .await
            .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;

        if cookies.is_empty() {
            warn!(session_id = %session.id, "No cookies found to save");
            return Ok(StepResult::warning("no cookies to save"));
        }

        let owner = self.owner_id(&session.context, credentials, &step.id)?;
        let destination = credentials
            .get(keys::DESTINATION)
            .map(str::to_string)
            .unwrap_or_else(|| session.config.name.clone());

        match self.cookies.save_cookies(&owner, &destination, &cookies).await {
            Ok(true) => {
                info!(session_id = %session.id, count = cookies.len(), destination = %destination,
                    "Cookies saved");
                Ok(StepResult::success().with_payload(json!({ "cookies_count": cookies.len() })))
            }
            Ok(false) => Ok(StepResult::warning("cookie store refused the save")),
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "Cookie save failed");
                Ok(StepResult::warning(format!("cookie save failed: {err}")))
            }
        }
    }

    /// Screenshot the page, decode a QR payload out of it, and forward
    /// the link to the user. A page without a QR code is a warning; the
    /// flow keeps waiting for the user to authorize.
    async fn extract_qr_link(
        &self,
        session: &mut RpaSession,
        credentials: &Credentials,
    ) -> Result<StepResult, StepError> {
        let driver = session.driver()?;
        let image = match driver.screenshot().await {
            Ok(image) => image,
            Err(err) => return Ok(StepResult::warning(format!("screenshot failed: {err}"))),
        };

        match self.qr.decode(&image).await {
            Ok(Some(link)) => {
                if let Ok(owner) = self.owner_id(&session.context, credentials, "extract_qr_link")
                {
                    if let Err(err) = self.notifier.send_link(&owner, &link).await {
                        warn!(session_id = %session.id, error = %err, "Failed to send QR link");
                    }
                }
                Ok(StepResult::success().with_payload(json!({ "qr_link": link })))
            }
            Ok(None) => Ok(StepResult::warning("no QR code found on page")),
            Err(err) => Ok(StepResult::warning(format!("QR decoding failed: {err}"))),
        }
    }

    /// Single-shot check of the current URL against the expected one.
    /// Exclusion patterns (auth pages) are checked first; a miss is a
    /// recorded non-success, not a raised failure, so dependent steps
    /// get skipped instead of the run aborting.
    async fn verify_redirect(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
    ) -> Result<StepResult, StepError> {
        let expected = step
            .expected_url
            .as_deref()
            .ok_or_else(|| StepError::config(&step.id, "missing `expected_url`"))?;
        let driver = session.driver()?;
        let url = driver
            .current_url()
            .await
            .map_err(|e| StepError::from_driver(&step.id, step.timeout_ms(), e))?;

        if let Some(pattern) = step.exclude_patterns.iter().find(|p| url.contains(p.as_str())) {
            warn!(session_id = %session.id, step_id = %step.id, url = %url, pattern = %pattern,
                "Redirect verification hit an exclusion pattern");
            return Ok(StepResult {
                status: StepStatus::Error,
                message: Some(format!("URL matches exclusion pattern `{pattern}`")),
                payload: json!({ "current_url": url, "verified": false }),
            });
        }

        let matched = if step.exact_match {
            url.starts_with(expected)
        } else {
            url.contains(expected)
        };

        if matched {
            Ok(StepResult::success()
                .with_payload(json!({ "current_url": url, "verified": true })))
        } else {
            warn!(session_id = %session.id, step_id = %step.id, expected = %expected, url = %url,
                "Redirect verification failed");
            Ok(StepResult {
                status: StepStatus::Error,
                message: Some(format!("expected URL matching `{expected}`, got `{url}`")),
                payload: json!({ "current_url": url, "verified": false }),
            })
        }
    }

    async fn request_sms_code(
        &self,
        session: &mut RpaSession,
        step: &StepDefinition,
        credentials: &Credentials,
    ) -> Result<StepResult, StepError> {
        if !step.requires_user_input {
            return Ok(StepResult::success().with_message("SMS code requested"));
        }

        let prompt = step.prompt.as_deref().unwrap_or("Enter the SMS code");
        let input_type = step.input_type();
        let owner = self.owner_id(&session.context, credentials, &step.id)?;

        if let Err(err) = self
            .notifier
            .request_user_input(&owner, prompt, input_type, &session.id)
            .await
        {
            warn!(session_id = %session.id, error = %err, "Failed to notify for user input");
        }

        Ok(StepResult {
            status: StepStatus::WaitingForUserInput,
            message: Some(prompt.to_string()),
            payload: json!({ "input_type": input_type }),
        })
    }

    /// Force-release the browser. Idempotent: a second cleanup finds no
    /// driver and still reports success.
    async fn cleanup(&self, session: &mut RpaSession) -> Result<StepResult, StepError> {
        let had_driver = session.has_driver();
        session.release_driver().await;
        session.status = cartflow_models::SessionStatus::CleanedUp;
        info!(session_id = %session.id, had_driver, "Session cleaned up");
        Ok(StepResult::success().with_payload(json!({ "released_driver": had_driver })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedDriver, ScriptedElement};
    use crate::testutil::{MockCookieStore, MockNotifier, MockQr, session_for, step};
    use cartflow_models::SessionStatus;

    fn executor() -> (StepExecutor, Arc<MockCookieStore>, Arc<MockNotifier>) {
        let cookies = Arc::new(MockCookieStore::default());
        let notifier = Arc::new(MockNotifier::default());
        let executor = StepExecutor::new(
            cookies.clone(),
            notifier.clone(),
            Arc::new(MockQr::with_link("https://qr.example/auth")),
        );
        (executor, cookies, notifier)
    }

    fn credentials() -> Credentials {
        Credentials::new()
            .with("phone", "+79262041000")
            .with("owner_id", "42")
    }

    #[tokio::test]
    async fn dependency_on_missing_step_skips_without_side_effects() {
        let button = ScriptedElement::new();
        let driver =
            ScriptedDriver::new("https://site").with_element("#btn", button.clone());
        let mut session = session_for(driver);

        let mut click = step("click", StepAction::Click);
        click.selectors = vec!["#btn".into()];
        click.depends_on = Some("ghost".into());

        let (executor, _, _) = executor();
        let result = executor
            .execute(&mut session, &click, &credentials())
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::Skipped);
        assert_eq!(button.clicks(), 0);
    }

    #[tokio::test]
    async fn dependency_on_failed_step_skips() {
        let driver = ScriptedDriver::new("https://site");
        let mut session = session_for(driver);
        session.record_result("verify", StepResult::skipped("nope"));

        let mut save = step("save_cookies", StepAction::SaveCookies);
        save.depends_on = Some("verify".into());

        let (executor, cookies, _) = executor();
        let result = executor
            .execute(&mut session, &save, &credentials())
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::Skipped);
        assert_eq!(cookies.saves(), 0);
    }

    #[tokio::test]
    async fn click_times_out_when_no_selector_resolves() {
        let driver = ScriptedDriver::new("https://site");
        let mut session = session_for(driver);

        let mut click = step("click_login", StepAction::Click);
        click.selectors = vec!["#missing".into()];
        click.timeout_ms = Some(80);
        click.poll_interval_ms = Some(10);

        let (executor, _, _) = executor();
        let started = std::time::Instant::now();
        let err = executor
            .execute(&mut session, &click, &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Timeout { timeout_ms: 80, .. }));
        assert!(started.elapsed() >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn optional_click_downgrades_to_skipped() {
        let driver = ScriptedDriver::new("https://site");
        let mut session = session_for(driver);

        let mut click = step("click_banner", StepAction::Click);
        click.selectors = vec!["#missing".into()];
        click.timeout_ms = Some(40);
        click.poll_interval_ms = Some(10);
        click.optional = true;

        let (executor, _, _) = executor();
        let result = executor
            .execute(&mut session, &click, &credentials())
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn type_resolves_placeholders_and_clears_first() {
        let field = ScriptedElement::new();
        let driver =
            ScriptedDriver::new("https://site").with_element("#phone", field.clone());
        let mut session = session_for(driver);

        let mut typing = step("enter_phone", StepAction::Type);
        typing.selectors = vec!["#phone".into()];
        typing.value = Some("{phone_without_7}".into());

        let (executor, _, _) = executor();
        let result = executor
            .execute(&mut session, &typing, &credentials())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.payload["value"], "9262041000");
        assert_eq!(field.clears(), 1);
        assert_eq!(field.typed(), vec!["9262041000".to_string()]);
    }

    #[tokio::test]
    async fn per_char_typing_emits_one_keystroke_at_a_time() {
        let field = ScriptedElement::new();
        let driver = ScriptedDriver::new("https://site").with_element("#sms", field.clone());
        let mut session = session_for(driver);
        session.context.set("sms_code", json!("4821"));

        let mut typing = step("enter_sms", StepAction::Type);
        typing.selectors = vec!["#sms".into()];
        typing.value = Some("{sms_code}".into());
        typing.per_char = true;

        let (executor, _, _) = executor();
        executor
            .execute(&mut session, &typing, &credentials())
            .await
            .unwrap();
        assert_eq!(field.typed(), vec!["4", "8", "2", "1"]);
    }

    #[tokio::test]
    async fn unresolved_placeholder_is_a_config_error() {
        let driver =
            ScriptedDriver::new("https://site").with_element("#f", ScriptedElement::new());
        let mut session = session_for(driver);

        let mut typing = step("enter_code", StepAction::Type);
        typing.selectors = vec!["#f".into()];
        typing.value = Some("{not_a_key}".into());

        let (executor, _, _) = executor();
        let err = executor
            .execute(&mut session, &typing, &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Config { .. }));
    }

    #[tokio::test]
    async fn multi_field_distributes_characters_and_truncates() {
        let driver = ScriptedDriver::new("https://site");
        let fields: Vec<ScriptedElement> =
            (0..4).map(|_| ScriptedElement::new()).collect();
        let mut driver = driver;
        for field in &fields {
            driver = driver.with_element(".code-digit", field.clone());
        }
        let mut session = session_for(driver);
        session.context.set("sms_code", json!("482123"));

        let mut typing = step("enter_sms", StepAction::TypeMultiField);
        typing.selectors = vec![".code-digit".into()];
        typing.value = Some("{sms_code}".into());

        let (executor, _, _) = executor();
        let result = executor
            .execute(&mut session, &typing, &credentials())
            .await
            .unwrap();
        assert_eq!(result.payload["fields_filled"], 4);
        assert_eq!(result.payload["total_fields"], 4);
        let digits: Vec<String> = fields.iter().flat_map(|f| f.typed()).collect();
        assert_eq!(digits, vec!["4", "8", "2", "1"]);
    }

    #[tokio::test]
    async fn uncheck_is_a_noop_on_an_unchecked_box() {
        let checked = ScriptedElement::new().checked();
        let driver =
            ScriptedDriver::new("https://site").with_element("#subscribe", checked.clone());
        let mut session = session_for(driver);

        let mut uncheck = step("uncheck_spam", StepAction::Uncheck);
        uncheck.selectors = vec!["#subscribe".into()];

        let (executor, _, _) = executor();
        let result = executor
            .execute(&mut session, &uncheck, &credentials())
            .await
            .unwrap();
        assert_eq!(result.payload["action"], "unchecked");
        assert!(!checked.is_checked_now());

        let result = executor
            .execute(&mut session, &uncheck, &credentials())
            .await
            .unwrap();
        assert_eq!(result.payload["action"], "already_unchecked");
    }

    #[tokio::test]
    async fn wait_for_navigation_skips_excluded_urls() {
        let driver = ScriptedDriver::new("https://passport.yandex.ru/auth?retpath=market");
        driver.queue_url("https://market.yandex.ru/account");
        let mut session = session_for(driver);

        let mut wait = step("wait_for_auth", StepAction::WaitForNavigation);
        wait.url_contains = Some("market".into());
        wait.exclude_urls = vec!["passport.yandex.ru".into()];
        wait.timeout_ms = Some(500);
        wait.poll_interval_ms = Some(10);

        let (executor, _, _) = executor();
        let result = executor
            .execute(&mut session, &wait, &credentials())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.payload["url"], "https://market.yandex.ru/account");
    }

    #[tokio::test]
    async fn optional_navigation_wait_times_out_with_a_timeout_result() {
        let driver = ScriptedDriver::new("https://site/login");
        let mut session = session_for(driver);

        let mut wait = step("wait_for_auth_success", StepAction::WaitForNavigation);
        wait.url_contains = Some("/account".into());
        wait.timeout_ms = Some(60);
        wait.poll_interval_ms = Some(10);
        wait.optional = true;

        let (executor, _, _) = executor();
        let result = executor
            .execute(&mut session, &wait, &credentials())
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::Timeout);
    }

    #[tokio::test]
    async fn verify_redirect_checks_exclusions_before_matching() {
        let driver = ScriptedDriver::new("https://site/auth/login?next=/account");
        let mut session = session_for(driver);

        let mut verify = step("verify_success", StepAction::VerifyRedirect);
        verify.expected_url = Some("/account".into());
        verify.exclude_patterns = vec!["/auth".into()];

        let (executor, _, _) = executor();
        let result = executor
            .execute(&mut session, &verify, &credentials())
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::Error);
        assert_eq!(result.payload["verified"], false);
    }

    #[tokio::test]
    async fn verify_redirect_exact_match_requires_prefix() {
        let driver = ScriptedDriver::new("https://site/account/orders");
        let mut session = session_for(driver);

        let mut verify = step("verify_success", StepAction::VerifyRedirect);
        verify.expected_url = Some("https://site/account".into());
        verify.exact_match = true;

        let (executor, _, _) = executor();
        let result = executor
            .execute(&mut session, &verify, &credentials())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.payload["verified"], true);
    }

    #[tokio::test]
    async fn save_cookies_hands_the_jar_to_the_store() {
        let driver = ScriptedDriver::new("https://site").with_cookie(
            serde_json::from_value(json!({
                "name": "sid", "value": "abc", "domain": ".site"
            }))
            .unwrap(),
        );
        let mut session = session_for(driver);
        session.context.seed_credentials(&credentials());

        let (executor, cookies, _) = executor();
        let result = executor
            .execute(
                &mut session,
                &step("save_cookies", StepAction::SaveCookies),
                &credentials(),
            )
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.payload["cookies_count"], 1);
        assert_eq!(cookies.saves(), 1);
    }

    #[tokio::test]
    async fn failing_cookie_store_degrades_to_warning() {
        let driver = ScriptedDriver::new("https://site").with_cookie(
            serde_json::from_value(json!({
                "name": "sid", "value": "abc", "domain": ".site"
            }))
            .unwrap(),
        );
        let mut session = session_for(driver);

        let cookies = Arc::new(MockCookieStore::failing());
        let executor = StepExecutor::new(
            cookies.clone(),
            Arc::new(MockNotifier::default()),
            Arc::new(MockQr::default()),
        );
        let result = executor
            .execute(
                &mut session,
                &step("save_cookies", StepAction::SaveCookies),
                &credentials(),
            )
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::Warning);
    }

    #[tokio::test]
    async fn request_sms_code_notifies_and_waits() {
        let driver = ScriptedDriver::new("https://site");
        let mut session = session_for(driver);

        let mut request = step("request_sms", StepAction::RequestSmsCode);
        request.requires_user_input = true;
        request.prompt = Some("Enter the code from the SMS".into());

        let (executor, _, notifier) = executor();
        let result = executor
            .execute(&mut session, &request, &credentials())
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::WaitingForUserInput);
        assert_eq!(notifier.input_requests(), 1);
    }

    #[tokio::test]
    async fn extract_qr_link_sends_the_decoded_link() {
        let driver = ScriptedDriver::new("https://site");
        let mut session = session_for(driver);

        let (executor, _, notifier) = executor();
        let result = executor
            .execute(
                &mut session,
                &step("extract_qr_link", StepAction::ExtractQrLink),
                &credentials(),
            )
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.payload["qr_link"], "https://qr.example/auth");
        assert_eq!(notifier.links_sent(), vec!["https://qr.example/auth".to_string()]);
    }

    #[tokio::test]
    async fn extract_qr_link_without_a_code_is_a_warning() {
        let driver = ScriptedDriver::new("https://site");
        let mut session = session_for(driver);

        let executor = StepExecutor::new(
            Arc::new(MockCookieStore::default()),
            Arc::new(MockNotifier::default()),
            Arc::new(MockQr::default()),
        );
        let result = executor
            .execute(
                &mut session,
                &step("extract_qr_link", StepAction::ExtractQrLink),
                &credentials(),
            )
            .await
            .unwrap();
        assert_eq!(result.status, StepStatus::Warning);
    }

    #[tokio::test]
    async fn cleanup_releases_the_driver_and_is_idempotent() {
        let driver = ScriptedDriver::new("https://site");
        let mut session = session_for(driver);

        let (executor, _, _) = executor();
        let cleanup = step("cleanup", StepAction::Cleanup);
        let result = executor
            .execute(&mut session, &cleanup, &credentials())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(session.status, SessionStatus::CleanedUp);
        assert!(!session.has_driver());

        let result = executor
            .execute(&mut session, &cleanup, &credentials())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.payload["released_driver"], false);
    }

    #[tokio::test]
    async fn steps_fail_fast_after_cleanup() {
        let driver = ScriptedDriver::new("https://site");
        let mut session = session_for(driver);
        session.release_driver().await;

        let mut click = step("click", StepAction::Click);
        click.selectors = vec!["#btn".into()];

        let (executor, _, _) = executor();
        let err = executor
            .execute(&mut session, &click, &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::DriverGone));
    }
}
