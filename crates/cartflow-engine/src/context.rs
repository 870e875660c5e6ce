use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use cartflow_models::{Credentials, InputType};

/// Context key constants, to keep the strings in one place.
pub mod keys {
    /// Index of the step the session is parked on.
    pub const PAUSED_AT_STEP: &str = "paused_at_step";
    /// Steps left after the paused one.
    pub const REMAINING_STEPS: &str = "remaining_steps";
    /// Id of the step that requested input.
    pub const WAITING_STEP: &str = "waiting_step";
    pub const INPUT_TYPE: &str = "input_type";
    pub const PROMPT: &str = "prompt";
    /// Snapshot of the credentials the run started with.
    pub const CREDENTIALS: &str = "credentials";
    /// Id of the success step once it has completed.
    pub const SUCCESS_STEP: &str = "success_step";
}

// Placeholder pattern: {phone}, {sms_code}, {phone_without_7}, ...
static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("Invalid regex"));

/// Free-form key/value store a session uses to pass data between steps:
/// seeded from the run's credentials, enriched by steps (extracted SMS
/// code, paused-at index), consulted on resume.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    data: HashMap<String, Value>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(Value::as_u64).map(|v| v as usize)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Seed the context from the initial credentials: every field is
    /// mirrored under its own key, and a full snapshot is kept under
    /// `credentials` for recovery on resume.
    pub fn seed_credentials(&mut self, credentials: &Credentials) {
        for (key, value) in credentials.iter() {
            self.set(key, Value::String(value.to_string()));
        }
        let snapshot: serde_json::Map<String, Value> = credentials
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        self.set(keys::CREDENTIALS, Value::Object(snapshot));
    }

    /// Rebuild the credentials view the run started with.
    pub fn stored_credentials(&self) -> Credentials {
        let mut credentials = Credentials::new();
        if let Some(Value::Object(snapshot)) = self.get(keys::CREDENTIALS) {
            for (key, value) in snapshot {
                if let Value::String(text) = value {
                    credentials.insert(key.clone(), text.clone());
                }
            }
        }
        credentials
    }

    // ── waiting markers ──────────────────────────────────────────

    pub fn mark_waiting(
        &mut self,
        step_index: usize,
        step_id: &str,
        remaining: usize,
        input_type: InputType,
        prompt: &str,
    ) {
        self.set(keys::PAUSED_AT_STEP, Value::from(step_index as u64));
        self.set(keys::REMAINING_STEPS, Value::from(remaining as u64));
        self.set(keys::WAITING_STEP, Value::String(step_id.to_string()));
        self.set(
            keys::INPUT_TYPE,
            serde_json::to_value(input_type).unwrap_or(Value::Null),
        );
        self.set(keys::PROMPT, Value::String(prompt.to_string()));
    }

    pub fn clear_waiting(&mut self) {
        self.remove(keys::PAUSED_AT_STEP);
        self.remove(keys::REMAINING_STEPS);
        self.remove(keys::WAITING_STEP);
        self.remove(keys::INPUT_TYPE);
        self.remove(keys::PROMPT);
    }

    pub fn paused_at_step(&self) -> Option<usize> {
        self.get_usize(keys::PAUSED_AT_STEP)
    }

    pub fn waiting_input_type(&self) -> InputType {
        self.get(keys::INPUT_TYPE)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    // ── placeholder resolution ───────────────────────────────────

    /// Resolve `{placeholder}` references against the credentials view
    /// merged with this context (credentials win). An unresolved
    /// placeholder is a configuration error, reported by name.
    pub fn resolve_template(
        &self,
        template: &str,
        credentials: &Credentials,
    ) -> Result<String, String> {
        let mut result = template.to_string();
        for cap in PLACEHOLDER_REGEX.captures_iter(template) {
            let key = &cap[1];
            let replacement = credentials
                .resolve(key)
                .or_else(|| self.get_str(key).map(str::to_string));
            match replacement {
                Some(value) => result = result.replace(&cap[0], &value),
                None => return Err(format!("unresolved placeholder `{{{key}}}`")),
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new()
            .with("phone", "+79262041000")
            .with("owner_id", "42")
    }

    #[test]
    fn seed_mirrors_fields_and_keeps_a_snapshot() {
        let mut ctx = SessionContext::new();
        ctx.seed_credentials(&credentials());

        assert_eq!(ctx.get_str("phone"), Some("+79262041000"));
        assert_eq!(ctx.get_str("owner_id"), Some("42"));

        let recovered = ctx.stored_credentials();
        assert_eq!(recovered.get("phone"), Some("+79262041000"));
        assert_eq!(recovered.get("owner_id"), Some("42"));
    }

    #[test]
    fn templates_resolve_from_credentials_and_context() {
        let mut ctx = SessionContext::new();
        ctx.set("sms_code", serde_json::json!("4821"));

        let resolved = ctx
            .resolve_template("code {sms_code} for {phone}", &credentials())
            .unwrap();
        assert_eq!(resolved, "code 4821 for +79262041000");
    }

    #[test]
    fn derived_phone_placeholders_resolve() {
        let ctx = SessionContext::new();
        let resolved = ctx
            .resolve_template("{phone_without_7}", &credentials())
            .unwrap();
        assert_eq!(resolved, "9262041000");
    }

    #[test]
    fn unresolved_placeholder_is_an_error() {
        let ctx = SessionContext::new();
        let err = ctx
            .resolve_template("{missing_key}", &credentials())
            .unwrap_err();
        assert!(err.contains("missing_key"));
    }

    #[test]
    fn literal_text_passes_through() {
        let ctx = SessionContext::new();
        let resolved = ctx.resolve_template("no placeholders", &credentials()).unwrap();
        assert_eq!(resolved, "no placeholders");
    }

    #[test]
    fn waiting_markers_round_trip() {
        let mut ctx = SessionContext::new();
        ctx.mark_waiting(3, "enter_sms", 2, InputType::SmsCode, "Enter the SMS code");

        assert_eq!(ctx.paused_at_step(), Some(3));
        assert_eq!(ctx.get_usize(keys::REMAINING_STEPS), Some(2));
        assert_eq!(ctx.get_str(keys::WAITING_STEP), Some("enter_sms"));
        assert_eq!(ctx.waiting_input_type(), InputType::SmsCode);

        ctx.clear_waiting();
        assert_eq!(ctx.paused_at_step(), None);
        assert_eq!(ctx.get(keys::PROMPT), None);
    }
}
