use serde::{Deserialize, Serialize};

/// The kind of automation a step performs.
///
/// Dispatch is exhaustive over this enum; configs use snake_case names
/// (`"wait_and_click"`, `"save_cookies"`, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Navigate,
    Click,
    WaitAndClick,
    Hover,
    WaitForElement,
    WaitForNavigation,
    Type,
    TypeMultiField,
    Uncheck,
    Clear,
    ClearAndWait,
    ScrollIntoView,
    #[serde(alias = "save_session")]
    SaveCookies,
    ExtractQrLink,
    VerifyRedirect,
    RequestSmsCode,
    Cleanup,
}

impl StepAction {
    /// Default wait budget when the step does not set `timeout_ms`.
    pub fn default_timeout_ms(self) -> u64 {
        match self {
            StepAction::Navigate | StepAction::WaitForNavigation => 30_000,
            StepAction::WaitForElement | StepAction::VerifyRedirect | StepAction::Hover => 10_000,
            StepAction::WaitAndClick => 3_000,
            _ => 2_000,
        }
    }

    /// Whether the step operates on a page element and therefore needs
    /// at least one selector candidate.
    pub fn needs_selectors(self) -> bool {
        matches!(
            self,
            StepAction::Click
                | StepAction::WaitAndClick
                | StepAction::Hover
                | StepAction::WaitForElement
                | StepAction::Type
                | StepAction::TypeMultiField
                | StepAction::Uncheck
                | StepAction::Clear
                | StepAction::ClearAndWait
                | StepAction::ScrollIntoView
        )
    }

    /// Whether the located element must also be enabled, not just
    /// visible, before the action runs.
    pub fn needs_interactable(self) -> bool {
        matches!(
            self,
            StepAction::Click
                | StepAction::WaitAndClick
                | StepAction::Type
                | StepAction::TypeMultiField
                | StepAction::Uncheck
                | StepAction::Clear
                | StepAction::ClearAndWait
        )
    }
}

/// What kind of out-of-band input a suspending step expects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    SmsCode,
    QrConfirmation,
    Text,
}

impl InputType {
    /// Credential key the resumed input is stored under, in addition to
    /// the generic `user_input` key.
    pub fn credential_key(self) -> &'static str {
        match self {
            InputType::SmsCode => "sms_code",
            InputType::QrConfirmation => "qr_confirmation",
            InputType::Text => "text",
        }
    }
}

/// One declarative automation instruction, supplied by configuration.
///
/// Immutable once loaded; unknown fields are rejected so that a typo in
/// a site config surfaces at parse time instead of silently changing
/// behavior at 3am during a checkout run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StepDefinition {
    pub id: String,
    pub action: StepAction,

    /// Ordered element locator candidates (CSS, or XPath when the string
    /// starts with `//`). First interactable match wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<String>,

    /// Target URL for `navigate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Text template for `type`/`type_multi_field`. May contain
    /// `{placeholder}` references resolved against credentials and
    /// session context at execution time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Settle delay after the action completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_after_ms: Option<u64>,

    /// Re-scan interval for poll loops (element search, navigation
    /// detection).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    /// If set and the referenced step did not finish with status
    /// `success`, this step is skipped without side effects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,

    /// Failure downgrades to a skipped result instead of aborting.
    #[serde(default)]
    pub optional: bool,

    /// Marks the step whose completion defines overall run success.
    #[serde(default)]
    pub success: bool,

    /// Emit text one keystroke at a time, for inputs that reject bulk
    /// paste.
    #[serde(default)]
    pub per_char: bool,

    // ── suspend-for-input steps ──────────────────────────────────
    #[serde(default)]
    pub requires_user_input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<InputType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    // ── wait_for_navigation ──────────────────────────────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_contains: Option<String>,
    /// URL fragments that mean "still on the auth page" and must not
    /// count as a match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_urls: Vec<String>,

    // ── verify_redirect ──────────────────────────────────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_url: Option<String>,
    /// Require the current URL to start with `expected_url` instead of
    /// merely containing it.
    #[serde(default)]
    pub exact_match: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_patterns: Vec<String>,
}

impl StepDefinition {
    /// Minimal step with everything optional left empty. Used by tests
    /// and programmatic config builders.
    pub fn new(id: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            action,
            selectors: Vec::new(),
            url: None,
            value: None,
            timeout_ms: None,
            wait_after_ms: None,
            poll_interval_ms: None,
            depends_on: None,
            optional: false,
            success: false,
            per_char: false,
            requires_user_input: false,
            input_type: None,
            prompt: None,
            url_contains: None,
            exclude_urls: Vec::new(),
            expected_url: None,
            exact_match: false,
            exclude_patterns: Vec::new(),
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or_else(|| self.action.default_timeout_ms())
    }

    pub fn input_type(&self) -> InputType {
        self.input_type.unwrap_or_default()
    }
}
