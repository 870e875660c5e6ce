use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::step::{StepAction, StepDefinition};

/// Static configuration problems surfaced before a session ever touches
/// a browser.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config has no steps")]
    Empty,

    #[error("duplicate step id `{0}`")]
    DuplicateStepId(String),

    #[error("step `{step_id}` depends on unknown step `{depends_on}`")]
    UnknownDependency { step_id: String, depends_on: String },

    #[error("step `{step_id}` depends on `{depends_on}`, which comes later in the list")]
    ForwardDependency { step_id: String, depends_on: String },

    #[error("step `{step_id}` ({action}) is missing required field `{field}`")]
    MissingField {
        step_id: String,
        action: &'static str,
        field: &'static str,
    },
}

/// One destination site: identity plus the ordered step list that logs
/// in and performs the in-page flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    /// Machine name, e.g. `vkusvill`.
    pub name: String,
    /// Human-facing name used in notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub base_url: String,
    pub steps: Vec<StepDefinition>,
}

impl SiteConfig {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    /// Structural checks: unique ids, backward-only dependencies, and
    /// per-action required fields. Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if !seen.insert(step.id.as_str()) {
                return Err(ConfigError::DuplicateStepId(step.id.clone()));
            }

            if let Some(dep) = &step.depends_on {
                match self.step_index(dep) {
                    None => {
                        return Err(ConfigError::UnknownDependency {
                            step_id: step.id.clone(),
                            depends_on: dep.clone(),
                        });
                    }
                    Some(dep_index) if dep_index >= index => {
                        return Err(ConfigError::ForwardDependency {
                            step_id: step.id.clone(),
                            depends_on: dep.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }

            self.validate_step_fields(step)?;
        }

        Ok(())
    }

    fn validate_step_fields(&self, step: &StepDefinition) -> Result<(), ConfigError> {
        let missing = |field: &'static str| ConfigError::MissingField {
            step_id: step.id.clone(),
            action: action_name(step.action),
            field,
        };

        if step.action.needs_selectors() && step.selectors.is_empty() {
            return Err(missing("selectors"));
        }
        match step.action {
            StepAction::Navigate if step.url.is_none() => Err(missing("url")),
            StepAction::Type | StepAction::TypeMultiField if step.value.is_none() => {
                Err(missing("value"))
            }
            StepAction::WaitForNavigation if step.url_contains.is_none() => {
                Err(missing("url_contains"))
            }
            StepAction::VerifyRedirect if step.expected_url.is_none() => {
                Err(missing("expected_url"))
            }
            _ => Ok(()),
        }
    }
}

fn action_name(action: StepAction) -> &'static str {
    match action {
        StepAction::Navigate => "navigate",
        StepAction::Click => "click",
        StepAction::WaitAndClick => "wait_and_click",
        StepAction::Hover => "hover",
        StepAction::WaitForElement => "wait_for_element",
        StepAction::WaitForNavigation => "wait_for_navigation",
        StepAction::Type => "type",
        StepAction::TypeMultiField => "type_multi_field",
        StepAction::Uncheck => "uncheck",
        StepAction::Clear => "clear",
        StepAction::ClearAndWait => "clear_and_wait",
        StepAction::ScrollIntoView => "scroll_into_view",
        StepAction::SaveCookies => "save_cookies",
        StepAction::ExtractQrLink => "extract_qr_link",
        StepAction::VerifyRedirect => "verify_redirect",
        StepAction::RequestSmsCode => "request_sms_code",
        StepAction::Cleanup => "cleanup",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(steps: Vec<StepDefinition>) -> SiteConfig {
        SiteConfig {
            name: "vkusvill".into(),
            display_name: Some("ВкусВилл".into()),
            base_url: "https://vkusvill.ru".into(),
            steps,
        }
    }

    fn navigate(id: &str) -> StepDefinition {
        let mut step = StepDefinition::new(id, StepAction::Navigate);
        step.url = Some("https://vkusvill.ru/login".into());
        step
    }

    #[test]
    fn valid_config_passes() {
        let mut click = StepDefinition::new("click_login", StepAction::Click);
        click.selectors = vec![".login-btn".into()];
        click.depends_on = Some("open".into());
        assert_eq!(config(vec![navigate("open"), click]).validate(), Ok(()));
    }

    #[test]
    fn empty_and_duplicate_ids_are_rejected() {
        assert_eq!(config(vec![]).validate(), Err(ConfigError::Empty));

        let err = config(vec![navigate("open"), navigate("open")]).validate();
        assert_eq!(err, Err(ConfigError::DuplicateStepId("open".into())));
    }

    #[test]
    fn dependencies_must_point_backwards() {
        let mut first = navigate("first");
        first.depends_on = Some("second".into());
        let second = navigate("second");
        let err = config(vec![first, second]).validate();
        assert_eq!(
            err,
            Err(ConfigError::ForwardDependency {
                step_id: "first".into(),
                depends_on: "second".into()
            })
        );

        let mut dangling = navigate("open");
        dangling.depends_on = Some("ghost".into());
        let err = config(vec![dangling]).validate();
        assert!(matches!(err, Err(ConfigError::UnknownDependency { .. })));
    }

    #[test]
    fn per_action_required_fields_are_enforced() {
        let bare_navigate = StepDefinition::new("open", StepAction::Navigate);
        assert!(matches!(
            config(vec![bare_navigate]).validate(),
            Err(ConfigError::MissingField { field: "url", .. })
        ));

        let mut typing = StepDefinition::new("enter_phone", StepAction::Type);
        typing.selectors = vec!["#phone".into()];
        assert!(matches!(
            config(vec![typing]).validate(),
            Err(ConfigError::MissingField { field: "value", .. })
        ));

        let clickless = StepDefinition::new("click", StepAction::Click);
        assert!(matches!(
            config(vec![clickless]).validate(),
            Err(ConfigError::MissingField { field: "selectors", .. })
        ));
    }

    #[test]
    fn display_name_falls_back_to_machine_name() {
        let mut cfg = config(vec![navigate("open")]);
        assert_eq!(cfg.display_name(), "ВкусВилл");
        cfg.display_name = None;
        assert_eq!(cfg.display_name(), "vkusvill");
    }
}
