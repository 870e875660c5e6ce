use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;

use cartflow_engine::Engine;
use cartflow_models::{
    Credentials, RunResult, SiteConfig, StepAction, StepDefinition, credentials::keys,
};

use crate::cli::OutputFormat;
use crate::collaborators::{DryRunFactory, LogCookieStore, LogNotifier, NoQr};

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("Invalid regex"));

fn load_config(path: &Path) -> Result<SiteConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

fn load_credentials(path: &Path) -> Result<Credentials> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse credentials {}", path.display()))
}

fn sample_credentials(config: &SiteConfig) -> Credentials {
    Credentials::new()
        .with(keys::PHONE, "+79262041000")
        .with(keys::OWNER_ID, "1")
        .with(keys::DESTINATION, config.name.clone())
}

fn step_placeholders(step: &StepDefinition) -> Vec<String> {
    let mut found = Vec::new();
    for template in [step.value.as_deref(), step.url.as_deref()].into_iter().flatten() {
        for cap in PLACEHOLDER_REGEX.captures_iter(template) {
            found.push(cap[1].to_string());
        }
    }
    found
}

pub fn validate(config_path: &Path, credentials_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    config.validate()?;

    // Placeholder check: walk the steps in order, tracking which keys
    // become available only after a suspend-for-input step.
    let mut missing: Vec<(String, String)> = Vec::new();
    if let Some(path) = credentials_path {
        let credentials = load_credentials(path)?;
        let mut available: HashSet<String> =
            credentials.iter().map(|(k, _)| k.to_string()).collect();
        if credentials.contains(keys::PHONE) {
            available.insert("phone_no_prefix".into());
            available.insert("phone_without_7".into());
        }
        for step in &config.steps {
            for placeholder in step_placeholders(step) {
                if !available.contains(&placeholder) {
                    missing.push((step.id.clone(), placeholder));
                }
            }
            if step.requires_user_input {
                available.insert(keys::USER_INPUT.to_string());
                available.insert(step.input_type().credential_key().to_string());
            }
        }
    }

    if format.is_json() {
        let report = serde_json::json!({
            "config": config.name,
            "steps": config.steps.len(),
            "valid": missing.is_empty(),
            "missing_placeholders": missing
                .iter()
                .map(|(step, key)| serde_json::json!({"step": step, "placeholder": key}))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {} steps", config.name, config.steps.len());
        for (step, key) in &missing {
            println!("  missing placeholder `{{{key}}}` referenced by step `{step}`");
        }
        if missing.is_empty() {
            println!("  ok");
        }
    }

    if !missing.is_empty() {
        bail!("{} unresolved placeholder(s)", missing.len());
    }
    Ok(())
}

pub fn plan(config_path: &Path, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    config.validate()?;

    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("{} ({})", config.display_name(), config.base_url);
    for (index, step) in config.steps.iter().enumerate() {
        let mut flags = Vec::new();
        if step.success {
            flags.push("success".to_string());
        }
        if step.optional {
            flags.push("optional".to_string());
        }
        if step.requires_user_input {
            flags.push("waits-for-input".to_string());
        }
        if let Some(dep) = &step.depends_on {
            flags.push(format!("after `{dep}`"));
        }
        println!(
            "  {:>2}. {:<24} {:<20} {}",
            index + 1,
            step.id,
            action_label(step.action),
            flags.join(", "),
        );
    }
    Ok(())
}

fn action_label(action: StepAction) -> String {
    serde_json::to_value(action)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

pub async fn dry_run(
    config_path: &Path,
    credentials_path: Option<&Path>,
    auto_input: &str,
    format: OutputFormat,
) -> Result<()> {
    let config = load_config(config_path)?;
    let credentials = match credentials_path {
        Some(path) => load_credentials(path)?,
        None => sample_credentials(&config),
    };

    let engine = Engine::new(
        Arc::new(DryRunFactory),
        Arc::new(LogCookieStore),
        Arc::new(LogNotifier),
        Arc::new(NoQr),
    );

    let mut result = engine.start(config, credentials).await?;
    // Feed the canned input whenever the run parks on a human. The
    // bound matches the deepest realistic flow (SMS then confirmation).
    let mut resumes = 0;
    while result.is_waiting() {
        if resumes >= 5 {
            bail!("dry run still waiting for input after {resumes} resumes");
        }
        let (session_id, prompt) = match &result {
            RunResult::WaitingForUserInput { session_id, prompt, .. } => {
                (session_id.clone(), prompt.clone())
            }
            _ => unreachable!(),
        };
        println!("paused: {prompt} -> feeding `{auto_input}`");
        result = engine.continue_with_user_input(&session_id, auto_input).await?;
        resumes += 1;
    }

    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match &result {
            RunResult::Completed {
                session_id,
                success_step,
                tail_steps_executed,
                critical_steps_executed,
            } => {
                println!("completed: session {session_id}");
                if let Some(step) = success_step {
                    println!(
                        "  success at `{step}`, {tail_steps_executed} tail step(s) run \
                         ({critical_steps_executed} critical)"
                    );
                }
            }
            RunResult::Failed { failed_step, reason, .. } => {
                println!("failed at `{failed_step}`: {reason}");
            }
            RunResult::WaitingForUserInput { .. } => unreachable!("drained above"),
        }
    }

    if let RunResult::Failed { failed_step, .. } = &result {
        bail!("dry run failed at `{failed_step}`");
    }
    Ok(())
}
