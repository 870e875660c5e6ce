//! Dry-run collaborator implementations: a factory handing out
//! permissive scripted drivers whose URL script is pre-seeded from the
//! config, plus log-only persistence and notification sinks.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use cartflow_engine::ScriptedDriver;
use cartflow_models::{Cookie, InputType, SiteConfig, StepAction};
use cartflow_traits::{BrowserDriver, CookieStore, DriverError, DriverFactory, Notifier, QrDecoder};

/// Builds one permissive driver per launch. The URL script is seeded so
/// that every URL-reading step (navigate payload, navigation wait,
/// redirect verification) sees a URL satisfying its expectation, in
/// step order.
pub struct DryRunFactory;

impl DryRunFactory {
    fn reader_urls(config: &SiteConfig) -> Vec<String> {
        let base = config.base_url.trim_end_matches('/');
        let mut urls = Vec::new();
        for step in &config.steps {
            match step.action {
                StepAction::Navigate => {
                    if let Some(url) = &step.url {
                        urls.push(url.clone());
                    }
                }
                StepAction::WaitForNavigation => {
                    if let Some(fragment) = &step.url_contains {
                        urls.push(synthesize(base, fragment));
                    }
                }
                StepAction::VerifyRedirect => {
                    if let Some(expected) = &step.expected_url {
                        if step.exact_match {
                            urls.push(expected.clone());
                        } else {
                            urls.push(synthesize(base, expected));
                        }
                    }
                }
                _ => {}
            }
        }
        urls
    }
}

fn synthesize(base: &str, fragment: &str) -> String {
    if fragment.starts_with("http") {
        fragment.to_string()
    } else if fragment.starts_with('/') {
        format!("{base}{fragment}")
    } else {
        format!("{base}/{fragment}")
    }
}

#[async_trait]
impl DriverFactory for DryRunFactory {
    async fn launch(&self, config: &SiteConfig) -> Result<Arc<dyn BrowserDriver>, DriverError> {
        let mut urls = Self::reader_urls(config);
        let initial = if urls.is_empty() {
            config.base_url.clone()
        } else {
            urls.remove(0)
        };

        let driver = ScriptedDriver::permissive(initial).with_cookie(Cookie {
            name: "session_id".into(),
            value: "dry-run".into(),
            domain: config.base_url.clone(),
            path: "/".into(),
            expires: None,
            http_only: true,
            secure: true,
            same_site: "Lax".into(),
        });
        for url in urls {
            driver.queue_url(url);
        }
        Ok(Arc::new(driver))
    }
}

/// Logs cookie saves instead of persisting them.
pub struct LogCookieStore;

#[async_trait]
impl CookieStore for LogCookieStore {
    async fn save_cookies(
        &self,
        owner_id: &str,
        destination: &str,
        cookies: &[Cookie],
    ) -> Result<bool> {
        info!(owner_id, destination, count = cookies.len(), "Would save cookies");
        Ok(true)
    }
}

/// Logs notifications instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn request_user_input(
        &self,
        owner_id: &str,
        prompt: &str,
        input_type: InputType,
        session_id: &str,
    ) -> Result<()> {
        info!(owner_id, session_id, ?input_type, prompt, "Would request user input");
        Ok(())
    }

    async fn send_link(&self, owner_id: &str, link: &str) -> Result<()> {
        info!(owner_id, link, "Would send link");
        Ok(())
    }

    async fn announce_success(&self, owner_id: &str, destination: &str) -> Result<()> {
        info!(owner_id, destination, "Would announce success");
        Ok(())
    }
}

/// A dry run never sees a real page, so there is never a QR code.
pub struct NoQr;

#[async_trait]
impl QrDecoder for NoQr {
    async fn decode(&self, _image: &[u8]) -> Result<Option<String>> {
        Ok(None)
    }
}
