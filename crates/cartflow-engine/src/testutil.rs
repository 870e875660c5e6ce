//! Shared mocks for engine tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;

use cartflow_models::{Cookie, Credentials, InputType, SiteConfig, StepAction, StepDefinition};
use cartflow_traits::{BrowserDriver, CookieStore, DriverError, DriverFactory, Notifier, QrDecoder};

use crate::scripted::ScriptedDriver;
use crate::session::RpaSession;

pub fn step(id: &str, action: StepAction) -> StepDefinition {
    StepDefinition::new(id, action)
}

pub fn site_config(steps: Vec<StepDefinition>) -> Arc<SiteConfig> {
    Arc::new(SiteConfig {
        name: "vkusvill".into(),
        display_name: Some("VkusVill".into()),
        base_url: "https://vkusvill.ru".into(),
        steps,
    })
}

pub fn session_for(driver: ScriptedDriver) -> RpaSession {
    RpaSession::new(site_config(Vec::new()), Arc::new(driver))
}

pub fn credentials() -> Credentials {
    Credentials::new()
        .with("phone", "+79262041000")
        .with("owner_id", "42")
}

// ── collaborator mocks ───────────────────────────────────────────

#[derive(Default)]
pub struct MockCookieStore {
    saves: AtomicUsize,
    fail: bool,
    refuse: bool,
}

impl MockCookieStore {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn refusing() -> Self {
        Self { refuse: true, ..Self::default() }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CookieStore for MockCookieStore {
    async fn save_cookies(
        &self,
        _owner_id: &str,
        _destination: &str,
        _cookies: &[Cookie],
    ) -> Result<bool> {
        if self.fail {
            bail!("store unavailable");
        }
        if self.refuse {
            return Ok(false);
        }
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}

#[derive(Default)]
pub struct MockNotifier {
    input_requests: AtomicUsize,
    links: Mutex<Vec<String>>,
    successes: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    pub fn input_requests(&self) -> usize {
        self.input_requests.load(Ordering::Relaxed)
    }

    pub fn links_sent(&self) -> Vec<String> {
        self.links.lock().unwrap().clone()
    }

    pub fn successes(&self) -> Vec<(String, String)> {
        self.successes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn request_user_input(
        &self,
        _owner_id: &str,
        _prompt: &str,
        _input_type: InputType,
        _session_id: &str,
    ) -> Result<()> {
        self.input_requests.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn send_link(&self, _owner_id: &str, link: &str) -> Result<()> {
        self.links.lock().unwrap().push(link.to_string());
        Ok(())
    }

    async fn announce_success(&self, owner_id: &str, destination: &str) -> Result<()> {
        self.successes
            .lock()
            .unwrap()
            .push((owner_id.to_string(), destination.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockQr {
    link: Option<String>,
}

impl MockQr {
    pub fn with_link(link: &str) -> Self {
        Self { link: Some(link.to_string()) }
    }
}

#[async_trait]
impl QrDecoder for MockQr {
    async fn decode(&self, _image: &[u8]) -> Result<Option<String>> {
        Ok(self.link.clone())
    }
}

/// Factory handing out pre-built scripted drivers, one per `launch`.
pub struct ScriptedFactory {
    drivers: Mutex<Vec<Arc<ScriptedDriver>>>,
}

impl ScriptedFactory {
    pub fn with_driver(driver: ScriptedDriver) -> Self {
        Self { drivers: Mutex::new(vec![Arc::new(driver)]) }
    }

    pub fn with_drivers(drivers: Vec<ScriptedDriver>) -> Self {
        Self {
            drivers: Mutex::new(drivers.into_iter().map(Arc::new).collect()),
        }
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    async fn launch(&self, _config: &SiteConfig) -> Result<Arc<dyn BrowserDriver>, DriverError> {
        let mut drivers = self.drivers.lock().unwrap();
        if drivers.is_empty() {
            return Err(DriverError::other("no scripted driver left"));
        }
        Ok(drivers.remove(0))
    }
}
