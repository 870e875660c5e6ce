//! Scripted browser driver.
//!
//! A `BrowserDriver` backed by a canned script of URL transitions and
//! element behaviors instead of a real browser. Tests use it to steer
//! the engine deterministically; the CLI dry-run uses a permissive
//! variant where every selector resolves.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use std::sync::Mutex;

use cartflow_models::{Cookie, Selector};
use cartflow_traits::{BrowserDriver, DriverError, ElementHandle, NavigationWait};

#[derive(Default)]
struct ElementState {
    hidden: bool,
    disabled: bool,
    checked: AtomicBool,
    /// Visible only from the nth `is_visible` scan onward (0 = always).
    visible_after: usize,
    scans: AtomicUsize,
    click_fails: bool,
    clicks: AtomicUsize,
    typed: Mutex<Vec<String>>,
    clears: AtomicUsize,
    hovers: AtomicUsize,
    scrolls: AtomicUsize,
    focuses: AtomicUsize,
}

/// One scripted element. Cloning shares state, so a test can keep a
/// handle for assertions after registering it with the driver.
#[derive(Clone, Default)]
pub struct ScriptedElement {
    state: Arc<ElementState>,
}

impl ScriptedElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hidden(mut self) -> Self {
        self.state_mut().hidden = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.state_mut().disabled = true;
        self
    }

    pub fn checked(self) -> Self {
        self.state.checked.store(true, Ordering::Relaxed);
        self
    }

    pub fn visible_after(mut self, scans: usize) -> Self {
        self.state_mut().visible_after = scans;
        self
    }

    pub fn click_fails(mut self) -> Self {
        self.state_mut().click_fails = true;
        self
    }

    fn state_mut(&mut self) -> &mut ElementState {
        Arc::get_mut(&mut self.state).expect("configure before sharing")
    }

    // ── assertions ───────────────────────────────────────────────

    pub fn clicks(&self) -> usize {
        self.state.clicks.load(Ordering::Relaxed)
    }

    pub fn typed(&self) -> Vec<String> {
        self.state.typed.lock().unwrap().clone()
    }

    pub fn clears(&self) -> usize {
        self.state.clears.load(Ordering::Relaxed)
    }

    pub fn hovers(&self) -> usize {
        self.state.hovers.load(Ordering::Relaxed)
    }

    pub fn scrolls(&self) -> usize {
        self.state.scrolls.load(Ordering::Relaxed)
    }

    pub fn focuses(&self) -> usize {
        self.state.focuses.load(Ordering::Relaxed)
    }

    pub fn is_checked_now(&self) -> bool {
        self.state.checked.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ElementHandle for ScriptedElement {
    async fn is_visible(&self) -> Result<bool, DriverError> {
        if self.state.hidden {
            return Ok(false);
        }
        let scan = self.state.scans.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(scan >= self.state.visible_after)
    }

    async fn is_enabled(&self) -> Result<bool, DriverError> {
        Ok(!self.state.disabled)
    }

    async fn is_checked(&self) -> Result<bool, DriverError> {
        Ok(self.state.checked.load(Ordering::Relaxed))
    }

    async fn click(&self) -> Result<(), DriverError> {
        if self.state.click_fails {
            return Err(DriverError::other("scripted click failure"));
        }
        self.state.clicks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn focus(&self) -> Result<(), DriverError> {
        self.state.focuses.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.state.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), DriverError> {
        self.state.clears.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn hover(&self) -> Result<(), DriverError> {
        self.state.hovers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn scroll_into_view(&self) -> Result<(), DriverError> {
        self.state.scrolls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn uncheck(&self) -> Result<(), DriverError> {
        self.state.checked.store(false, Ordering::Relaxed);
        Ok(())
    }
}

/// Scripted driver. The URL script is a queue: each `current_url` call
/// advances to the next queued entry until only one remains, which then
/// sticks. `navigate` resets the script to the target URL.
pub struct ScriptedDriver {
    urls: Mutex<VecDeque<String>>,
    elements: Mutex<HashMap<String, Vec<ScriptedElement>>>,
    cookies: Mutex<Vec<Cookie>>,
    screenshot: Vec<u8>,
    /// Unknown selectors resolve to a fresh default element.
    permissive: bool,
    /// Whether `navigate` resets the URL script to the target. Dry runs
    /// pre-seed the whole script and turn this off.
    navigate_resets: bool,
    closed: AtomicBool,
    navigations: Mutex<Vec<String>>,
}

impl ScriptedDriver {
    pub fn new(initial_url: impl Into<String>) -> Self {
        Self {
            urls: Mutex::new(VecDeque::from([initial_url.into()])),
            elements: Mutex::new(HashMap::new()),
            cookies: Mutex::new(Vec::new()),
            screenshot: b"\x89PNG scripted".to_vec(),
            permissive: false,
            navigate_resets: true,
            closed: AtomicBool::new(false),
            navigations: Mutex::new(Vec::new()),
        }
    }

    /// Every selector resolves to a visible, enabled element, and a
    /// pre-seeded URL script survives navigation.
    pub fn permissive(initial_url: impl Into<String>) -> Self {
        let mut driver = Self::new(initial_url);
        driver.permissive = true;
        driver.navigate_resets = false;
        driver
    }

    pub fn with_element(self, selector: impl Into<String>, element: ScriptedElement) -> Self {
        self.elements
            .lock()
            .unwrap()
            .entry(selector.into())
            .or_default()
            .push(element);
        self
    }

    pub fn with_cookie(self, cookie: Cookie) -> Self {
        self.cookies.lock().unwrap().push(cookie);
        self
    }

    /// Queue a URL the page will "reach" on a later `current_url` poll.
    pub fn queue_url(&self, url: impl Into<String>) {
        self.urls.lock().unwrap().push_back(url.into());
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.is_closed() {
            Err(DriverError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn navigate(
        &self,
        url: &str,
        _wait: NavigationWait,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.navigations.lock().unwrap().push(url.to_string());
        let mut urls = self.urls.lock().unwrap();
        if self.navigate_resets || urls.is_empty() {
            urls.clear();
            urls.push_back(url.to_string());
        }
        Ok(())
    }

    async fn find_all(
        &self,
        selector: &Selector,
    ) -> Result<Vec<Arc<dyn ElementHandle>>, DriverError> {
        self.ensure_open()?;
        let mut elements = self.elements.lock().unwrap();
        if let Some(handles) = elements.get(selector.raw()) {
            return Ok(handles
                .iter()
                .cloned()
                .map(|e| Arc::new(e) as Arc<dyn ElementHandle>)
                .collect());
        }
        if self.permissive {
            let element = ScriptedElement::new();
            elements.insert(selector.raw().to_string(), vec![element.clone()]);
            return Ok(vec![Arc::new(element)]);
        }
        Ok(Vec::new())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.ensure_open()?;
        let mut urls = self.urls.lock().unwrap();
        if urls.len() > 1 {
            Ok(urls.pop_front().expect("non-empty"))
        } else {
            Ok(urls.front().cloned().unwrap_or_default())
        }
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError> {
        self.ensure_open()?;
        Ok(self.cookies.lock().unwrap().clone())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.cookies.lock().unwrap().extend_from_slice(cookies);
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.ensure_open()?;
        Ok(self.screenshot.clone())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}
