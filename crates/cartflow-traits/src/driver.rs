use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cartflow_models::{Cookie, Selector, SiteConfig};

use crate::error::DriverError;

/// Page-load condition for `navigate`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NavigationWait {
    Load,
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

/// A handle to one located element.
///
/// Handles are snapshots; a page mutation may detach them, in which
/// case methods return `DriverError::StaleElement` and the caller
/// re-locates.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    async fn is_visible(&self) -> Result<bool, DriverError>;
    async fn is_enabled(&self) -> Result<bool, DriverError>;
    async fn is_checked(&self) -> Result<bool, DriverError>;

    async fn click(&self) -> Result<(), DriverError>;
    async fn focus(&self) -> Result<(), DriverError>;
    async fn type_text(&self, text: &str) -> Result<(), DriverError>;
    async fn clear(&self) -> Result<(), DriverError>;
    async fn hover(&self) -> Result<(), DriverError>;
    async fn scroll_into_view(&self) -> Result<(), DriverError>;
    async fn uncheck(&self) -> Result<(), DriverError>;
}

/// The browser capability one session owns exclusively for its run.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(
        &self,
        url: &str,
        wait: NavigationWait,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// All current matches for a selector, in document order. A selector
    /// that matches nothing is an empty vec, not an error.
    async fn find_all(
        &self,
        selector: &Selector,
    ) -> Result<Vec<Arc<dyn ElementHandle>>, DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError>;
    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), DriverError>;

    /// Full-page screenshot, PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Release the underlying browser. Must be idempotent.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Acquires a fresh driver for a new session.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self, config: &SiteConfig) -> Result<Arc<dyn BrowserDriver>, DriverError>;
}
