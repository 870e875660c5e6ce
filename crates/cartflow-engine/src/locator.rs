use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use cartflow_models::Selector;
use cartflow_traits::{BrowserDriver, DriverError, ElementHandle};

/// How strict the match must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindMode {
    /// First visible match.
    Visible,
    /// First visible and enabled match (click/type targets).
    Interactable,
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Single pass over the candidate selectors, in order. For each
/// candidate, all matches are resolved and the first one satisfying
/// `mode` wins. Selectors that match nothing or fail to evaluate are
/// passed over; the caller decides whether an absent result is
/// retryable or fatal.
///
/// On an unchanged DOM repeated calls return the same element (first
/// candidate, first match in document order).
pub async fn find(
    driver: &dyn BrowserDriver,
    selectors: &[String],
    mode: FindMode,
) -> Result<Option<Arc<dyn ElementHandle>>, DriverError> {
    for raw in selectors {
        let selector = Selector::parse(raw.as_str());
        let handles = match driver.find_all(&selector).await {
            Ok(handles) => handles,
            Err(DriverError::SessionClosed) => return Err(DriverError::SessionClosed),
            Err(err) => {
                debug!(selector = %selector, error = %err, "Selector failed, trying next");
                continue;
            }
        };

        for handle in handles {
            if !handle.is_visible().await.unwrap_or(false) {
                continue;
            }
            if mode == FindMode::Interactable && !handle.is_enabled().await.unwrap_or(false) {
                continue;
            }
            return Ok(Some(handle));
        }
    }
    Ok(None)
}

/// Bounded poll loop: re-scan all candidates every `poll` until one is
/// found or the monotonic deadline passes. Returns `None` on budget
/// exhaustion; the caller converts that into a step timeout.
pub async fn find_within(
    driver: &dyn BrowserDriver,
    selectors: &[String],
    mode: FindMode,
    timeout: Duration,
    poll: Duration,
) -> Result<Option<Arc<dyn ElementHandle>>, DriverError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(handle) = find(driver, selectors, mode).await? {
            return Ok(Some(handle));
        }
        if Instant::now() + poll > deadline {
            return Ok(None);
        }
        tokio::time::sleep(poll).await;
    }
}
