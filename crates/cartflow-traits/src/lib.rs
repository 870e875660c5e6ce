//! Cartflow Traits - the narrow interfaces the engine talks through.
//!
//! The engine never depends on a concrete automation library or
//! delivery channel; it sees only:
//! - `BrowserDriver` / `ElementHandle`: the Page/Browser capability
//! - `DriverFactory`: acquires a driver for a new session
//! - `CookieStore`: persistence for captured cookie jars
//! - `Notifier`: user-input requests and success announcements
//! - `QrDecoder`: screenshot bytes to decoded QR payload
//!
//! Concrete implementations (Playwright/CDP bindings, database-backed
//! cookie stores, chat bots) live in downstream crates.

pub mod collaborators;
pub mod driver;
pub mod error;

pub use collaborators::{CookieStore, Notifier, QrDecoder};
pub use driver::{BrowserDriver, DriverFactory, ElementHandle, NavigationWait};
pub use error::DriverError;
