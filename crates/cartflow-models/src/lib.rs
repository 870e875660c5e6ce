//! Cartflow Models - Shared data model for the RPA engine.
//!
//! This crate defines the plain data the rest of the workspace passes
//! around: step definitions and their action kinds, per-step results,
//! session lifecycle status, run outcomes, site configurations, user
//! credentials, and browser cookies. Nothing here performs I/O.

pub mod config;
pub mod cookie;
pub mod credentials;
pub mod result;
pub mod selector;
pub mod session;
pub mod step;

pub use config::{ConfigError, SiteConfig};
pub use cookie::Cookie;
pub use credentials::Credentials;
pub use result::{RunResult, StepResult, StepStatus};
pub use selector::{Selector, SelectorKind};
pub use session::SessionStatus;
pub use step::{InputType, StepAction, StepDefinition};
