//! Cartflow Engine - the session execution engine.
//!
//! Interprets a declarative step list against one live browser session:
//! - `Engine`: owns the active-session table, starts runs, resumes
//!   suspended ones (`continue_with_user_input`), cancels out of band
//! - `StepExecutor`: dispatches one step to its action implementation
//!   with the step's timeout/optional policy
//! - `RpaSession`: one run's lifecycle state, ordered results, context
//! - `locator`: element resolution with bounded poll loops
//!
//! The engine reaches the outside world only through the traits in
//! `cartflow-traits`; `scripted` provides a canned driver for tests and
//! dry runs.

pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod locator;
pub mod scripted;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use context::SessionContext;
pub use engine::Engine;
pub use error::{EngineError, StepError};
pub use executor::StepExecutor;
pub use locator::{FindMode, find, find_within};
pub use scripted::{ScriptedDriver, ScriptedElement};
pub use session::RpaSession;
