use anyhow::Result;
use async_trait::async_trait;

use cartflow_models::{Cookie, InputType};

/// Persistence for captured cookie jars.
///
/// The engine treats saves as fire-and-forget: a `false` return or an
/// error is logged and degrades the step, never the run.
#[async_trait]
pub trait CookieStore: Send + Sync {
    async fn save_cookies(
        &self,
        owner_id: &str,
        destination: &str,
        cookies: &[Cookie],
    ) -> Result<bool>;
}

/// Outbound channel to the human behind the session.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// The session is parked and needs input of the given kind.
    async fn request_user_input(
        &self,
        owner_id: &str,
        prompt: &str,
        input_type: InputType,
        session_id: &str,
    ) -> Result<()>;

    /// A link extracted in-page (e.g. from a QR code) the user must
    /// open to authorize.
    async fn send_link(&self, owner_id: &str, link: &str) -> Result<()>;

    /// The run's success step completed.
    async fn announce_success(&self, owner_id: &str, destination: &str) -> Result<()>;
}

/// Decodes a QR payload out of a page screenshot.
#[async_trait]
pub trait QrDecoder: Send + Sync {
    /// `Ok(None)` means the image contained no decodable QR code.
    async fn decode(&self, image: &[u8]) -> Result<Option<String>>;
}
