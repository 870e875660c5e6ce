use serde::{Deserialize, Serialize};

/// One browser cookie as captured from the live session.
///
/// Field names follow the wire shape the persistence side expects
/// (`httpOnly`/`sameSite` camelCase).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix timestamp in seconds; None for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default, rename = "httpOnly")]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_same_site", rename = "sameSite")]
    pub same_site: String,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_same_site() -> String {
    "Lax".to_string()
}
