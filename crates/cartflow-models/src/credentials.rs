use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Well-known credential keys.
pub mod keys {
    pub const PHONE: &str = "phone";
    pub const OWNER_ID: &str = "owner_id";
    pub const DESTINATION: &str = "destination";
    pub const USER_INPUT: &str = "user_input";
}

/// Flat string map of secrets and identity fields a run starts with:
/// phone number, chat owner id, destination name, plus whatever extra
/// keys the site's step templates reference.
///
/// Insertion order is preserved so logs and serialized snapshots stay
/// stable across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Credentials(IndexMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of self, `other` winning on conflicts.
    pub fn merged_with(&self, other: &Credentials) -> Credentials {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.insert(key, value);
        }
        merged
    }

    /// Resolve a placeholder key, including the derived phone forms some
    /// sites need: `phone_no_prefix` strips a leading `+7`/`7`/`+`, and
    /// `phone_without_7` turns an 11-digit `79262041000` into
    /// `9262041000`.
    pub fn resolve(&self, key: &str) -> Option<String> {
        if let Some(value) = self.get(key) {
            return Some(value.to_string());
        }
        let phone = self.get(keys::PHONE)?;
        match key {
            "phone_no_prefix" => Some(strip_phone_prefix(phone).to_string()),
            "phone_without_7" => Some(strip_leading_seven(phone).to_string()),
            _ => None,
        }
    }
}

fn strip_phone_prefix(phone: &str) -> &str {
    phone
        .strip_prefix("+7")
        .or_else(|| phone.strip_prefix('7'))
        .or_else(|| phone.strip_prefix('+'))
        .unwrap_or(phone)
}

fn strip_leading_seven(phone: &str) -> &str {
    if phone.starts_with("+7") && phone.len() == 12 {
        &phone[2..]
    } else if phone.starts_with('7') && phone.len() == 11 {
        &phone[1..]
    } else {
        phone
    }
}
