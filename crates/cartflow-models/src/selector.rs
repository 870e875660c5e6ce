use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    Css,
    Xpath,
}

/// One element locator candidate.
///
/// Configs write selectors as plain strings; anything starting with
/// `//` is treated as XPath, everything else as CSS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Selector(String);

impl Selector {
    pub fn parse(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn kind(&self) -> SelectorKind {
        if self.0.starts_with("//") {
            SelectorKind::Xpath
        } else {
            SelectorKind::Css
        }
    }

    pub fn raw(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Selector {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_slash_prefix_means_xpath() {
        assert_eq!(Selector::parse("//button[@type='submit']").kind(), SelectorKind::Xpath);
        assert_eq!(Selector::parse("button.submit").kind(), SelectorKind::Css);
        assert_eq!(Selector::parse("#phone-input").kind(), SelectorKind::Css);
    }
}
