use crate::error::Result;
use serde_json::Value;

/// Capability interface for everything the scanner does to a page.
///
/// The session manager, harvester, and orchestrator only ever see this
/// trait; [`crate::engine::BrowserEngine`] is the production implementation
/// and tests substitute scripted fakes.
#[async_trait::async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL and wait for the load to settle.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// The page's current location.
    async fn current_url(&self) -> Result<String>;

    /// Full rendered markup of the current page.
    async fn page_source(&self) -> Result<String>;

    /// Whether at least one element matches the selector.
    async fn exists(&self, selector: &str) -> bool;

    /// Click the first element matching the selector.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Clear the value of the first input matching the selector.
    async fn clear(&self, selector: &str) -> Result<()>;

    /// Type text into the first element matching the selector.
    ///
    /// Sends the text as-is; callers wanting human pacing feed characters
    /// one at a time through [`crate::humanize::type_like_human`].
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Press Enter with the matched element focused.
    async fn press_enter(&self, selector: &str) -> Result<()>;

    /// Evaluate a script expression and return its JSON value.
    async fn execute(&self, script: &str) -> Result<Value>;

    /// Drop all cookies for the browsing session.
    async fn clear_cookies(&self) -> Result<()>;

    /// Release the underlying browser resource.
    async fn close(&self) -> Result<()>;
}

/// Quote a selector for safe embedding inside an evaluated script.
#[must_use]
pub fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r#"input[name="email"]"#), r#""input[name=\"email\"]""#);
    }

    #[test]
    fn test_js_string_plain() {
        assert_eq!(js_string("#search"), "\"#search\"");
    }
}
