//! Shared domain types for the Porchlight scanner.
//!
//! A [`Post`] is created during extraction, enriched with a [`Verdict`]
//! during classification, and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of leading characters of post text that form the dedup key.
pub const DEDUP_PREFIX_LEN: usize = 50;

/// Compute the dedup key for a piece of post text.
///
/// Two posts with the same key are considered the same capture: the key is
/// the lowercased, whitespace-trimmed prefix of the body text.
#[must_use]
pub fn dedup_key(text: &str) -> String {
    text.chars()
        .take(DEDUP_PREFIX_LEN)
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// A post captured from the neighborhood feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Body text with author/time/reply fragments stripped
    pub text: String,
    /// Display name of the post author
    pub author: String,
    /// Permalink, when the feed exposed one
    pub url: Option<String>,
    /// Search term this post was harvested under
    pub search_term: String,
    /// Scroll iteration at which the post was first seen
    pub discovered_at_scroll: u32,
    /// Relevance verdict, set once by the classifier
    pub classification: Option<Verdict>,
}

impl Post {
    /// Create a post as produced by extraction (not yet tagged or classified).
    #[must_use]
    pub fn new(text: impl Into<String>, author: impl Into<String>, url: Option<String>) -> Self {
        Self {
            text: text.into(),
            author: author.into(),
            url,
            search_term: String::new(),
            discovered_at_scroll: 0,
            classification: None,
        }
    }

    /// Dedup key for this post's body text.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        dedup_key(&self.text)
    }

    /// Whether the classifier marked this post as a service opportunity.
    #[must_use]
    pub fn is_relevant(&self) -> bool {
        self.classification.as_ref().is_some_and(|v| v.relevant)
    }
}

/// Home-service taxonomy used by the relevance classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    /// Mowing, landscaping, irrigation, tree trimming
    LawnCare,
    /// Pool cleaning, maintenance, equipment repair
    Pool,
    /// Extermination and prevention
    PestControl,
    /// Window and gutter cleaning
    WindowCleaning,
    /// Repairs, installations, small jobs
    Handyman,
    /// General contracting work
    Contractor,
    /// Plumbing
    Plumber,
    /// Electrical work
    Electrician,
    /// Roofing
    Roofer,
    /// House cleaning services
    Cleaning,
    /// Service-related but not a listed trade
    General,
    /// Not a service request
    None,
}

impl ServiceCategory {
    /// Human-readable name for report rendering.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::LawnCare => "Lawn Care",
            Self::Pool => "Pool",
            Self::PestControl => "Pest Control",
            Self::WindowCleaning => "Window Cleaning",
            Self::Handyman => "Handyman",
            Self::Contractor => "Contractor",
            Self::Plumber => "Plumber",
            Self::Electrician => "Electrician",
            Self::Roofer => "Roofer",
            Self::Cleaning => "Cleaning",
            Self::General => "General",
            Self::None => "None",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Relevance classification attached to a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the post is a service opportunity
    pub relevant: bool,
    /// Which trade the post falls under
    pub service_category: ServiceCategory,
    /// Brief model-supplied (or error) explanation
    pub reason: String,
}

impl Verdict {
    /// Sentinel verdict returned when every classification credential is spent.
    #[must_use]
    pub fn exhausted() -> Self {
        Self {
            relevant: false,
            service_category: ServiceCategory::None,
            reason: "all_keys_exhausted".to_string(),
        }
    }

    /// Degraded verdict carrying a per-post classification failure.
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            relevant: false,
            service_category: ServiceCategory::None,
            reason: reason.into(),
        }
    }
}

/// Authentication lifecycle for a single run.
///
/// Transitions are driven solely by the session manager:
/// `Unauthenticated -> AwaitingVerification -> Authenticated | Failed`,
/// with the verification step skipped when no challenge is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No login attempt has completed yet
    Unauthenticated,
    /// Password accepted, waiting on the one-time code
    AwaitingVerification,
    /// Admitted to the authenticated view
    Authenticated,
    /// Login or verification failed; the run must abort
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_truncates_and_lowercases() {
        let long = "AAAA".repeat(30);
        let key = dedup_key(&long);
        assert_eq!(key.len(), DEDUP_PREFIX_LEN);
        assert_eq!(key, "a".repeat(DEDUP_PREFIX_LEN));
    }

    #[test]
    fn test_dedup_key_trims_whitespace() {
        assert_eq!(dedup_key("  Pool guy needed  "), "pool guy needed");
    }

    #[test]
    fn test_dedup_key_identical_prefixes_collide() {
        let prefix = "x".repeat(DEDUP_PREFIX_LEN);
        let a = format!("{prefix} first tail");
        let b = format!("{prefix} second tail");
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn test_service_category_serde_snake_case() {
        let json = serde_json::to_string(&ServiceCategory::LawnCare).expect("serialize");
        assert_eq!(json, "\"lawn_care\"");

        let parsed: ServiceCategory =
            serde_json::from_str("\"pest_control\"").expect("deserialize");
        assert_eq!(parsed, ServiceCategory::PestControl);
    }

    #[test]
    fn test_verdict_sentinels() {
        let v = Verdict::exhausted();
        assert!(!v.relevant);
        assert_eq!(v.reason, "all_keys_exhausted");

        let v = Verdict::failure("analysis_error: timeout");
        assert!(!v.relevant);
        assert_eq!(v.service_category, ServiceCategory::None);
    }

    #[test]
    fn test_post_relevance_requires_verdict() {
        let mut post = Post::new("Need a plumber", "Jane Doe", None);
        assert!(!post.is_relevant());

        post.classification = Some(Verdict {
            relevant: true,
            service_category: ServiceCategory::Plumber,
            reason: "asking for a plumber".to_string(),
        });
        assert!(post.is_relevant());
    }
}
