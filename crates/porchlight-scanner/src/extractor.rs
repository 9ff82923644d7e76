//! Markup-to-post extraction.
//!
//! The feed concatenates author, location, timestamp, body, and trailing
//! reply text into one run of text per container. Extraction is a pure
//! function of the rendered markup: pick containers through a ladder of
//! selectors, then peel the concatenated fields apart with the heuristics
//! below. Individual containers that fail to parse are skipped, never fatal.

use once_cell::sync::Lazy;
use porchlight_core::Post;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// Ordered container-selection ladder; the first rung yielding containers wins.
const CONTAINER_LADDER: &[&str] = &[
    // Structural attribute marker, the most stable hook the feed exposes
    r#"div[data-testid*="dwell-tracker-searchFeedItem"]"#,
    // Generated class name observed on feed items
    "div._7uk7470",
    // Secondary structural attribute
    r#"div[data-v3-view-type="V3Wrapper"]"#,
];

/// Permalink anchor inside a post container.
const POST_LINK_SELECTOR: &str = "a.BaseLink__kjvg670";

/// Results live under this element; anything outside is chrome.
const MAIN_CONTENT_SELECTOR: &str = "#main_content";

/// System notices that masquerade as posts.
const SYSTEM_NOTICE_MARKERS: &[&str] = &["Traffic Alerts"];

/// Bodies shorter than this are fragments, not posts.
const MIN_BODY_CHARS: usize = 20;

/// Bodies shorter than this are treated as replies rather than main posts.
const MIN_MAIN_POST_CHARS: usize = 40;

/// Leading tokens that mark a reply rather than a main post.
const REPLY_INDICATORS: &[&str] = &[
    "@",
    "Reply to",
    "Thanks",
    "Thank you",
    "Yes",
    "No",
    "Agree",
    "Same here",
];

/// Known neighborhood names, longer names before their substrings so
/// "West Studio City" never misattributes part of an author's name.
const NEIGHBORHOODS: &[&str] = &[
    "West Studio City",
    "Studio City",
    "Sherman Oaks",
    "Panorama City",
    "Mandeville Canyon",
    "Cahuenga Pass",
    "Brentwood Place",
    "West Hills",
    "North Hollywood",
    "Valley Village",
    "Los Angeles",
    "West LA",
    "Encino",
    "Tarzana",
    "Burbank",
    "Brentwood",
    "Palisades",
    "The Highlands",
    "Glendale",
    "Pasadena",
    "Beverly Hills",
    "WeHo",
    "Kenter",
    "Central",
];

/// Patterns marking the seam where a concatenated reply begins.
/// Best-effort: they can over- or under-trim unusual posts.
static REPLY_SEAMS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Reply count followed by a name and a known location
        r"(\d+)([A-Z][a-z]*\s*[A-Z][a-z]*.*?(?:Los Angeles|Studio City|Sherman Oaks|Encino|Burbank|Panorama City|Mandeville|Cahuenga|Brentwood|Palisades|Highlands|West|Central|Kenter|WeHo|Glendale))",
        // A multi-digit count running straight into capitalized text
        r"(\d{2,})([A-Z][A-Z][a-z])",
        // A timestamp followed by a name
        r"(\d+\s*hr?\s*ago)([A-Z][a-z]+ [A-Z])",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid reply seam pattern"))
    .collect()
});

static LEADING_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\s*").expect("valid pattern"));
static TRAILING_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s*$").expect("valid pattern"));
static STATE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(CA|California)\s*$").expect("valid pattern"));

static MAIN_CONTENT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(MAIN_CONTENT_SELECTOR).expect("valid selector"));
static POST_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(POST_LINK_SELECTOR).expect("valid selector"));

/// Supplies a container selector when every rung of the static ladder
/// comes up empty. Implemented by the classifier's model.
#[async_trait::async_trait]
pub trait SelectorOracle: Send {
    /// Propose a `.class` or `[attr="value"]` selector for post containers.
    async fn discover_selector(&mut self, markup: &str) -> Option<String>;
}

#[async_trait::async_trait]
impl SelectorOracle for porchlight_llm::Classifier {
    async fn discover_selector(&mut self, markup: &str) -> Option<String> {
        porchlight_llm::Classifier::discover_selector(self, markup).await
    }
}

/// Text and permalink pulled from one container before field parsing.
struct RawContainer {
    full_text: String,
    href: Option<String>,
}

/// Parses rendered feed markup into deduplicated posts.
pub struct PostExtractor {
    base_url: String,
}

impl PostExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Extract posts using the static selector ladder only.
    pub fn extract(&self, markup: &str) -> Vec<Post> {
        self.parse_all(Self::collect_raw(markup, None))
    }

    /// Extract posts, consulting the oracle for a selector when the static
    /// ladder finds nothing.
    pub async fn extract_with_oracle(
        &self,
        markup: &str,
        oracle: Option<&mut dyn SelectorOracle>,
    ) -> Vec<Post> {
        let mut raw = Self::collect_raw(markup, None);

        if raw.is_empty() {
            if let Some(oracle) = oracle {
                tracing::info!("no containers via known selectors, asking model");
                if let Some(selector) = oracle.discover_selector(markup).await {
                    raw = Self::collect_raw(markup, Some(&selector));
                }
            }
        }

        self.parse_all(raw)
    }

    /// Gather container text synchronously so the parsed DOM never crosses
    /// an await point.
    fn collect_raw(markup: &str, override_selector: Option<&str>) -> Vec<RawContainer> {
        let document = Html::parse_document(markup);

        let Some(main) = document.select(&MAIN_CONTENT).next() else {
            tracing::warn!("main content area not found in markup");
            return Vec::new();
        };

        let containers: Vec<ElementRef> = match override_selector {
            Some(sel) => match Selector::parse(sel) {
                Ok(parsed) => main.select(&parsed).collect(),
                Err(_) => {
                    tracing::warn!(selector = sel, "unusable override selector");
                    Vec::new()
                }
            },
            None => CONTAINER_LADDER
                .iter()
                .filter_map(|rung| Selector::parse(rung).ok())
                .map(|parsed| main.select(&parsed).collect::<Vec<_>>())
                .find(|found| !found.is_empty())
                .unwrap_or_default(),
        };

        tracing::debug!(count = containers.len(), "candidate post containers");

        containers
            .into_iter()
            .map(|container| RawContainer {
                full_text: container
                    .text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect(),
                href: container
                    .select(&POST_LINK)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(str::to_string),
            })
            .collect()
    }

    /// Parse every container, dropping failures and duplicate captures.
    fn parse_all(&self, raw: Vec<RawContainer>) -> Vec<Post> {
        let mut posts = Vec::new();
        let mut seen = HashSet::new();

        for container in raw {
            let Some(post) = self.parse_container(&container) else {
                continue;
            };

            if seen.insert(post.dedup_key()) {
                posts.push(post);
            } else {
                tracing::debug!(author = %post.author, "skipped duplicate capture");
            }
        }

        tracing::debug!(count = posts.len(), "extracted unique posts");
        posts
    }

    /// Peel one container's concatenated text into author and body.
    fn parse_container(&self, container: &RawContainer) -> Option<Post> {
        let full_text = container.full_text.trim();
        if full_text.is_empty()
            || SYSTEM_NOTICE_MARKERS.iter().any(|m| full_text.contains(m))
        {
            return None;
        }

        let (author, mut body) = match full_text.split_once(" · ") {
            Some((author_location, remaining)) => {
                let author = resolve_author(author_location);
                let body = strip_time_ago(remaining);
                let body = truncate_reply(&body);
                (author, body)
            }
            // No separator at all; treat the whole run as body text
            None => (String::new(), full_text.to_string()),
        };

        body = LEADING_DIGITS.replace(&body, "").to_string();
        body = TRAILING_DIGITS.replace(&body, "").trim().to_string();

        if author.is_empty() || body.chars().count() < MIN_BODY_CHARS {
            return None;
        }

        if !is_main_post(&body) {
            tracing::debug!(author = %author, "skipped reply fragment");
            return None;
        }

        let url = container.href.as_ref().map(|href| {
            if href.starts_with("http") {
                href.clone()
            } else {
                format!("{}{}", self.base_url, href)
            }
        });

        Some(Post::new(body, author, url))
    }
}

/// Split the author's display name off the concatenated location.
///
/// Known neighborhoods are matched first (longest names first, so a prefix
/// of "West Studio City" is never read as part of the name); the ", CA"
/// split and the trailing-state strip are fallbacks.
fn resolve_author(author_location: &str) -> String {
    let author_location = author_location.trim();

    for neighborhood in NEIGHBORHOODS {
        if let Some(idx) = author_location.find(neighborhood) {
            if idx > 0 {
                let name = author_location[..idx].trim();
                return STATE_SUFFIX.replace(name, "").trim().to_string();
            }
        }
    }

    if let Some(idx) = author_location.find(", CA") {
        return author_location[..idx].trim().to_string();
    }

    STATE_SUFFIX.replace(author_location, "").trim().to_string()
}

/// Drop the "time ago" fragment, keeping everything after it.
fn strip_time_ago(remaining: &str) -> String {
    match remaining.split_once(" ago") {
        Some((_, body)) => body.trim().to_string(),
        None => remaining.trim().to_string(),
    }
}

/// Cut concatenated reply content off the end of the body.
fn truncate_reply(body: &str) -> String {
    for seam in REPLY_SEAMS.iter() {
        if let Some(m) = seam.find(body) {
            return body[..m.start()].trim().to_string();
        }
    }
    body.to_string()
}

/// Whether the body reads as a main post rather than a reply.
fn is_main_post(body: &str) -> bool {
    if body.chars().count() < MIN_MAIN_POST_CHARS {
        return false;
    }

    let head: String = body.chars().take(30).collect();
    !REPLY_INDICATORS.iter().any(|marker| head.contains(marker))
}
