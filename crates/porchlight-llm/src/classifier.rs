//! Post relevance classification and selector discovery.

use crate::chat::ChatModel;
use crate::credentials::CredentialPool;
use crate::error::{LlmError, Result};
use porchlight_core::{Post, ServiceCategory, Verdict};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

/// Token bound for verdict replies.
const VERDICT_MAX_TOKENS: u32 = 250;

/// Token bound for selector discovery replies.
const SELECTOR_MAX_TOKENS: u32 = 100;

/// Largest markup prefix submitted for selector discovery.
const MARKUP_PREFIX_CHARS: usize = 50_000;

/// Classifies harvested posts against the home-service taxonomy.
///
/// Holds the credential pool; its cursor is advanced here and nowhere else.
pub struct Classifier {
    model: Box<dyn ChatModel>,
    pool: CredentialPool,
    request_delay: Duration,
}

impl Classifier {
    pub fn new(model: Box<dyn ChatModel>, pool: CredentialPool, request_delay: Duration) -> Self {
        Self {
            model,
            pool,
            request_delay,
        }
    }

    /// Classify one post. Never fails: service errors degrade to a
    /// non-relevant verdict with the failure recorded in `reason`.
    pub async fn classify(&mut self, text: &str, author: &str) -> Verdict {
        let prompt = relevance_prompt(text, author);

        match self.complete_with_rotation(&prompt, VERDICT_MAX_TOKENS).await {
            Ok(content) => parse_verdict(&content)
                .unwrap_or_else(|e| Verdict::failure(format!("analysis_error: {e}"))),
            Err(LlmError::CredentialsExhausted) => Verdict::exhausted(),
            Err(e) => Verdict::failure(format!("analysis_error: {e}")),
        }
    }

    /// Classify every post in place, pacing calls to respect service
    /// throughput limits. Returns the number of relevant posts.
    pub async fn classify_all(&mut self, posts: &mut [Post]) -> usize {
        let total = posts.len();
        tracing::info!(total, "classifying harvested posts");

        let mut relevant = 0;
        for (i, post) in posts.iter_mut().enumerate() {
            let verdict = self.classify(&post.text, &post.author).await;

            if verdict.relevant {
                relevant += 1;
                tracing::info!(
                    author = %post.author,
                    category = %verdict.service_category,
                    "relevant post {}/{}",
                    i + 1,
                    total
                );
            } else {
                tracing::debug!(
                    author = %post.author,
                    reason = %verdict.reason,
                    "not relevant {}/{}",
                    i + 1,
                    total
                );
            }
            post.classification = Some(verdict);

            if i + 1 < total && !self.request_delay.is_zero() {
                sleep(self.request_delay).await;
            }
        }

        tracing::info!(relevant, total, "classification finished");
        relevant
    }

    /// Ask the model for a container selector when every known selector came
    /// up empty. Returns a validated `.class` or `[attr="value"]` selector.
    pub async fn discover_selector(&mut self, markup: &str) -> Option<String> {
        let prefix: String = markup.chars().take(MARKUP_PREFIX_CHARS).collect();
        let prompt = selector_prompt(&prefix);

        match self.complete_with_rotation(&prompt, SELECTOR_MAX_TOKENS).await {
            Ok(reply) => {
                let candidate = reply.trim();
                match validate_selector(candidate) {
                    Some(selector) => {
                        tracing::info!(%selector, "model proposed container selector");
                        Some(selector)
                    }
                    None => {
                        tracing::warn!(reply = %candidate, "model returned invalid selector");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "selector discovery failed");
                None
            }
        }
    }

    /// One request, retried across the credential pool on rate limits.
    ///
    /// With N credentials and a permanently rate-limited service this issues
    /// exactly N requests before giving up.
    async fn complete_with_rotation(&mut self, prompt: &str, max_tokens: u32) -> Result<String> {
        loop {
            let key = self.pool.current().to_string();
            match self.model.complete(&key, prompt, max_tokens).await {
                Ok(content) => {
                    self.pool.record_use();
                    return Ok(content);
                }
                Err(LlmError::RateLimitExceeded { message }) => {
                    tracing::warn!(
                        key_position = self.pool.position(),
                        %message,
                        "rate limit hit, rotating credential"
                    );
                    if !self.pool.advance() {
                        return Err(LlmError::CredentialsExhausted);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Prompt instructing binary relevance classification with a constrained
/// JSON reply.
fn relevance_prompt(text: &str, author: &str) -> String {
    format!(
        "Analyze this neighborhood post for relevance to home services \
        (lawn care, pool maintenance, pest control, window cleaning, handyman \
        work, contractors, plumbers, electricians, roofers, cleaning services).\n\
        \n\
        Post Author: {author}\n\
        Post Text: {text}\n\
        \n\
        Return ONLY a JSON object with:\n\
        {{\n\
            \"relevant\": true/false,\n\
            \"service_type\": \"lawn_care|pool|pest_control|window_cleaning|handyman|contractor|plumber|electrician|roofer|cleaning|general|none\",\n\
            \"reason\": \"brief explanation\"\n\
        }}\n\
        \n\
        Answer TRUE if the post is:\n\
        - Asking for recommendations for ANY home service provider\n\
        - Complaining about service providers (contractors, cleaners, etc.)\n\
        - Describing home maintenance/repair problems needing professional help\n\
        - Looking for help with home repairs, maintenance, or improvements\n\
        - Seeking quotes or estimates for home work\n\
        - Posts about bad experiences with contractors/service providers\n\
        - Offering services (potential competitor intelligence)\n\
        \n\
        Answer FALSE if the post is:\n\
        - General neighborhood discussions unrelated to services\n\
        - Food/restaurant recommendations\n\
        - Lost pets or general community announcements\n\
        - Social events or activities\n\
        - Crime/safety discussions\n\
        - Political discussions\n\
        - Simple questions about local businesses unrelated to home services\n\
        \n\
        Be decisive - answer TRUE or FALSE only."
    )
}

/// Prompt asking for a CSS-like selector for repeating post containers.
fn selector_prompt(markup_prefix: &str) -> String {
    format!(
        "Analyze this search results page HTML and identify the CSS selector \
        for individual post containers.\n\
        \n\
        Look for repeating div elements that contain:\n\
        - Author name/avatar\n\
        - Post text content\n\
        - Timestamp\n\
        - Comment count\n\
        \n\
        Return ONLY the CSS selector in one of these formats:\n\
        - Class selector: .classname\n\
        - Attribute selector: [attribute-name=\"value\"]\n\
        \n\
        HTML snippet:\n\
        {markup_prefix}\n\
        \n\
        CSS Selector:"
    )
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    relevant: bool,
    #[serde(default)]
    service_type: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse a model reply into a [`Verdict`].
///
/// Tolerates code-fence markers and leading prose by extracting the first
/// balanced JSON object. Unknown service types fall back to `general`.
pub fn parse_verdict(content: &str) -> std::result::Result<Verdict, LlmError> {
    let cleaned = strip_code_fences(content);
    let json = if cleaned.trim_start().starts_with('{') {
        cleaned.trim().to_string()
    } else {
        first_json_object(&cleaned)
            .ok_or_else(|| LlmError::ParseError("no JSON object in reply".to_string()))?
    };

    let raw: RawVerdict = serde_json::from_str(&json)
        .map_err(|e| LlmError::ParseError(format!("bad verdict JSON: {e}")))?;

    let service_category = match raw.service_type.as_deref() {
        Some(s) => serde_json::from_value::<ServiceCategory>(serde_json::Value::String(
            s.to_string(),
        ))
        .unwrap_or(ServiceCategory::General),
        None if raw.relevant => ServiceCategory::General,
        None => ServiceCategory::None,
    };

    Ok(Verdict {
        relevant: raw.relevant,
        service_category,
        reason: raw.reason.unwrap_or_default(),
    })
}

/// Strip surrounding markdown code fences, keeping the inner text.
fn strip_code_fences(content: &str) -> String {
    if let Some(start) = content.find("```json") {
        let rest = &content[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim().to_string();
        }
    }
    if let Some(start) = content.find("```") {
        let rest = &content[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim().to_string();
        }
    }
    content.trim().to_string()
}

/// Extract the first balanced `{ ... }` object, respecting string literals.
fn first_json_object(content: &str) -> Option<String> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(content[start..=start + i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Accept only syntactic class or attribute selectors from the model.
#[must_use]
pub fn validate_selector(candidate: &str) -> Option<String> {
    let candidate = candidate.lines().next()?.trim();

    let is_class = candidate.starts_with('.')
        && candidate.len() > 1
        && !candidate.contains(char::is_whitespace);
    let is_attribute = candidate.starts_with('[') && candidate.ends_with(']') && candidate.len() > 2;

    if is_class || is_attribute {
        Some(candidate.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_parse_verdict_plain() {
        let verdict = parse_verdict(
            r#"{"relevant": true, "service_type": "pool", "reason": "asking for pool service"}"#,
        )
        .expect("parse");
        assert!(verdict.relevant);
        assert_eq!(verdict.service_category, ServiceCategory::Pool);
    }

    #[test]
    fn test_parse_verdict_fenced() {
        let content = "```json\n{\"relevant\": false, \"service_type\": \"none\", \"reason\": \"lost pet\"}\n```";
        let verdict = parse_verdict(content).expect("parse");
        assert!(!verdict.relevant);
        assert_eq!(verdict.service_category, ServiceCategory::None);
    }

    #[test]
    fn test_parse_verdict_with_leading_prose() {
        let content = "Sure! Here is the analysis you asked for:\n{\"relevant\": true, \"service_type\": \"lawn_care\", \"reason\": \"overgrown yard\"} Let me know if you need more.";
        let verdict = parse_verdict(content).expect("parse");
        assert!(verdict.relevant);
        assert_eq!(verdict.service_category, ServiceCategory::LawnCare);
    }

    #[test]
    fn test_parse_verdict_braces_inside_strings() {
        let content = r#"{"relevant": false, "service_type": "none", "reason": "post contains { and } characters"}"#;
        let verdict = parse_verdict(content).expect("parse");
        assert_eq!(verdict.reason, "post contains { and } characters");
    }

    #[test]
    fn test_parse_verdict_unknown_category_degrades() {
        let verdict =
            parse_verdict(r#"{"relevant": true, "service_type": "arborist", "reason": "trees"}"#)
                .expect("parse");
        assert_eq!(verdict.service_category, ServiceCategory::General);
    }

    #[test]
    fn test_parse_verdict_garbage_errors() {
        assert!(parse_verdict("the model refused to answer").is_err());
    }

    #[test]
    fn test_validate_selector() {
        assert_eq!(
            validate_selector(".post-card"),
            Some(".post-card".to_string())
        );
        assert_eq!(
            validate_selector(r#"[data-testid="feed-item"]"#),
            Some(r#"[data-testid="feed-item"]"#.to_string())
        );
        assert_eq!(validate_selector("div.post"), None);
        assert_eq!(validate_selector("the selector is .post"), None);
        assert_eq!(validate_selector(""), None);
    }

    /// Stub model scripted per test.
    struct StubModel {
        reply: Option<String>,
        calls: Arc<AtomicU32>,
    }

    impl StubModel {
        fn always_rate_limited() -> Self {
            Self {
                reply: None,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn with_reply(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for StubModel {
        async fn complete(&self, _key: &str, _prompt: &str, _max_tokens: u32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(LlmError::RateLimitExceeded {
                    message: "rate_limit_exceeded".to_string(),
                }),
            }
        }
    }

    fn pool(n: usize) -> CredentialPool {
        CredentialPool::new((1..=n).map(|i| format!("key-{i}")).collect()).expect("pool")
    }

    #[tokio::test]
    async fn test_rotation_exhausts_after_exactly_n_attempts() {
        let model = StubModel::always_rate_limited();
        let calls = model.calls.clone();
        let mut classifier = Classifier::new(Box::new(model), pool(3), Duration::ZERO);

        let verdict = classifier.classify("Need a pool cleaner", "Jane Doe").await;
        assert!(!verdict.relevant);
        assert_eq!(verdict.reason, "all_keys_exhausted");

        // One attempt per credential, no wrap-around
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_classify_non_relevant_example() {
        let model = StubModel::with_reply(
            r#"{"relevant": false, "service_type": "none", "reason": "lost pet announcement"}"#,
        );
        let mut classifier = Classifier::new(Box::new(model), pool(1), Duration::ZERO);

        let verdict = classifier
            .classify("Lost cat near Ventura Blvd", "Amy Brown")
            .await;
        assert!(!verdict.relevant);
        assert_eq!(verdict.service_category, ServiceCategory::None);
    }

    #[tokio::test]
    async fn test_classify_all_sets_verdicts_and_counts() {
        let model = StubModel::with_reply(
            r#"{"relevant": true, "service_type": "handyman", "reason": "needs repairs"}"#,
        );
        let mut classifier = Classifier::new(Box::new(model), pool(1), Duration::ZERO);

        let mut posts = vec![
            Post::new("Fence fell over, need a handyman this week", "A", None),
            Post::new("Garage door stuck halfway, recommendations?", "B", None),
        ];
        let relevant = classifier.classify_all(&mut posts).await;

        assert_eq!(relevant, 2);
        assert!(posts.iter().all(|p| p.classification.is_some()));
    }

    #[tokio::test]
    async fn test_discover_selector_validates_reply() {
        let model = StubModel::with_reply(".feed-card");
        let mut classifier = Classifier::new(Box::new(model), pool(1), Duration::ZERO);
        assert_eq!(
            classifier.discover_selector("<div></div>").await,
            Some(".feed-card".to_string())
        );

        let model = StubModel::with_reply("I think the selector is div.feed");
        let mut classifier = Classifier::new(Box::new(model), pool(1), Duration::ZERO);
        assert_eq!(classifier.discover_selector("<div></div>").await, None);
    }
}
