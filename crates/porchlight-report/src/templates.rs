//! Plain-text report bodies.
//!
//! These render exactly what lands in the operator's inbox; layout is a
//! product artifact, not a parsing contract.

use chrono::{DateTime, Local};
use porchlight_core::Post;

const RULE: &str = "==================================================";
const POST_RULE: &str = "--------------------------------------------------";

/// Maximum body characters quoted per post in the daily report.
const QUOTE_LEN: usize = 200;

/// Render the daily opportunity report for the relevant posts.
///
/// Posts are listed alphabetically by author.
#[must_use]
pub fn daily_report(relevant: &[Post], generated_at: DateTime<Local>) -> String {
    if relevant.is_empty() {
        return "No relevant neighborhood posts found.".to_string();
    }

    let search_term = relevant
        .first()
        .map(|p| p.search_term.as_str())
        .unwrap_or("unknown");

    let mut sorted: Vec<&Post> = relevant.iter().collect();
    sorted.sort_by(|a, b| a.author.cmp(&b.author));

    let mut lines = Vec::new();
    lines.push("NEIGHBORHOOD SEARCH RESULTS".to_string());
    lines.push(RULE.to_string());
    lines.push(format!("Search: \"{search_term}\""));
    lines.push(format!("Day: {}", generated_at.format("%A")));
    lines.push(format!(
        "Generated: {}",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    lines.push(RULE.to_string());
    lines.push(String::new());
    lines.push("SERVICE OPPORTUNITIES:".to_string());
    lines.push(String::new());

    for (i, post) in sorted.iter().enumerate() {
        let category = post
            .classification
            .as_ref()
            .map(|v| v.service_category.display_name())
            .unwrap_or("General");

        lines.push(format!("{}. {} - {}", i + 1, post.author, category));
        lines.push(format!("   Post: {}", truncate_chars(&post.text, QUOTE_LEN)));
        if let Some(url) = &post.url {
            lines.push(format!("   Link: {url}"));
        }
        lines.push(format!("   {POST_RULE}"));
        lines.push(String::new());
    }

    lines.push("Generated by Porchlight Monitor".to_string());
    lines.push(RULE.to_string());

    lines.join("\n")
}

/// Subject line for the daily report.
#[must_use]
pub fn daily_subject(term: &str, relevant_count: usize, generated_at: DateTime<Local>) -> String {
    format!(
        "Porchlight - {} ({}) - {} posts - {}",
        generated_at.format("%A"),
        term,
        relevant_count,
        generated_at.format("%Y-%m-%d")
    )
}

/// Operator notice sent when a login verification challenge is active and the
/// scanner is waiting on a code through the shared document.
#[must_use]
pub fn verification_notice(document_url: &str, generated_at: DateTime<Local>) -> String {
    format!(
        "LOGIN VERIFICATION REQUIRED (DOCUMENT POLLING ACTIVE)\n\
        \n\
        The site is requesting a verification code during login.\n\
        \n\
        The scanner created a private document and is waiting for your code.\n\
        \n\
        INSTRUCTIONS:\n\
        1. Check your email/phone for the site's verification code\n\
        2. Open this link: {document_url}\n\
        3. Edit the document\n\
        4. Replace \"ENTER_2FA_CODE_HERE\" with your 6-digit verification code\n\
        5. Save the document\n\
        \n\
        The scanner checks for your code every 30 seconds for the next 3 minutes.\n\
        The document is deleted automatically after use.\n\
        \n\
        Time: {}\n\
        \n\
        Generated by Porchlight Monitor",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Subject line for the verification notice.
#[must_use]
pub fn verification_subject(generated_at: DateTime<Local>) -> String {
    format!(
        "Porchlight verification code needed - {}",
        generated_at.format("%Y-%m-%d")
    )
}

/// Alert body for a search that produced no posts at all.
#[must_use]
pub fn zero_results_alert(term: &str, generated_at: DateTime<Local>) -> String {
    format!(
        "ZERO POSTS ALERT\n\
        \n\
        The scanner found 0 posts for today's search.\n\
        \n\
        Details:\n\
        - Day: {}\n\
        - Search term: '{}'\n\
        - Time: {}\n\
        \n\
        This could indicate:\n\
        1. No posts matching the search this week\n\
        2. Possible account throttling\n\
        3. Technical issue\n\
        \n\
        If this happens multiple days in a row, check manually.\n\
        \n\
        Generated by Porchlight Monitor",
        generated_at.format("%A"),
        term,
        generated_at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Subject line for the zero-results alert.
#[must_use]
pub fn zero_results_subject(term: &str, generated_at: DateTime<Local>) -> String {
    format!(
        "Porchlight zero posts - {} - {}",
        term,
        generated_at.format("%Y-%m-%d")
    )
}

/// Alert body for a run that could not authenticate.
#[must_use]
pub fn auth_failure_alert(detail: &str, generated_at: DateTime<Local>) -> String {
    format!(
        "LOGIN FAILED - SCAN ABORTED\n\
        \n\
        The scanner could not authenticate and the run was aborted.\n\
        \n\
        Detail: {}\n\
        Time: {}\n\
        \n\
        Generated by Porchlight Monitor",
        detail,
        generated_at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Truncate to at most `limit` characters, appending an ellipsis when cut.
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{cut}...")
    }
}
