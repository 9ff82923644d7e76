//! The scroll/extract/dedup harvest loop.

use crate::error::{Result, ScanError};
use crate::extractor::{PostExtractor, SelectorOracle};
use porchlight_browser::humanize::{self, Pace};
use porchlight_browser::PageDriver;
use porchlight_core::{HarvestConfig, Post};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;

/// Selector fallbacks for the search input.
const SEARCH_BOX_SELECTORS: &[&str] = &[
    "#search-input-field",
    r#"input[aria-label="Search Nextdoor"]"#,
    r#"input[placeholder*="Search"]"#,
    r#"input[placeholder*="search"]"#,
    r#"input[type="search"]"#,
    r#"[data-testid="search-input"]"#,
    ".search-input",
    r#"input[name="search"]"#,
    "#search",
    r#"input[aria-label*="Search"]"#,
];

/// Selector fallbacks for the search submit control; Enter in the box is the
/// last resort.
const SEARCH_BUTTON_SELECTORS: &[&str] = &[
    r#"button[type="submit"]"#,
    r#"button[aria-label*="Search"]"#,
    r#"[data-testid="search-button"]"#,
    ".search-button",
];

/// Selector fallbacks for the results-type tab.
const POSTS_TAB_SELECTORS: &[&str] = &[
    r#"[data-testid="tab-posts"]"#,
    r#"a[role="tab"][aria-controls*="posts-panel"]"#,
    r#"[href*="/search/posts/"]"#,
];

/// Opens the recency dropdown by clicking the button showing "All Time".
/// The button has no stable id, so it is located by its label text.
const OPEN_TIME_FILTER_SCRIPT: &str = r#"(() => {
    const spans = document.querySelectorAll('span');
    for (const span of spans) {
        if (span.textContent.includes('All Time')) {
            const button = span.closest('.BaseButton__emelwr2') || span.closest('div[data-part="button"]');
            if (button) { button.click(); return true; }
        }
    }
    return false;
})()"#;

/// Picks the "This week" entry out of the opened dropdown.
const SELECT_THIS_WEEK_SCRIPT: &str = r#"(() => {
    const candidates = document.querySelectorAll('span, div, button, li');
    for (const el of candidates) {
        if (el.textContent.trim() === 'This week') { el.click(); return true; }
    }
    return false;
})()"#;

/// Clicks every visible dismiss control for transient overlays.
const DISMISS_POPUPS_SCRIPT: &str = r#"(() => {
    let closed = 0;
    const closeSelectors = [
        '[aria-label="Close"]',
        'button[aria-label="Close"]',
        '.close-button',
        '[data-testid="close-button"]',
        '.modal-close',
        '[aria-label="Dismiss"]'
    ];
    for (const selector of closeSelectors) {
        for (const el of document.querySelectorAll(selector)) {
            if (el.offsetParent !== null) {
                try { el.click(); closed += 1; } catch (e) {}
            }
        }
    }
    return closed;
})()"#;

/// Issues searches and accumulates deduplicated posts across scrolls.
///
/// The results-type and recency filters are applied on the first search of a
/// run only; the flag makes reapplication a no-op.
pub struct Harvester<'a> {
    driver: &'a dyn PageDriver,
    extractor: PostExtractor,
    config: HarvestConfig,
    pace: Pace,
    filters_applied: bool,
}

impl<'a> Harvester<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        extractor: PostExtractor,
        config: HarvestConfig,
        pace: Pace,
    ) -> Self {
        Self {
            driver,
            extractor,
            config,
            pace,
            filters_applied: false,
        }
    }

    /// Whether the one-time result filters have been applied this run.
    #[must_use]
    pub fn filters_applied(&self) -> bool {
        self.filters_applied
    }

    /// Search for `term` and collect posts until the feed runs dry or the
    /// scroll budget is spent.
    pub async fn search_and_collect(
        &mut self,
        term: &str,
        mut oracle: Option<&mut dyn SelectorOracle>,
    ) -> Result<Vec<Post>> {
        self.submit_search(term).await?;

        if self.filters_applied {
            tracing::debug!("filters already applied this run");
        } else {
            self.apply_filters().await;
            self.filters_applied = true;
        }

        let mut collected: Vec<Post> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut stagnant_iterations = 0u32;

        for scroll in 1..=self.config.max_scrolls {
            let height_before = humanize::page_height(self.driver).await?;

            let markup = self.driver.page_source().await?;
            let fresh = self
                .extractor
                .extract_with_oracle(&markup, oracle.as_deref_mut())
                .await;

            let mut added = 0u32;
            for mut post in fresh {
                if seen.insert(post.dedup_key()) {
                    post.search_term = term.to_string();
                    post.discovered_at_scroll = scroll;
                    collected.push(post);
                    added += 1;
                }
            }
            tracing::info!(scroll, added, total = collected.len(), "harvest iteration");

            if added == 0 {
                stagnant_iterations += 1;
                if stagnant_iterations >= self.config.stagnation_limit {
                    tracing::info!(scroll, "no new posts for {} iterations, content end reached", stagnant_iterations);
                    break;
                }
            } else {
                stagnant_iterations = 0;
            }

            humanize::human_scroll(self.driver, &self.pace).await?;

            let height_after = humanize::page_height(self.driver).await?;
            if height_after == height_before {
                tracing::debug!(height = height_after, "page extent unchanged, forcing scroll");
                humanize::forced_scroll_recovery(self.driver, &self.pace, height_after).await?;
            }

            self.dismiss_popups().await;
        }

        tracing::info!(total = collected.len(), term, "harvest complete");
        Ok(collected)
    }

    /// Focus the search box, type the term, and trigger the search.
    async fn submit_search(&self, term: &str) -> Result<()> {
        tracing::info!(term, "submitting search");

        let search_box = self
            .first_present(SEARCH_BOX_SELECTORS)
            .await
            .ok_or_else(|| ScanError::SearchControlsMissing("search box".to_string()))?;

        self.driver.click(search_box).await?;
        humanize::type_like_human(self.driver, search_box, term, &self.pace).await?;

        match self.first_present(SEARCH_BUTTON_SELECTORS).await {
            Some(button) => self.driver.click(button).await?,
            None => {
                tracing::debug!("no search button, pressing Enter");
                self.driver.press_enter(search_box).await?;
            }
        }

        sleep(Duration::from_secs(self.config.search_settle_secs)).await;
        Ok(())
    }

    /// Switch results to posts only and restrict recency to this week.
    ///
    /// Filter misses are logged, not fatal: the harvest still works against
    /// unfiltered results, just with more noise.
    async fn apply_filters(&self) {
        match self.first_present(POSTS_TAB_SELECTORS).await {
            Some(tab) => match self.driver.click(tab).await {
                Ok(()) => tracing::info!("posts tab selected"),
                Err(e) => tracing::warn!(error = %e, "could not click posts tab"),
            },
            None => tracing::warn!("posts tab not found"),
        }
        humanize::field_pause(&self.pace).await;

        match self.driver.execute(OPEN_TIME_FILTER_SCRIPT).await {
            Ok(opened) if opened.as_bool() == Some(true) => {
                humanize::field_pause(&self.pace).await;
                match self.driver.execute(SELECT_THIS_WEEK_SCRIPT).await {
                    Ok(selected) if selected.as_bool() == Some(true) => {
                        tracing::info!("recency filter set to this week");
                    }
                    Ok(_) => tracing::warn!("'This week' option not found"),
                    Err(e) => tracing::warn!(error = %e, "could not select recency option"),
                }
            }
            Ok(_) => tracing::warn!("recency filter button not found"),
            Err(e) => tracing::warn!(error = %e, "could not open recency filter"),
        }
    }

    async fn dismiss_popups(&self) {
        match self.driver.execute(DISMISS_POPUPS_SCRIPT).await {
            Ok(count) => {
                if let Some(closed) = count.as_i64() {
                    if closed > 0 {
                        tracing::debug!(closed, "dismissed overlays");
                    }
                }
            }
            Err(e) => tracing::debug!(error = %e, "popup dismissal script failed"),
        }
    }

    async fn first_present(&self, selectors: &[&'static str]) -> Option<&'static str> {
        for selector in selectors {
            if self.driver.exists(selector).await {
                return Some(selector);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeDriver;

    fn wrap(containers: &str) -> String {
        format!("<html><body><div id=\"main_content\">{containers}</div></body></html>")
    }

    fn feed_item(text: &str) -> String {
        format!("<div data-testid=\"dwell-tracker-searchFeedItem-1\">{text}</div>")
    }

    fn post_markup(author_loc: &str, body: &str) -> String {
        feed_item(&format!("{author_loc} · 2 hr ago{body}"))
    }

    fn test_config(max_scrolls: u32) -> HarvestConfig {
        HarvestConfig {
            max_scrolls,
            stagnation_limit: 3,
            search_settle_secs: 0,
            login_settle_secs: 0,
        }
    }

    fn harvester<'a>(driver: &'a FakeDriver, max_scrolls: u32) -> Harvester<'a> {
        Harvester::new(
            driver,
            PostExtractor::new("https://nextdoor.com"),
            test_config(max_scrolls),
            Pace::instant(),
        )
    }

    fn with_search_controls(driver: &FakeDriver) {
        driver.add_present("#search-input-field");
        driver.add_present(r#"button[type="submit"]"#);
    }

    #[tokio::test]
    async fn test_search_box_missing_is_structural_failure() {
        let driver = FakeDriver::new();
        let mut h = harvester(&driver, 20);

        let result = h.search_and_collect("pool", None).await;
        assert!(matches!(result, Err(ScanError::SearchControlsMissing(_))));
    }

    #[tokio::test]
    async fn test_stagnant_feed_terminates_early() {
        let driver = FakeDriver::new();
        with_search_controls(&driver);
        driver.queue_page(&wrap(&post_markup(
            "Jane DoeStudio City",
            "Need a reliable pool guy, anyone have recommendations here",
        )));

        let mut h = harvester(&driver, 20);
        let posts = h.search_and_collect("pool", None).await.expect("harvest");

        assert_eq!(posts.len(), 1);
        // 1 productive iteration + 3 stagnant ones, far below the budget
        assert_eq!(*driver.page_reads.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_scroll_budget_bounds_growing_feed() {
        let driver = FakeDriver::new();
        with_search_controls(&driver);
        // A feed that yields a brand-new post every scroll
        for i in 0..10 {
            driver.queue_page(&wrap(&post_markup(
                "Jane DoeStudio City",
                &format!("Unique request number {i} about a leaking irrigation valve"),
            )));
        }

        let mut h = harvester(&driver, 4);
        let posts = h.search_and_collect("lawn", None).await.expect("harvest");

        assert_eq!(*driver.page_reads.lock().unwrap(), 4);
        assert_eq!(posts.len(), 4);
    }

    #[tokio::test]
    async fn test_dedup_across_scrolls_and_tagging() {
        let driver = FakeDriver::new();
        with_search_controls(&driver);
        let first = post_markup(
            "Jane DoeStudio City",
            "Need a reliable pool guy, anyone have recommendations here",
        );
        let second = post_markup(
            "Sam LeeEncino",
            "Looking for a gutter cleaning crew for a two story house",
        );
        driver.queue_page(&wrap(&first));
        driver.queue_page(&wrap(&format!("{first}{second}")));

        let mut h = harvester(&driver, 20);
        let posts = h.search_and_collect("gutter", None).await.expect("harvest");

        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p.search_term == "gutter"));
        assert_eq!(posts[0].discovered_at_scroll, 1);
        assert_eq!(posts[1].discovered_at_scroll, 2);
    }

    #[tokio::test]
    async fn test_filters_applied_once_across_searches() {
        let driver = FakeDriver::new();
        with_search_controls(&driver);
        driver.queue_page(&wrap(""));

        let mut h = harvester(&driver, 1);
        h.search_and_collect("pool", None).await.expect("first");
        assert!(h.filters_applied());
        h.search_and_collect("lawn", None).await.expect("second");

        let scripts = driver.scripts.lock().unwrap();
        let filter_opens = scripts.iter().filter(|s| s.contains("All Time")).count();
        assert_eq!(filter_opens, 1, "recency filter applied exactly once");
    }

    #[tokio::test]
    async fn test_popups_dismissed_each_iteration() {
        let driver = FakeDriver::new();
        with_search_controls(&driver);
        driver.queue_page(&wrap(""));

        let mut h = harvester(&driver, 20);
        h.search_and_collect("pool", None).await.expect("harvest");

        // Stagnation stops the loop on its third iteration, before that
        // iteration's scroll-and-dismiss step runs
        let scripts = driver.scripts.lock().unwrap();
        let dismissals = scripts.iter().filter(|s| s.contains("closeSelectors")).count();
        assert_eq!(dismissals, 2, "one dismissal per completed iteration");
    }
}
