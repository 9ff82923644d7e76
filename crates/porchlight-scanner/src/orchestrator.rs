//! Scan orchestration: one full run from login to report.

use crate::error::Result;
use crate::extractor::{PostExtractor, SelectorOracle};
use crate::harvester::Harvester;
use crate::session::{LoginCredentials, SessionConfig, SessionManager};
use chrono::{DateTime, Datelike, Local};
use porchlight_browser::humanize::Pace;
use porchlight_browser::PageDriver;
use porchlight_channel::CodeChannel;
use porchlight_core::{AppConfig, Post};
use porchlight_llm::Classifier;
use porchlight_report::{templates, Report, ReportSink};
use std::path::{Path, PathBuf};

/// Summary of a completed scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Term searched this run
    pub search_term: String,
    /// Unique posts harvested
    pub harvested: usize,
    /// Posts the classifier marked relevant
    pub relevant: usize,
    /// Whether the daily report was delivered
    pub reported: bool,
    /// Where the harvested-post file landed, if persistence is on
    pub saved_to: Option<PathBuf>,
}

/// Sequences authentication, harvesting, classification, and reporting.
pub struct ScanOrchestrator<'a> {
    driver: &'a dyn PageDriver,
    classifier: &'a mut Classifier,
    channel: Option<&'a dyn CodeChannel>,
    sink: &'a dyn ReportSink,
    config: &'a AppConfig,
    credentials: LoginCredentials,
    session_config: SessionConfig,
    pace: Pace,
    data_dir: Option<PathBuf>,
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        classifier: &'a mut Classifier,
        channel: Option<&'a dyn CodeChannel>,
        sink: &'a dyn ReportSink,
        config: &'a AppConfig,
        credentials: LoginCredentials,
    ) -> Self {
        Self {
            driver,
            classifier,
            channel,
            sink,
            config,
            credentials,
            session_config: SessionConfig::from_app(config, None),
            pace: Pace::default(),
            data_dir: None,
        }
    }

    /// Override the gesture timing profile.
    #[must_use]
    pub fn with_pace(mut self, pace: Pace) -> Self {
        self.pace = pace;
        self
    }

    /// Override the session timing and locations.
    #[must_use]
    pub fn with_session_config(mut self, session_config: SessionConfig) -> Self {
        self.session_config = session_config;
        self
    }

    /// Persist harvested posts to a text file under `dir`.
    #[must_use]
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.data_dir = Some(dir);
        self
    }

    /// Run one complete scan.
    ///
    /// Authentication failures abort the run after alerting the operator;
    /// classification and delivery problems degrade without aborting.
    pub async fn run(&mut self) -> Result<ScanOutcome> {
        let now = Local::now();
        let term = self.config.site.term_for(now.weekday());
        tracing::info!(%term, day = %now.format("%A"), "starting scan");

        let mut session = SessionManager::new(
            self.driver,
            self.channel,
            self.sink,
            self.session_config.clone(),
            self.pace.clone(),
        );
        if let Err(e) = session.authenticate(&self.credentials).await {
            self.send_or_log(Report::new(
                format!("Porchlight login failed - {}", now.format("%Y-%m-%d")),
                templates::auth_failure_alert(&e.to_string(), now),
                self.alert_recipients(),
            ))
            .await;
            return Err(e);
        }

        let mut harvester = Harvester::new(
            self.driver,
            PostExtractor::new(&self.config.site.base_url),
            self.config.harvest.clone(),
            self.pace.clone(),
        );
        let mut posts = harvester
            .search_and_collect(&term, Some(&mut *self.classifier as &mut dyn SelectorOracle))
            .await?;

        if posts.is_empty() {
            tracing::warn!(%term, "search produced no posts");
            self.send_or_log(Report::new(
                templates::zero_results_subject(&term, now),
                templates::zero_results_alert(&term, now),
                self.alert_recipients(),
            ))
            .await;
            return Ok(ScanOutcome {
                search_term: term,
                harvested: 0,
                relevant: 0,
                reported: false,
                saved_to: None,
            });
        }

        let saved_to = match &self.data_dir {
            Some(dir) => match save_posts(dir, &posts, now) {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "saved harvested posts");
                    Some(path)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not save harvested posts");
                    None
                }
            },
            None => None,
        };

        let relevant_count = self.classifier.classify_all(&mut posts).await;
        let harvested = posts.len();
        let relevant: Vec<Post> = posts.iter().filter(|p| p.is_relevant()).cloned().collect();

        let mut reported = false;
        if relevant.is_empty() {
            tracing::info!("no relevant posts, skipping report");
        } else {
            let report_now = Local::now();
            let report = Report::new(
                templates::daily_subject(&term, relevant.len(), report_now),
                templates::daily_report(&relevant, report_now),
                self.config.report.recipients.clone(),
            )
            .with_attachment(
                format!("posts_{}.json", report_now.format("%Y%m%d_%H%M%S")),
                serde_json::to_value(&posts)?,
            );

            match self.sink.send(&report).await {
                Ok(()) => {
                    tracing::info!(relevant = relevant.len(), "daily report delivered");
                    reported = true;
                }
                Err(e) => tracing::warn!(error = %e, "could not deliver daily report"),
            }
        }

        Ok(ScanOutcome {
            search_term: term,
            harvested,
            relevant: relevant_count,
            reported,
            saved_to,
        })
    }

    fn alert_recipients(&self) -> Vec<String> {
        if self.config.report.alert_recipients.is_empty() {
            self.config.report.recipients.clone()
        } else {
            self.config.report.alert_recipients.clone()
        }
    }

    /// Operator alerts are best-effort; a sink failure never masks the
    /// condition being reported.
    async fn send_or_log(&self, report: Report) {
        if let Err(e) = self.sink.send(&report).await {
            tracing::warn!(error = %e, subject = %report.subject, "could not deliver alert");
        }
    }
}

/// Write the harvest to a human-readable text file, one entry per post.
pub fn save_posts(dir: &Path, posts: &[Post], now: DateTime<Local>) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("posts_{}.txt", now.format("%Y-%m-%d_%H-%M")));

    let rule = "=".repeat(50);
    let mut out = String::new();
    out.push_str("Harvested Neighborhood Posts\n");
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("Generated: {}\n", now.format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&rule);
    out.push_str("\n\n");

    for (i, post) in posts.iter().enumerate() {
        out.push_str(&format!("Post {}:\n", i + 1));
        out.push_str(&format!("Author: {}\n", post.author));
        if !post.search_term.is_empty() {
            out.push_str(&format!("Search Term: {}\n", post.search_term));
        }
        out.push_str(&format!("Text: {}\n", post.text));
        if let Some(url) = &post.url {
            out.push_str(&format!("URL: {url}\n"));
        }
        out.push_str(&"-".repeat(50));
        out.push_str("\n\n");
    }

    out.push_str(&format!("Total posts: {}\n", posts.len()));
    std::fs::write(&path, out)?;
    Ok(path)
}
