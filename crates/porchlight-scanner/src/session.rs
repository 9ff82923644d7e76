//! Login state machine with the verification-code handshake.

use crate::error::{Result, ScanError};
use porchlight_browser::humanize::{self, Pace};
use porchlight_browser::PageDriver;
use porchlight_channel::CodeChannel;
use porchlight_core::SessionState;
use porchlight_report::ReportSink;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

/// Selector fallbacks for the email field, most specific first.
const EMAIL_SELECTORS: &[&str] = &[
    r#"input[type="email"]"#,
    r#"input[name="email"]"#,
    "#email",
    r#"input[placeholder*="email"]"#,
];

/// Selector fallbacks for the password field.
const PASSWORD_SELECTORS: &[&str] = &[
    r#"input[type="password"]"#,
    r#"input[name="password"]"#,
    "#password",
    r#"input[placeholder*="password"]"#,
];

/// Selector fallbacks for the submit control.
const SUBMIT_SELECTORS: &[&str] = &[
    r#"button[type="submit"]"#,
    r#"input[type="submit"]"#,
    r#"[data-testid="login-button"]"#,
];

/// Per-digit code inputs carry generated ids shaped like `_rd_`; this lists
/// the visible ones in DOM order.
const DIGIT_FIELD_SCRIPT: &str = r#"Array.from(document.querySelectorAll('input[id^="_r"][id$="_"]')).filter(e => e.offsetParent !== null).map(e => e.id).sort()"#;

/// Known field ids used when discovery returns nothing useful.
const FALLBACK_DIGIT_IDS: &[&str] = &["_rd_", "_re_", "_rf_", "_rg_", "_rh_", "_ri_"];

/// Digits expected in a verification code.
const CODE_LEN: usize = 6;

/// Site login identity.
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

/// Timing and location parameters for one authentication attempt.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub feed_url: String,
    pub login_url: String,
    /// URL fragment that marks an unauthenticated or challenged session
    pub login_fragment: String,
    /// Settle time after first navigation
    pub initial_settle: Duration,
    /// Settle time after submitting credentials
    pub submit_settle: Duration,
    /// Interval between location polls while waiting out a challenge
    pub poll_interval: Duration,
    /// Polls allowed for an attended (human at the browser) challenge
    pub attended_poll_attempts: u32,
    /// Polls allowed for the location to move after code submission
    pub post_code_poll_attempts: u32,
    /// Delay between typing successive code digits
    pub digit_delay: Duration,
    /// Resolve challenges through the verification channel instead of waiting
    pub unattended: bool,
    /// Where to drop challenge-page markup for diagnostics
    pub debug_dir: Option<PathBuf>,
}

impl SessionConfig {
    /// Production values from the application config.
    #[must_use]
    pub fn from_app(config: &porchlight_core::AppConfig, debug_dir: Option<PathBuf>) -> Self {
        Self {
            feed_url: config.site.feed_url.clone(),
            login_url: config.site.login_url.clone(),
            login_fragment: config.site.login_path_fragment.clone(),
            initial_settle: Duration::from_secs(5),
            submit_settle: Duration::from_secs(config.harvest.login_settle_secs),
            poll_interval: Duration::from_secs(1),
            attended_poll_attempts: 60,
            post_code_poll_attempts: 10,
            digit_delay: Duration::from_millis(200),
            unattended: config.general.unattended,
            debug_dir,
        }
    }
}

/// Drives login, challenge detection, and code submission.
///
/// Terminal states are `Authenticated` (returned) and `Failed` (every error
/// path). Failure is not retried within a run.
pub struct SessionManager<'a> {
    driver: &'a dyn PageDriver,
    channel: Option<&'a dyn CodeChannel>,
    sink: &'a dyn ReportSink,
    config: SessionConfig,
    pace: Pace,
    state: SessionState,
}

impl<'a> SessionManager<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        channel: Option<&'a dyn CodeChannel>,
        sink: &'a dyn ReportSink,
        config: SessionConfig,
        pace: Pace,
    ) -> Self {
        Self {
            driver,
            channel,
            sink,
            config,
            pace,
            state: SessionState::Unauthenticated,
        }
    }

    /// Current position in the login state machine.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the full login flow.
    ///
    /// `Ok` always carries `Authenticated`; every failure surfaces as an
    /// error with the state left at `Failed`.
    pub async fn authenticate(&mut self, credentials: &LoginCredentials) -> Result<SessionState> {
        self.state = SessionState::Unauthenticated;

        match self.try_authenticate(credentials).await {
            Ok(()) => {
                self.state = SessionState::Authenticated;
                tracing::info!("session authenticated");
                Ok(SessionState::Authenticated)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                tracing::error!(error = %e, "authentication failed");
                Err(e)
            }
        }
    }

    async fn try_authenticate(&mut self, credentials: &LoginCredentials) -> Result<()> {
        tracing::info!(url = %self.config.feed_url, "navigating to feed");
        self.driver.navigate(&self.config.feed_url).await?;
        sleep(self.config.initial_settle).await;

        if !self.on_login_path().await? {
            tracing::info!("already admitted, skipping login");
            return Ok(());
        }

        let location = self.driver.current_url().await?;
        if !location.to_lowercase().contains(&self.config.login_fragment) {
            // Not redirected; go to the login form directly
            self.driver.navigate(&self.config.login_url).await?;
            sleep(self.config.initial_settle).await;
        }

        self.submit_credentials(credentials).await?;
        sleep(self.config.submit_settle).await;

        if !self.on_login_path().await? {
            return Ok(());
        }

        // Still on the login path after submitting: a step-up verification
        // challenge is active
        self.state = SessionState::AwaitingVerification;
        tracing::warn!("verification challenge detected");
        self.dump_challenge_page().await;

        if self.config.unattended {
            if let Some(channel) = self.channel {
                return self.resolve_challenge_via_channel(channel).await;
            }
            tracing::warn!("unattended run without a verification channel configured");
        }

        self.resolve_challenge_attended().await
    }

    /// Type both credential fields with human pacing and submit.
    async fn submit_credentials(&self, credentials: &LoginCredentials) -> Result<()> {
        let email_field = self
            .first_present(EMAIL_SELECTORS)
            .await
            .ok_or_else(|| ScanError::Authentication("email field not found".to_string()))?;
        tracing::debug!(selector = email_field, "typing email");
        humanize::type_like_human(self.driver, email_field, &credentials.email, &self.pace)
            .await?;
        humanize::field_pause(&self.pace).await;

        let password_field = self
            .first_present(PASSWORD_SELECTORS)
            .await
            .ok_or_else(|| ScanError::Authentication("password field not found".to_string()))?;
        tracing::debug!(selector = password_field, "typing password");
        humanize::type_like_human(self.driver, password_field, &credentials.password, &self.pace)
            .await?;
        humanize::field_pause(&self.pace).await;

        let submit = self
            .first_present(SUBMIT_SELECTORS)
            .await
            .ok_or_else(|| ScanError::Authentication("submit control not found".to_string()))?;
        tracing::debug!(selector = submit, "submitting login");
        self.driver.click(submit).await?;
        Ok(())
    }

    /// Obtain a code through the remote document handshake and submit it.
    async fn resolve_challenge_via_channel(&self, channel: &dyn CodeChannel) -> Result<()> {
        let code = match channel.obtain_code(self.sink).await {
            Ok(Some(code)) => code,
            Ok(None) => return Err(ScanError::VerificationTimeout),
            Err(e) => {
                tracing::warn!(error = %e, "verification channel failed");
                return Err(ScanError::VerificationTimeout);
            }
        };

        if !self.enter_code(&code).await? {
            return Err(ScanError::Authentication(
                "could not submit verification code".to_string(),
            ));
        }

        if self
            .wait_to_leave_login(self.config.post_code_poll_attempts)
            .await?
        {
            Ok(())
        } else {
            Err(ScanError::Authentication(
                "still on login path after code submission".to_string(),
            ))
        }
    }

    /// Wait for a human at the browser to complete the challenge.
    async fn resolve_challenge_attended(&self) -> Result<()> {
        tracing::info!(
            attempts = self.config.attended_poll_attempts,
            "waiting for manual challenge completion"
        );
        if self
            .wait_to_leave_login(self.config.attended_poll_attempts)
            .await?
        {
            Ok(())
        } else {
            Err(ScanError::VerificationTimeout)
        }
    }

    /// Spread the six digits across the per-digit input fields.
    async fn enter_code(&self, code: &str) -> Result<bool> {
        if code.len() != CODE_LEN || !code.chars().all(|c| c.is_ascii_digit()) {
            tracing::warn!(len = code.len(), "verification code must be 6 digits");
            return Ok(false);
        }

        let ids = self.discover_digit_fields().await;
        tracing::debug!(?ids, "entering verification code");

        let mut buf = [0u8; 4];
        for (digit, id) in code.chars().zip(ids.iter()) {
            let selector = format!("#{id}");
            self.driver.clear(&selector).await?;
            self.driver
                .type_text(&selector, digit.encode_utf8(&mut buf))
                .await?;
            sleep(self.config.digit_delay).await;
        }

        Ok(true)
    }

    /// Ids of the visible per-digit inputs, falling back to the known set.
    async fn discover_digit_fields(&self) -> Vec<String> {
        let discovered = match self.driver.execute(DIGIT_FIELD_SCRIPT).await {
            Ok(value) => value
                .as_array()
                .map(|ids| {
                    ids.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "digit field discovery failed");
                Vec::new()
            }
        };

        if discovered.len() >= CODE_LEN {
            discovered
        } else {
            FALLBACK_DIGIT_IDS.iter().map(|s| s.to_string()).collect()
        }
    }

    /// Poll the location until it leaves the login path, bounded.
    async fn wait_to_leave_login(&self, attempts: u32) -> Result<bool> {
        for attempt in 1..=attempts {
            if !self.on_login_path().await? {
                tracing::info!(attempt, "left login path");
                return Ok(true);
            }
            sleep(self.config.poll_interval).await;
        }
        Ok(false)
    }

    async fn on_login_path(&self) -> Result<bool> {
        let url = self.driver.current_url().await?;
        Ok(url.to_lowercase().contains(&self.config.login_fragment))
    }

    async fn first_present(&self, selectors: &[&'static str]) -> Option<&'static str> {
        for selector in selectors {
            if self.driver.exists(selector).await {
                tracing::debug!(selector, "matched selector");
                return Some(selector);
            }
        }
        None
    }

    /// Persist the challenge page for offline selector archaeology.
    async fn dump_challenge_page(&self) {
        let Some(dir) = &self.config.debug_dir else {
            return;
        };

        match self.driver.page_source().await {
            Ok(markup) => {
                if let Err(e) = std::fs::create_dir_all(dir)
                    .and_then(|()| std::fs::write(dir.join("challenge_page.html"), markup))
                {
                    tracing::warn!(error = %e, "could not write challenge page dump");
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not capture challenge page"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeDriver;
    use porchlight_channel::{ChannelError, CodeChannel};
    use porchlight_report::MemorySink;

    fn test_config() -> SessionConfig {
        SessionConfig {
            feed_url: "https://nextdoor.com/news_feed/".to_string(),
            login_url: "https://nextdoor.com/login/".to_string(),
            login_fragment: "login".to_string(),
            initial_settle: Duration::ZERO,
            submit_settle: Duration::ZERO,
            poll_interval: Duration::ZERO,
            attended_poll_attempts: 3,
            post_code_poll_attempts: 3,
            digit_delay: Duration::ZERO,
            unattended: false,
            debug_dir: None,
        }
    }

    fn login_form(driver: &FakeDriver) {
        driver.add_present(r#"input[type="email"]"#);
        driver.add_present(r#"input[type="password"]"#);
        driver.add_present(r#"button[type="submit"]"#);
    }

    fn credentials() -> LoginCredentials {
        LoginCredentials {
            email: "monitor@example.com".to_string(),
            password: "hunter2!".to_string(),
        }
    }

    struct FixedChannel {
        code: Option<String>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl CodeChannel for FixedChannel {
        async fn obtain_code(
            &self,
            _sink: &dyn ReportSink,
        ) -> porchlight_channel::Result<Option<String>> {
            if self.fail {
                Err(ChannelError::MissingToken)
            } else {
                Ok(self.code.clone())
            }
        }
    }

    #[tokio::test]
    async fn test_already_admitted() {
        let driver = FakeDriver::new();
        driver.queue_url("https://nextdoor.com/news_feed/");
        let sink = MemorySink::new();

        let mut session = SessionManager::new(&driver, None, &sink, test_config(), Pace::instant());
        let state = session.authenticate(&credentials()).await.expect("auth");

        assert_eq!(state, SessionState::Authenticated);
        assert_eq!(session.state(), SessionState::Authenticated);
        assert!(driver.typed.lock().unwrap().is_empty(), "no typing needed");
    }

    #[tokio::test]
    async fn test_login_without_challenge() {
        let driver = FakeDriver::new();
        // Redirected to login, then admitted after submit
        driver.queue_url("https://nextdoor.com/login/");
        driver.queue_url("https://nextdoor.com/login/");
        driver.queue_url("https://nextdoor.com/news_feed/");
        login_form(&driver);
        let sink = MemorySink::new();

        let mut session = SessionManager::new(&driver, None, &sink, test_config(), Pace::instant());
        let state = session.authenticate(&credentials()).await.expect("auth");

        assert_eq!(state, SessionState::Authenticated);

        // Email and password both typed character by character
        let typed = driver.typed.lock().unwrap();
        let email_chars: String = typed
            .iter()
            .filter(|(sel, _)| sel.contains("email"))
            .map(|(_, ch)| ch.as_str())
            .collect();
        assert_eq!(email_chars, "monitor@example.com");
        assert!(driver.clicks.lock().unwrap().contains(&r#"button[type="submit"]"#.to_string()));
    }

    #[tokio::test]
    async fn test_missing_email_field_fails() {
        let driver = FakeDriver::new();
        driver.queue_url("https://nextdoor.com/login/");
        let sink = MemorySink::new();

        let mut session = SessionManager::new(&driver, None, &sink, test_config(), Pace::instant());
        let result = session.authenticate(&credentials()).await;

        assert!(matches!(result, Err(ScanError::Authentication(_))));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_attended_challenge_completes() {
        let driver = FakeDriver::new();
        driver.queue_url("https://nextdoor.com/login/"); // initial check
        driver.queue_url("https://nextdoor.com/login/"); // redirect check
        driver.queue_url("https://nextdoor.com/login/"); // post-submit: challenge
        driver.queue_url("https://nextdoor.com/login/"); // poll 1
        driver.queue_url("https://nextdoor.com/news_feed/"); // poll 2: human finished
        login_form(&driver);
        let sink = MemorySink::new();

        let mut session = SessionManager::new(&driver, None, &sink, test_config(), Pace::instant());
        let state = session.authenticate(&credentials()).await.expect("auth");
        assert_eq!(state, SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_attended_challenge_times_out() {
        let driver = FakeDriver::new();
        driver.queue_url("https://nextdoor.com/login/");
        login_form(&driver);
        let sink = MemorySink::new();

        let mut session = SessionManager::new(&driver, None, &sink, test_config(), Pace::instant());
        let result = session.authenticate(&credentials()).await;

        assert!(matches!(result, Err(ScanError::VerificationTimeout)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_unattended_challenge_with_code() {
        let driver = FakeDriver::new();
        driver.queue_url("https://nextdoor.com/login/"); // initial
        driver.queue_url("https://nextdoor.com/login/"); // redirect check
        driver.queue_url("https://nextdoor.com/login/"); // post-submit: challenge
        driver.queue_url("https://nextdoor.com/news_feed/"); // after code entry
        login_form(&driver);
        driver.set_digit_fields(&["_rd_", "_re_", "_rf_", "_rg_", "_rh_", "_ri_"]);
        let sink = MemorySink::new();

        let channel = FixedChannel {
            code: Some("123456".to_string()),
            fail: false,
        };
        let mut config = test_config();
        config.unattended = true;

        let mut session =
            SessionManager::new(&driver, Some(&channel), &sink, config, Pace::instant());
        let state = session.authenticate(&credentials()).await.expect("auth");
        assert_eq!(state, SessionState::Authenticated);

        // Each digit landed in its own field
        let typed = driver.typed.lock().unwrap();
        let digits: Vec<_> = typed
            .iter()
            .filter(|(sel, _)| sel.starts_with("#_r"))
            .collect();
        assert_eq!(digits.len(), 6);
        assert_eq!(digits[0].0, "#_rd_");
        assert_eq!(digits[0].1, "1");
        assert_eq!(digits[5].1, "6");
    }

    #[tokio::test]
    async fn test_unattended_channel_timeout_fails() {
        let driver = FakeDriver::new();
        driver.queue_url("https://nextdoor.com/login/");
        login_form(&driver);
        let sink = MemorySink::new();

        let channel = FixedChannel {
            code: None,
            fail: false,
        };
        let mut config = test_config();
        config.unattended = true;

        let mut session =
            SessionManager::new(&driver, Some(&channel), &sink, config, Pace::instant());
        let result = session.authenticate(&credentials()).await;
        assert!(matches!(result, Err(ScanError::VerificationTimeout)));
    }

    #[tokio::test]
    async fn test_unattended_channel_error_is_timeout() {
        let driver = FakeDriver::new();
        driver.queue_url("https://nextdoor.com/login/");
        login_form(&driver);
        let sink = MemorySink::new();

        let channel = FixedChannel {
            code: None,
            fail: true,
        };
        let mut config = test_config();
        config.unattended = true;

        let mut session =
            SessionManager::new(&driver, Some(&channel), &sink, config, Pace::instant());
        let result = session.authenticate(&credentials()).await;
        assert!(matches!(result, Err(ScanError::VerificationTimeout)));
        assert_eq!(session.state(), SessionState::Failed);
    }
}
