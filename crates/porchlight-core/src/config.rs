//! Configuration management for Porchlight.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Secrets (login password, API keys,
//! store token, SMTP password) are never written to the TOML file; they
//! come from `PORCHLIGHT_*` environment variables at startup.

use crate::error::{ConfigError, ConfigResult};
use chrono::Weekday;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main application configuration.
///
/// Loaded from `~/.config/porchlight/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General run settings
    pub general: GeneralConfig,
    /// Target site URLs and search schedule
    pub site: SiteConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Harvest loop settings
    pub harvest: HarvestConfig,
    /// Classification service settings
    pub llm: LlmConfig,
    /// Verification channel settings
    pub channel: ChannelConfig,
    /// Report delivery settings
    pub report: ReportConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `PORCHLIGHT_HEADLESS`: Override browser headless mode (true/false)
    /// - `PORCHLIGHT_UNATTENDED`: Override unattended execution (true/false)
    /// - `PORCHLIGHT_SEARCH_TERM`: Override the scheduled search term
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;

        if let Ok(val) = std::env::var("PORCHLIGHT_HEADLESS") {
            if let Ok(headless) = val.parse() {
                config.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("PORCHLIGHT_UNATTENDED") {
            if let Ok(unattended) = val.parse() {
                config.general.unattended = unattended;
                tracing::debug!("Override general.unattended from env: {}", unattended);
            }
        }

        if let Ok(val) = std::env::var("PORCHLIGHT_SEARCH_TERM") {
            if !val.trim().is_empty() {
                config.site.search_term_override = Some(val.trim().to_string());
                tracing::debug!("Override search term from env");
            }
        }

        Ok(config)
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "porchlight", "porchlight").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path (harvested post files).
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "porchlight", "porchlight").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Get the cache directory path (debug page dumps).
    pub fn cache_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "porchlight", "porchlight").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.cache_dir().to_path_buf())
    }
}

/// General run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Whether the run is unattended (no operator at a visible browser).
    /// Unattended runs resolve verification challenges through the
    /// remote-document channel instead of waiting for a human.
    pub unattended: bool,
    /// Write raw page markup to the cache directory at key steps
    pub debug_dumps: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            unattended: false,
            debug_dumps: true,
        }
    }
}

/// Target site URLs and the weekly search schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Authenticated landing view
    pub feed_url: String,
    /// Login form location
    pub login_url: String,
    /// URL fragment whose presence marks an unauthenticated or challenged session
    pub login_path_fragment: String,
    /// Base URL for resolving relative post permalinks
    pub base_url: String,
    /// One search term per weekday, Monday first. One term per day keeps the
    /// account's search volume low enough to avoid throttling.
    pub weekly_search_terms: Vec<String>,
    /// When set, used instead of the scheduled term
    pub search_term_override: Option<String>,
}

impl SiteConfig {
    /// The search term scheduled for the given weekday.
    #[must_use]
    pub fn term_for(&self, weekday: Weekday) -> String {
        if let Some(term) = &self.search_term_override {
            return term.clone();
        }
        let idx = weekday.num_days_from_monday() as usize;
        self.weekly_search_terms
            .get(idx)
            .cloned()
            .unwrap_or_else(|| "handyman".to_string())
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            feed_url: "https://nextdoor.com/news_feed/".to_string(),
            login_url: "https://nextdoor.com/login/".to_string(),
            login_path_fragment: "login".to_string(),
            base_url: "https://nextdoor.com".to_string(),
            weekly_search_terms: vec![
                "pool".to_string(),
                "window".to_string(),
                "bin".to_string(),
                "lawn".to_string(),
                "gardener".to_string(),
                "pest control".to_string(),
                "pressure washing".to_string(),
            ],
            search_term_override: None,
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run the browser without a visible window
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// User agent override; empty selects a randomized desktop agent
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            user_agent: String::new(),
        }
    }
}

/// Harvest loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Upper bound on scroll iterations per search
    pub max_scrolls: u32,
    /// Consecutive no-new-content iterations before the loop stops early
    pub stagnation_limit: u32,
    /// Settle time after submitting a search, in seconds
    pub search_settle_secs: u64,
    /// Settle time after submitting login credentials, in seconds
    pub login_settle_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_scrolls: 20,
            stagnation_limit: 3,
            search_settle_secs: 5,
            login_settle_secs: 8,
        }
    }
}

/// Classification service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions base URL
    pub api_base: String,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token bound for verdicts
    pub max_tokens: u32,
    /// Delay between successive classification calls, in milliseconds
    pub request_delay_ms: u64,
    /// Path to the rotating credential file (one key per line)
    pub keys_file: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            temperature: 0.1,
            max_tokens: 250,
            request_delay_ms: 500,
            keys_file: "keys.txt".to_string(),
        }
    }
}

/// Verification channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Remote document store API base
    pub api_base: String,
    /// Total time to wait for an operator-supplied code, in seconds
    pub timeout_secs: u64,
    /// Interval between document reads, in seconds
    pub poll_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            timeout_secs: 180,
            poll_secs: 30,
        }
    }
}

/// Report delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// SMTP relay host
    pub smtp_host: String,
    /// SMTP relay port (STARTTLS)
    pub smtp_port: u16,
    /// Display name for the From header
    pub from_name: String,
    /// Report recipients
    pub recipients: Vec<String>,
    /// Subset of recipients alerted for verification challenges
    pub alert_recipients: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            from_name: "Porchlight Monitor".to_string(),
            recipients: Vec::new(),
            alert_recipients: Vec::new(),
        }
    }
}
