//! Porchlight Core - Foundation crate for the Porchlight scanner.
//!
//! This crate provides the shared post/verdict types, the session state
//! machine vocabulary, and TOML-based configuration that all other
//! Porchlight crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Configuration error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared domain types (`Post`, `Verdict`, `ServiceCategory`, `SessionState`)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, ChannelConfig, GeneralConfig, HarvestConfig, LlmConfig,
    ReportConfig, SiteConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use types::{dedup_key, Post, ServiceCategory, SessionState, Verdict, DEDUP_PREFIX_LEN};
