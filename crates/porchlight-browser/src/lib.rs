//! Browser automation for the Porchlight scanner.
//!
//! Every DOM interaction the scanner performs goes through the [`PageDriver`]
//! capability trait; [`BrowserEngine`] is the chromiumoxide-backed
//! implementation with anti-fingerprinting, and [`humanize`] provides the
//! paced typing and variable scrolling that keep the session looking like a
//! person at a keyboard.

pub mod driver;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod humanize;

pub use driver::PageDriver;
pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use humanize::Pace;
