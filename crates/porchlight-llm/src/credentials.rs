//! Rotating API credential pool.

use crate::error::{LlmError, Result};
use std::path::Path;

/// Largest number of numbered environment keys probed.
const MAX_ENV_KEYS: u32 = 5;

/// An ordered sequence of API keys with a forward-only cursor.
///
/// The cursor only ever advances; once the last key is reached the pool is
/// spent for the rest of the run. A per-key usage counter resets on each
/// rotation.
#[derive(Debug)]
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: usize,
    used_on_current: u32,
}

impl CredentialPool {
    /// Build a pool from explicit keys.
    pub fn new(keys: Vec<String>) -> Result<Self> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if keys.is_empty() {
            return Err(LlmError::NoCredentials);
        }

        Ok(Self {
            keys,
            cursor: 0,
            used_on_current: 0,
        })
    }

    /// Load keys from a file, one per line; blank lines are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::new(contents.lines().map(str::to_string).collect())
    }

    /// Load keys from `PORCHLIGHT_API_KEY_1` .. `_5`, falling back to the
    /// single `PORCHLIGHT_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let mut keys = Vec::new();
        for n in 1..=MAX_ENV_KEYS {
            if let Ok(key) = std::env::var(format!("PORCHLIGHT_API_KEY_{n}")) {
                keys.push(key);
            }
        }

        if keys.is_empty() {
            if let Ok(key) = std::env::var("PORCHLIGHT_API_KEY") {
                keys.push(key);
            }
        }

        Self::new(keys)
    }

    /// Load keys from the configured file if it exists, else the environment.
    pub fn load(keys_file: impl AsRef<Path>) -> Result<Self> {
        let path = keys_file.as_ref();
        if path.exists() {
            tracing::debug!("loading API keys from {}", path.display());
            Self::from_file(path)
        } else {
            tracing::debug!("keys file absent, loading API keys from environment");
            Self::from_env()
        }
    }

    /// The key the next request should use.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.keys[self.cursor]
    }

    /// Record one successful use of the current key.
    pub fn record_use(&mut self) {
        self.used_on_current += 1;
    }

    /// Advance to the next key after a rate-limit signal.
    ///
    /// Returns false when no keys remain; the cursor never wraps.
    pub fn advance(&mut self) -> bool {
        if self.cursor + 1 < self.keys.len() {
            self.cursor += 1;
            self.used_on_current = 0;
            tracing::info!(
                "rotated to API key {}/{}",
                self.cursor + 1,
                self.keys.len()
            );
            true
        } else {
            tracing::warn!("all API keys exhausted");
            false
        }
    }

    /// 1-based position of the active key.
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor + 1
    }

    /// Total keys in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false: an empty pool cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Uses recorded against the active key since the last rotation.
    #[must_use]
    pub fn used_on_current(&self) -> u32 {
        self.used_on_current
    }
}
