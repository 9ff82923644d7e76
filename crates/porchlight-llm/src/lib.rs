//! Relevance classification for harvested posts.
//!
//! This crate talks to a hosted language model through an OpenAI-compatible
//! chat completions endpoint. Calls authenticate with keys drawn from a
//! [`CredentialPool`]; when the service rate-limits a key, the
//! [`Classifier`] advances the pool and retries, and once the pool is spent
//! the remaining posts degrade to a non-relevant sentinel verdict rather
//! than failing the scan.
//!
//! The [`ChatModel`] trait is the seam for tests: the production
//! [`ChatClient`] implements it over reqwest, and unit tests substitute
//! scripted stubs.

pub mod chat;
pub mod classifier;
pub mod credentials;
pub mod error;

pub use chat::{ChatClient, ChatModel};
pub use classifier::{parse_verdict, validate_selector, Classifier};
pub use credentials::CredentialPool;
pub use error::{LlmError, Result};
