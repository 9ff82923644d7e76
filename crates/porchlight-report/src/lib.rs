//! Report rendering and delivery for the Porchlight scanner.
//!
//! The scanner core only produces [`Report`] payloads (subject, body,
//! recipients, optional JSON attachment); delivery goes through the
//! [`ReportSink`] trait. [`SmtpSink`] is the production implementation.

pub mod error;
pub mod sink;
pub mod templates;

pub use error::{ReportError, Result};
pub use sink::{MemorySink, Report, ReportAttachment, ReportSink, SmtpConfig, SmtpSink};
