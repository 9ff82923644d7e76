//! Delivery sinks for rendered reports.

use crate::error::{ReportError, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Mutex;

/// A rendered report ready for delivery.
#[derive(Debug, Clone)]
pub struct Report {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    pub attachment: Option<ReportAttachment>,
}

impl Report {
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        recipients: Vec<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            recipients,
            attachment: None,
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, filename: impl Into<String>, payload: serde_json::Value) -> Self {
        self.attachment = Some(ReportAttachment {
            filename: filename.into(),
            payload,
        });
        self
    }
}

/// Structured payload attached to a report as a JSON file.
#[derive(Debug, Clone)]
pub struct ReportAttachment {
    pub filename: String,
    pub payload: serde_json::Value,
}

/// Outbound notification channel.
///
/// The scanner produces report payloads; how they reach the operator is
/// this trait's concern alone.
#[async_trait::async_trait]
pub trait ReportSink: Send + Sync {
    async fn send(&self, report: &Report) -> Result<()>;
}

/// SMTP relay credentials and origin identity.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_name: String,
}

/// STARTTLS SMTP sink over lettre.
pub struct SmtpSink {
    config: SmtpConfig,
}

impl SmtpSink {
    #[must_use]
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, report: &Report) -> Result<Message> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.username)
            .parse()
            .map_err(|e| ReportError::Address(format!("from: {e}")))?;

        let mut builder = Message::builder().from(from).subject(&report.subject);
        for recipient in &report.recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| ReportError::Address(format!("{recipient}: {e}")))?;
            builder = builder.to(to);
        }

        match &report.attachment {
            Some(att) => {
                let json = serde_json::to_string_pretty(&att.payload)?;
                let content_type = ContentType::parse("application/json")
                    .map_err(|e| ReportError::Message(e.to_string()))?;
                let part = Attachment::new(att.filename.clone()).body(json, content_type);
                builder
                    .multipart(
                        MultiPart::mixed()
                            .singlepart(SinglePart::plain(report.body.clone()))
                            .singlepart(part),
                    )
                    .map_err(|e| ReportError::Message(e.to_string()))
            }
            None => builder
                .body(report.body.clone())
                .map_err(|e| ReportError::Message(e.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl ReportSink for SmtpSink {
    async fn send(&self, report: &Report) -> Result<()> {
        if report.recipients.is_empty() {
            return Err(ReportError::Address("no recipients configured".to_string()));
        }

        let message = self.build_message(report)?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| ReportError::Transport(e.to_string()))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| ReportError::Transport(e.to_string()))?;

        tracing::info!(
            subject = %report.subject,
            recipients = report.recipients.len(),
            "report delivered"
        );
        Ok(())
    }
}

/// Collects reports in memory; for tests.
#[derive(Default)]
pub struct MemorySink {
    sent: Mutex<Vec<Report>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports delivered so far, in order.
    pub fn sent(&self) -> Vec<Report> {
        self.sent.lock().expect("sink lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl ReportSink for MemorySink {
    async fn send(&self, report: &Report) -> Result<()> {
        self.sent.lock().expect("sink lock poisoned").push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_sink() -> SmtpSink {
        SmtpSink::new(SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "monitor@example.com".to_string(),
            password: "secret".to_string(),
            from_name: "Porchlight Monitor".to_string(),
        })
    }

    #[test]
    fn test_build_message_plain() {
        let sink = smtp_sink();
        let report = Report::new("Subject", "Body", vec!["ops@example.com".to_string()]);
        assert!(sink.build_message(&report).is_ok());
    }

    #[test]
    fn test_build_message_with_attachment() {
        let sink = smtp_sink();
        let report = Report::new("Subject", "Body", vec!["ops@example.com".to_string()])
            .with_attachment("posts.json", serde_json::json!([{"author": "Jane Doe"}]));
        assert!(sink.build_message(&report).is_ok());
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let sink = smtp_sink();
        let report = Report::new("Subject", "Body", vec!["not an address".to_string()]);
        assert!(matches!(
            sink.build_message(&report),
            Err(ReportError::Address(_))
        ));
    }

    #[tokio::test]
    async fn test_smtp_send_requires_recipients() {
        let sink = smtp_sink();
        let report = Report::new("Subject", "Body", vec![]);
        assert!(sink.send(&report).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_sink_records_sends() {
        let sink = MemorySink::new();
        let report = Report::new("Subject", "Body", vec!["ops@example.com".to_string()]);
        sink.send(&report).await.expect("memory send");

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Subject");
    }
}
