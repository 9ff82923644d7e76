//! The verification-code handshake itself.

use crate::error::Result;
use crate::store::{CodeStore, StoredDocument};
use chrono::{DateTime, Local, Utc};
use porchlight_report::{templates, Report, ReportSink};
use std::time::Duration;
use tokio::time::sleep;

/// Placeholder the operator replaces with the real code.
pub const CODE_SENTINEL: &str = "ENTER_2FA_CODE_HERE";

/// Digits expected in a verification code.
const CODE_LEN: usize = 6;

/// A live handshake document, scoped to one challenge.
#[derive(Debug, Clone)]
pub struct VerificationTicket {
    /// Store-assigned document id
    pub channel_id: String,
    /// Operator-facing document URL
    pub url: String,
    /// When the document was created
    pub created_at: DateTime<Utc>,
}

/// Object-safe view of the handshake for consumers that only need the code.
#[async_trait::async_trait]
pub trait CodeChannel: Send + Sync {
    /// Run the full handshake; `None` means no code arrived in time.
    async fn obtain_code(&self, sink: &dyn ReportSink) -> Result<Option<String>>;
}

/// Publishes the handshake document, notifies the operator, polls for the
/// code, and always deletes the document afterwards.
pub struct VerificationChannel<S: CodeStore> {
    store: S,
    timeout: Duration,
    poll_interval: Duration,
    notify_recipients: Vec<String>,
}

impl<S: CodeStore> VerificationChannel<S> {
    pub fn new(
        store: S,
        timeout: Duration,
        poll_interval: Duration,
        notify_recipients: Vec<String>,
    ) -> Self {
        Self {
            store,
            timeout,
            poll_interval,
            notify_recipients,
        }
    }

    /// Create the handshake document and mail its location to the operator.
    async fn open_ticket(&self, sink: &dyn ReportSink) -> Result<VerificationTicket> {
        let now = Local::now();
        let description = format!(
            "Verification code input - {}",
            now.format("%Y-%m-%d %H:%M:%S")
        );

        let doc = self
            .store
            .create(&description, "verification_code.txt", &document_body(now))
            .await?;

        tracing::info!(url = %doc.url, "created verification document");

        let notice = Report::new(
            templates::verification_subject(now),
            templates::verification_notice(&doc.url, now),
            self.notify_recipients.clone(),
        );
        if let Err(e) = sink.send(&notice).await {
            // The operator may still find the document another way; keep polling
            tracing::warn!(error = %e, "could not deliver verification notice");
        }

        let StoredDocument { id, url } = doc;
        Ok(VerificationTicket {
            channel_id: id,
            url,
            created_at: Utc::now(),
        })
    }

    /// Poll the document until a code appears or the timeout lapses.
    ///
    /// Store read failures are logged and treated like an unchanged
    /// document; the loop stays bounded either way.
    async fn poll_for_code(&self, id: &str) -> Option<String> {
        let poll_ms = self.poll_interval.as_millis().max(1);
        let max_attempts = u64::try_from((self.timeout.as_millis() / poll_ms).max(1)).unwrap_or(1);

        for attempt in 1..=max_attempts {
            match self.store.read(id).await {
                Ok(content) => {
                    if let Some(code) = extract_code(&content) {
                        tracing::info!(attempt, "verification code received");
                        return Some(code);
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "could not read verification document");
                }
            }

            if attempt < max_attempts {
                tracing::debug!(attempt, max_attempts, "waiting for verification code");
                sleep(self.poll_interval).await;
            }
        }

        tracing::warn!("timed out waiting for verification code");
        None
    }
}

#[async_trait::async_trait]
impl<S: CodeStore> CodeChannel for VerificationChannel<S> {
    async fn obtain_code(&self, sink: &dyn ReportSink) -> Result<Option<String>> {
        let ticket = self.open_ticket(sink).await?;

        let code = self.poll_for_code(&ticket.channel_id).await;

        // Single unconditional cleanup: the document must not outlive the
        // handshake whether a code arrived, the wait timed out, or reads
        // kept failing.
        match self.store.delete(&ticket.channel_id).await {
            Ok(()) => tracing::info!(id = %ticket.channel_id, "deleted verification document"),
            Err(e) => {
                tracing::warn!(id = %ticket.channel_id, error = %e, "could not delete verification document");
            }
        }

        Ok(code)
    }
}

/// Document text as first published: the sentinel, then operator instructions.
fn document_body(now: DateTime<Local>) -> String {
    format!(
        "{CODE_SENTINEL}\n\
        \n\
        Instructions:\n\
        1. Replace \"{CODE_SENTINEL}\" above with your 6-digit verification code\n\
        2. Save this document\n\
        3. The scanner will automatically detect your code and continue\n\
        \n\
        Created: {}\n\
        This document will be automatically deleted after use.\n",
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Pull a 6-digit code out of the document text.
///
/// Accepts a line that is exactly the code, or a line with the code embedded
/// in other characters. The sentinel and instruction lines never match.
#[must_use]
pub fn extract_code(content: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line == CODE_SENTINEL || line.starts_with("Instructions:") {
            continue;
        }

        if line.len() == CODE_LEN && line.chars().all(|c| c.is_ascii_digit()) {
            return Some(line.to_string());
        }

        let digits: String = line.chars().filter(char::is_ascii_digit).collect();
        if digits.len() == CODE_LEN {
            return Some(digits);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use porchlight_report::MemorySink;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_extract_code_whole_line() {
        assert_eq!(
            extract_code("Instructions:\n123456\n"),
            Some("123456".to_string())
        );
    }

    #[test]
    fn test_extract_code_sentinel_untouched() {
        assert_eq!(extract_code("ENTER_2FA_CODE_HERE"), None);
        assert_eq!(extract_code(&document_body(Local::now())), None);
    }

    #[test]
    fn test_extract_code_embedded_digits() {
        assert_eq!(
            extract_code("code: 987-654 thanks"),
            Some("987654".to_string())
        );
    }

    #[test]
    fn test_extract_code_wrong_length() {
        assert_eq!(extract_code("12345"), None);
        assert_eq!(extract_code("1234567"), None);
    }

    /// Scripted store for handshake tests.
    struct MockStore {
        reads: Mutex<Vec<Result<String>>>,
        read_count: AtomicU32,
        deleted: AtomicBool,
        fail_delete: bool,
    }

    impl MockStore {
        fn with_reads(reads: Vec<Result<String>>) -> Self {
            Self {
                reads: Mutex::new(reads),
                read_count: AtomicU32::new(0),
                deleted: AtomicBool::new(false),
                fail_delete: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl CodeStore for MockStore {
        async fn create(
            &self,
            _description: &str,
            _filename: &str,
            _content: &str,
        ) -> Result<StoredDocument> {
            Ok(StoredDocument {
                id: "doc-1".to_string(),
                url: "https://store.example/doc-1".to_string(),
            })
        }

        async fn read(&self, _id: &str) -> Result<String> {
            self.read_count.fetch_add(1, Ordering::SeqCst);
            let mut reads = self.reads.lock().expect("lock");
            if reads.is_empty() {
                Ok(CODE_SENTINEL.to_string())
            } else {
                reads.remove(0)
            }
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            self.deleted.store(true, Ordering::SeqCst);
            if self.fail_delete {
                Err(ChannelError::Api {
                    status: 500,
                    message: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn channel(store: MockStore) -> VerificationChannel<MockStore> {
        VerificationChannel::new(
            store,
            Duration::from_millis(30),
            Duration::from_millis(10),
            vec!["ops@example.com".to_string()],
        )
    }

    #[tokio::test]
    async fn test_obtain_code_success_deletes_document() {
        let store = MockStore::with_reads(vec![
            Ok(CODE_SENTINEL.to_string()),
            Ok("Instructions:\n123456\n".to_string()),
        ]);
        let chan = channel(store);
        let sink = MemorySink::new();

        let code = chan.obtain_code(&sink).await.expect("handshake");
        assert_eq!(code, Some("123456".to_string()));
        assert!(chan.store.deleted.load(Ordering::SeqCst));

        // The operator got exactly one notice with the document URL
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("https://store.example/doc-1"));
    }

    #[tokio::test]
    async fn test_obtain_code_timeout_deletes_document() {
        let store = MockStore::with_reads(vec![]);
        let chan = channel(store);
        let sink = MemorySink::new();

        let code = chan.obtain_code(&sink).await.expect("handshake");
        assert_eq!(code, None);
        assert!(chan.store.deleted.load(Ordering::SeqCst));
        assert_eq!(chan.store.read_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_obtain_code_read_errors_still_delete() {
        let store = MockStore::with_reads(vec![
            Err(ChannelError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
            Err(ChannelError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
            Err(ChannelError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
        ]);
        let chan = channel(store);
        let sink = MemorySink::new();

        let code = chan.obtain_code(&sink).await.expect("handshake");
        assert_eq!(code, None);
        assert!(chan.store.deleted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_obtain_code_survives_delete_failure() {
        let mut store = MockStore::with_reads(vec![Ok("654321".to_string())]);
        store.fail_delete = true;
        let chan = channel(store);
        let sink = MemorySink::new();

        // Delete failure is logged, not surfaced; the code still comes back
        let code = chan.obtain_code(&sink).await.expect("handshake");
        assert_eq!(code, Some("654321".to_string()));
        assert!(chan.store.deleted.load(Ordering::SeqCst));
    }
}
