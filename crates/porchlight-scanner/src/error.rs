use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("verification code not received in time")]
    VerificationTimeout,

    #[error("search controls not found: {0}")]
    SearchControlsMissing(String),

    #[error("browser error: {0}")]
    Browser(#[from] porchlight_browser::BrowserError),

    #[error("channel error: {0}")]
    Channel(#[from] porchlight_channel::ChannelError),

    #[error("report error: {0}")]
    Report(#[from] porchlight_report::ReportError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScanError::Authentication("password rejected".to_string());
        assert_eq!(err.to_string(), "authentication failed: password rejected");

        let err = ScanError::SearchControlsMissing("search box".to_string());
        assert!(err.to_string().contains("search box"));
    }

    #[test]
    fn test_browser_error_converts() {
        let browser_err = porchlight_browser::BrowserError::Timeout("navigation".to_string());
        let err: ScanError = browser_err.into();
        assert!(matches!(err, ScanError::Browser(_)));
    }
}
