//! Remote single-document store.

use crate::error::{ChannelError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Handle to a document held by a [`CodeStore`].
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// Store-assigned identifier, used for reads and deletion
    pub id: String,
    /// Human-reachable location to hand to the operator
    pub url: String,
}

/// Create/read/delete access to a remotely stored private text document.
///
/// One document per verification challenge; the caller owns the delete.
#[async_trait::async_trait]
pub trait CodeStore: Send + Sync {
    /// Create a private single-file document and return its handle.
    async fn create(&self, description: &str, filename: &str, content: &str)
        -> Result<StoredDocument>;

    /// Read the document's current text content.
    async fn read(&self, id: &str) -> Result<String>;

    /// Delete the document.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// GitHub-Gist-backed [`CodeStore`].
pub struct GistStore {
    token: String,
    api_base: String,
    client: Client,
}

impl GistStore {
    /// Create a store client with a personal access token.
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(ChannelError::MissingToken);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("porchlight-scanner")
            .build()?;

        Ok(Self {
            token,
            api_base: api_base.into(),
            client,
        })
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.token)
    }
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    id: String,
    html_url: String,
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    content: Option<String>,
}

#[async_trait::async_trait]
impl CodeStore for GistStore {
    async fn create(
        &self,
        description: &str,
        filename: &str,
        content: &str,
    ) -> Result<StoredDocument> {
        let body = serde_json::json!({
            "description": description,
            "public": false,
            "files": { filename: { "content": content } }
        });

        let response = self
            .client
            .post(format!("{}/gists", self.api_base))
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github.v3+json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let gist: GistResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Parse(e.to_string()))?;

        Ok(StoredDocument {
            id: gist.id,
            url: gist.html_url,
        })
    }

    async fn read(&self, id: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/gists/{id}", self.api_base))
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let gist: GistResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Parse(e.to_string()))?;

        gist.files
            .into_values()
            .next()
            .and_then(|f| f.content)
            .ok_or_else(|| ChannelError::Parse("document has no file content".to_string()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/gists/{id}", self.api_base))
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gist_store_requires_token() {
        assert!(matches!(
            GistStore::new("", "https://api.github.com"),
            Err(ChannelError::MissingToken)
        ));
        assert!(GistStore::new("ghp_test", "https://api.github.com").is_ok());
    }

    #[test]
    fn test_gist_response_parsing() {
        let json = r#"{
            "id": "abc123",
            "html_url": "https://gist.github.com/abc123",
            "files": { "code.txt": { "content": "ENTER_2FA_CODE_HERE" } }
        }"#;
        let gist: GistResponse = serde_json::from_str(json).expect("parse gist");
        assert_eq!(gist.id, "abc123");
        assert_eq!(
            gist.files["code.txt"].content.as_deref(),
            Some("ENTER_2FA_CODE_HERE")
        );
    }
}
