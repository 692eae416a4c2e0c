//! History loading - fetch the confirmed transcript of a canonical session

use crate::protocol::HistoryResponse;
use crate::session::{Message, SessionId};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// History fetch errors
///
/// Callers treat every variant like "no history yet"; the distinction only
/// matters for logging.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Session '{0}' not found on the server")]
    NotFound(String),

    #[error("History request returned HTTP {0}")]
    Status(u16),

    #[error("Invalid history response: {0}")]
    Decode(String),
}

/// Source of confirmed transcripts
#[async_trait]
pub trait HistoryLoader: Send + Sync {
    /// Transcript for `session_id`, oldest first
    ///
    /// Provisional ids are unknown to the backend; implementations must return
    /// an empty transcript for them without any network traffic.
    async fn load(&self, session_id: &SessionId) -> Result<Vec<Message>, HistoryError>;
}

/// Loads history from `GET {base_url}/api/chat/history/{session_id}`
#[derive(Debug, Clone)]
pub struct HttpHistoryLoader {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpHistoryLoader {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, auth_token)
    }

    /// Build a loader whose requests give up after `timeout`
    pub fn with_timeout(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, HistoryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, auth_token))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    fn history_url(&self, canonical_id: &str) -> String {
        format!("{}/api/chat/history/{}", self.base_url, canonical_id)
    }
}

#[async_trait]
impl HistoryLoader for HttpHistoryLoader {
    async fn load(&self, session_id: &SessionId) -> Result<Vec<Message>, HistoryError> {
        let Some(canonical_id) = session_id.as_canonical() else {
            return Ok(Vec::new());
        };

        let mut request = self.client.get(self.history_url(canonical_id));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        tracing::debug!("Fetching history for session {}", canonical_id);
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => {
                let body: HistoryResponse = response
                    .json()
                    .await
                    .map_err(|e| HistoryError::Decode(e.to_string()))?;
                if body.session_id != canonical_id {
                    tracing::warn!(
                        "History response for {} reports session {}",
                        canonical_id,
                        body.session_id
                    );
                }
                Ok(body.into_messages())
            }
            StatusCode::NOT_FOUND => Err(HistoryError::NotFound(canonical_id.to_string())),
            status => Err(HistoryError::Status(status.as_u16())),
        }
    }
}
