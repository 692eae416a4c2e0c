//! Payload schemas for pdfpal protocol events and the history endpoint

use super::ProtocolError;
use crate::session::{Message, Sender, SessionId, Source};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound question about a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub document_id: String,
    pub query: String,
    /// Current session id in wire form, provisional or canonical
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub user_id: String,
}

/// Server greeting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Assistant reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub response: String,
    pub document_id: String,
    /// Present on the first reply of a session the backend just created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourcePayload>>,
}

impl ReplyPayload {
    pub(super) fn validate(&self) -> Result<(), ProtocolError> {
        if self.document_id.trim().is_empty() {
            return Err(ProtocolError::InvalidField {
                field: "document_id",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Backend-assigned id carried by this reply, if any
    ///
    /// Empty strings and echoed provisional ids do not count as assignments.
    pub fn canonical_session_id(&self) -> Option<String> {
        let raw = self.session_id.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        SessionId::parse(raw).as_canonical().map(str::to_string)
    }

    pub fn sources(&self) -> Vec<Source> {
        convert_sources(self.sources.as_deref())
    }
}

/// Citation as sent by the backend: a bare excerpt or a page-tagged excerpt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourcePayload {
    Excerpt(String),
    Cited {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<u32>,
        text: String,
    },
}

impl From<SourcePayload> for Source {
    fn from(payload: SourcePayload) -> Self {
        match payload {
            SourcePayload::Excerpt(text) => Source { page: None, text },
            SourcePayload::Cited { page, text } => Source { page, text },
        }
    }
}

fn convert_sources(sources: Option<&[SourcePayload]>) -> Vec<Source> {
    sources
        .unwrap_or_default()
        .iter()
        .cloned()
        .map(Source::from)
        .collect()
}

/// Body of `GET /api/chat/history/{session_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub document_id: String,
    /// Kept loosely typed so one bad entry does not sink the whole transcript
    #[serde(default)]
    pub messages: Vec<Value>,
}

impl HistoryResponse {
    /// Validated transcript, oldest first; invalid entries are skipped
    pub fn into_messages(self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.messages.len());

        for (index, raw) in self.messages.into_iter().enumerate() {
            let parsed = HistoryMessage::deserialize(raw)
                .map_err(|e| ProtocolError::MalformedPayload {
                    event: "history".into(),
                    detail: e.to_string(),
                })
                .and_then(HistoryMessage::into_message);

            match parsed {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(
                        "Skipping history entry {} of session {}: {}",
                        index,
                        self.session_id,
                        e
                    );
                }
            }
        }

        messages
    }
}

/// One stored transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub message_id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourcePayload>>,
}

impl HistoryMessage {
    pub fn into_message(self) -> Result<Message, ProtocolError> {
        let timestamp = parse_timestamp(&self.timestamp)?;
        let sources = match self.sender {
            Sender::Assistant => convert_sources(self.sources.as_deref()),
            Sender::User => Vec::new(),
        };

        Ok(Message {
            id: self.message_id,
            text: self.text,
            sender: self.sender,
            timestamp,
            sources,
        })
    }
}

/// Accept RFC 3339 or a naive ISO-8601 timestamp (taken as UTC)
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ProtocolError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| ProtocolError::InvalidField {
            field: "timestamp",
            reason: format!("'{}': {}", raw, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_naive_timestamp_is_utc() {
        let parsed = parse_timestamp("2024-03-05T14:30:15.123456").unwrap();
        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.hour(), 14);
    }

    #[test]
    fn test_rfc3339_timestamp_keeps_offset() {
        let parsed = parse_timestamp("2024-03-05T14:30:15+02:00").unwrap();
        assert_eq!(parsed.hour(), 12);
    }

    #[test]
    fn test_garbage_timestamp_rejected() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_echoed_provisional_id_is_not_an_assignment() {
        let reply = ReplyPayload {
            response: "hi".into(),
            document_id: "doc".into(),
            session_id: Some("temp_1_abc".into()),
            sources: None,
        };
        assert_eq!(reply.canonical_session_id(), None);

        let reply = ReplyPayload {
            session_id: Some("  ".into()),
            ..reply
        };
        assert_eq!(reply.canonical_session_id(), None);
    }
}
