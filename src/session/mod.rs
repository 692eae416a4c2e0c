//! Session and message types - the durable conversation record and transcript entries

mod store;

pub use store::{
    FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, SessionStore, StoreError,
    SESSIONS_KEY,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Marker carried by provisional ids in their external string form
const PROVISIONAL_PREFIX: &str = "temp_";

/// Identity of a chat session
///
/// A freshly created session carries a client-minted provisional id until the
/// backend processes its first query and hands back the canonical id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionId {
    /// Client-minted, not yet known to the backend
    Provisional(String),
    /// Backend-assigned, durable
    Canonical(String),
}

impl SessionId {
    /// Mint a fresh provisional id, unique per call
    pub fn provisional() -> Self {
        let random = Uuid::new_v4().simple().to_string();
        SessionId::Provisional(format!(
            "{}_{}",
            Utc::now().timestamp_millis(),
            &random[..12]
        ))
    }

    pub fn canonical(id: impl Into<String>) -> Self {
        SessionId::Canonical(id.into())
    }

    /// Parse the external string form (as persisted or sent on the wire)
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(PROVISIONAL_PREFIX) {
            Some(token) => SessionId::Provisional(token.to_string()),
            None => SessionId::Canonical(raw.to_string()),
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, SessionId::Provisional(_))
    }

    /// The canonical id, if the backend has assigned one
    pub fn as_canonical(&self) -> Option<&str> {
        match self {
            SessionId::Canonical(id) => Some(id),
            SessionId::Provisional(_) => None,
        }
    }

    /// External string form
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Provisional(token) => write!(f, "{}{}", PROVISIONAL_PREFIX, token),
            SessionId::Canonical(id) => f.write_str(id),
        }
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SessionId::parse(&raw))
    }
}

/// A persisted conversation bound to one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Provisional until the first round trip completes
    pub session_id: SessionId,

    /// Uploaded document this conversation is about (immutable)
    pub document_id: String,

    /// Display filename of the document
    pub document_name: String,

    /// Human-readable title, derived from the first query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation
    pub updated_at: DateTime<Utc>,

    /// Short excerpt of the latest exchange, for list display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_message: Option<String>,
}

impl Session {
    /// Create a session for a newly uploaded document
    pub fn new(document_id: impl Into<String>, document_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::provisional(),
            document_id: document_id.into(),
            document_name: document_name.into(),
            chat_name: None,
            created_at: now,
            updated_at: now,
            preview_message: None,
        }
    }

    /// Title shown for the conversation
    pub fn title(&self) -> String {
        self.chat_name
            .clone()
            .unwrap_or_else(|| format!("Chat about {}", self.document_name))
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Sender::User => "you",
            Sender::Assistant => "assistant",
        }
    }
}

/// Citation attached to an assistant message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Page number in the document, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub text: String,
}

/// One turn in a conversation; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text.into(), Vec::new())
    }

    pub fn assistant(text: impl Into<String>, sources: Vec<Source>) -> Self {
        Self::new(Sender::Assistant, text.into(), sources)
    }

    fn new(sender: Sender, text: String, sources: Vec<Source>) -> Self {
        let timestamp = Utc::now();
        Self {
            id: local_message_id(timestamp),
            text,
            sender,
            timestamp,
            sources,
        }
    }
}

/// Locally unique id: creation time plus a random suffix
fn local_message_id(timestamp: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", timestamp.timestamp_millis(), &random[..8])
}
