//! Live connection - the persistent bidirectional channel to the chat backend

mod live;

pub use live::{LiveConnection, LiveConnectionConfig};

use crate::protocol::{ReplyPayload, ServerEvent};
use crate::session::Source;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Not connected to the chat server")]
    NotConnected,

    #[error("Outbound queue is full")]
    QueueFull,

    #[error("Connection task has stopped")]
    Closed,

    #[error("Invalid socket URL: {0}")]
    InvalidUrl(String),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        }
    }
}

/// Assistant reply, validated
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub document_id: String,
    /// Canonical id assigned by the backend, on the first reply of a session
    pub session_id: Option<String>,
    pub sources: Vec<Source>,
}

impl From<ReplyPayload> for Reply {
    fn from(payload: ReplyPayload) -> Self {
        Self {
            session_id: payload.canonical_session_id(),
            sources: payload.sources(),
            text: payload.response,
            document_id: payload.document_id,
        }
    }
}

/// Events delivered to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Socket is open
    Connected,

    /// Attempting to (re)connect
    Connecting { attempt: u32 },

    /// Socket closed or reconnection gave up
    Disconnected,

    /// Backend is composing a reply
    Typing,

    /// Assistant reply
    Reply(Reply),

    /// Backend-reported error
    Error(String),
}

impl ConnectionEvent {
    /// Map an inbound protocol event; the greeting carries nothing for the controller
    pub fn from_server_event(event: ServerEvent) -> Option<Self> {
        match event {
            ServerEvent::Connected(greeting) => {
                tracing::debug!("Server greeting: {:?}", greeting.message);
                None
            }
            ServerEvent::Typing(_) => Some(ConnectionEvent::Typing),
            ServerEvent::Response(payload) => Some(ConnectionEvent::Reply(payload.into())),
            ServerEvent::Error(payload) => Some(ConnectionEvent::Error(payload.message)),
        }
    }
}

/// Outbound query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub document_id: String,
    pub query: String,
    /// Wire form of the current session id, if any
    pub session_id: Option<String>,
    pub user_id: String,
}

/// Accepts outbound queries
///
/// Fire-and-forget: replies arrive later as [`ConnectionEvent::Reply`].
pub trait QuerySink: Send + Sync {
    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    fn submit_query(&self, request: QueryRequest) -> Result<(), ConnectionError>;
}
