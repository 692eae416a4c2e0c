//! Protocol definitions for the live chat channel and the history endpoint
//!
//! Every live-channel frame is a JSON text message of the form
//! `{"event": <name>, "data": <object>}`. Inbound frames are validated here,
//! before anything reaches the controller.

mod message;

pub use message::{
    ConnectedPayload, ErrorPayload, HistoryMessage, HistoryResponse, QueryPayload, ReplyPayload,
    SourcePayload, TypingPayload,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Malformed '{event}' payload: {detail}")]
    MalformedPayload { event: String, detail: String },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Events sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Ask a question about a document
    Query(QueryPayload),
}

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Greeting sent after the socket is accepted
    Connected(ConnectedPayload),

    /// Assistant is composing a reply
    Typing(TypingPayload),

    /// Assistant reply
    Response(ReplyPayload),

    /// Backend-reported failure
    Error(ErrorPayload),
}

/// Raw frame shape shared by both directions
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Query(_) => "query",
        }
    }
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::Typing(_) => "typing",
            ServerEvent::Response(_) => "response",
            ServerEvent::Error(_) => "error",
        }
    }
}

/// Encode a client event as a text frame
pub fn encode_client_event(event: &ClientEvent) -> Result<String, ProtocolError> {
    let data = match event {
        ClientEvent::Query(payload) => to_value(event.name(), payload)?,
    };
    encode_envelope(event.name(), data)
}

/// Decode and validate an inbound text frame
pub fn decode_server_event(frame: &str) -> Result<ServerEvent, ProtocolError> {
    let envelope = decode_envelope(frame)?;

    match envelope.event.as_str() {
        "connected" => Ok(ServerEvent::Connected(from_value(&envelope)?)),
        "typing" => Ok(ServerEvent::Typing(from_value(&envelope)?)),
        "response" | "reply" => {
            let payload: ReplyPayload = from_value(&envelope)?;
            payload.validate()?;
            Ok(ServerEvent::Response(payload))
        }
        "error" => Ok(ServerEvent::Error(from_value(&envelope)?)),
        other => Err(ProtocolError::UnknownEvent(other.to_string())),
    }
}

/// Encode a server event as a text frame
///
/// The client never sends these; test servers and tooling do.
pub fn encode_server_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    let name = event.name();
    let data = match event {
        ServerEvent::Connected(payload) => to_value(name, payload)?,
        ServerEvent::Typing(payload) => to_value(name, payload)?,
        ServerEvent::Response(payload) => to_value(name, payload)?,
        ServerEvent::Error(payload) => to_value(name, payload)?,
    };
    encode_envelope(name, data)
}

/// Decode a client event frame (server side of the protocol)
pub fn decode_client_event(frame: &str) -> Result<ClientEvent, ProtocolError> {
    let envelope = decode_envelope(frame)?;

    match envelope.event.as_str() {
        "query" => Ok(ClientEvent::Query(from_value(&envelope)?)),
        other => Err(ProtocolError::UnknownEvent(other.to_string())),
    }
}

fn encode_envelope(event: &str, data: Value) -> Result<String, ProtocolError> {
    let envelope = Envelope {
        event: event.to_string(),
        data,
    };
    serde_json::to_string(&envelope).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
}

fn decode_envelope(frame: &str) -> Result<Envelope, ProtocolError> {
    serde_json::from_str(frame).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
}

fn to_value<T: Serialize>(event: &str, payload: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(payload).map_err(|e| ProtocolError::MalformedPayload {
        event: event.to_string(),
        detail: e.to_string(),
    })
}

fn from_value<T: for<'de> Deserialize<'de>>(envelope: &Envelope) -> Result<T, ProtocolError> {
    T::deserialize(&envelope.data).map_err(|e| ProtocolError::MalformedPayload {
        event: envelope.event.clone(),
        detail: e.to_string(),
    })
}
