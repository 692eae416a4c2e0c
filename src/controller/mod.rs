//! Chat session controller - binds the visible conversation to a durable session
//!
//! The controller owns the in-memory transcript of the active document and
//! reconciles optimistic local writes (user messages, provisional ids) with
//! server-confirmed state (replies, canonical ids, stored history).
//!
//! It is driven from a single event loop. History fetches are the only
//! asynchronous step: [`ChatController::activate`] hands back a
//! [`PendingHistory`] that the caller resolves wherever it likes and feeds
//! back through [`ChatController::apply_history`]. Results that arrive after
//! the view has moved on are discarded.

pub mod naming;

pub use naming::{derive_chat_name, NamingStrategy};

use crate::connection::{ConnectionEvent, ConnectionState, QueryRequest, QuerySink, Reply};
use crate::history::{HistoryError, HistoryLoader};
use crate::session::{Message, Session, SessionId, SessionStore};
use std::sync::Arc;

/// Longest preview excerpt stored on a session
const PREVIEW_CHARS: usize = 80;

/// Controller lifecycle for the active document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No document
    Idle,
    /// Waiting for a history fetch to resolve
    HistoryLoading,
    /// Transcript is current; sends are accepted
    Ready,
}

/// The conversation currently bound to the view
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveChat {
    pub document_id: String,
    pub session_id: Option<SessionId>,
}

/// Outcome of an activation
pub enum Activation {
    /// Transcript is ready (empty) without a fetch
    Ready,
    /// History must be fetched and applied
    Pending(PendingHistory),
}

/// A history fetch issued by an activation
pub struct PendingHistory {
    generation: u64,
    document_id: String,
    session_id: SessionId,
    loader: Arc<dyn HistoryLoader>,
}

impl PendingHistory {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Run the fetch; never fails, errors are carried in the outcome
    pub async fn fetch(self) -> LoadedHistory {
        let outcome = match self.loader.load(&self.session_id).await {
            Ok(messages) if messages.is_empty() => HistoryOutcome::Empty,
            Ok(messages) => HistoryOutcome::Loaded(messages),
            Err(e) => HistoryOutcome::Failed(e),
        };

        LoadedHistory {
            generation: self.generation,
            document_id: self.document_id,
            session_id: self.session_id,
            outcome,
        }
    }
}

/// What a history fetch produced
#[derive(Debug)]
pub enum HistoryOutcome {
    Loaded(Vec<Message>),
    /// Confirmed empty
    Empty,
    /// Transport or server error; shown to the user as an empty transcript
    Failed(HistoryError),
}

/// A resolved fetch, ready to be applied
#[derive(Debug)]
pub struct LoadedHistory {
    generation: u64,
    document_id: String,
    session_id: SessionId,
    outcome: HistoryOutcome,
}

impl LoadedHistory {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn outcome(&self) -> &HistoryOutcome {
        &self.outcome
    }
}

/// Core chat state machine
pub struct ChatController {
    store: SessionStore,
    history: Arc<dyn HistoryLoader>,
    sink: Arc<dyn QuerySink>,
    user_id: String,
    naming: NamingStrategy,
    connection: ConnectionState,
    state: ControllerState,
    active: Option<ActiveChat>,
    transcript: Vec<Message>,
    awaiting_reply: bool,
    /// Bumped by every activation and deactivation
    generation: u64,
}

impl ChatController {
    pub fn new(
        store: SessionStore,
        history: Arc<dyn HistoryLoader>,
        sink: Arc<dyn QuerySink>,
        user_id: impl Into<String>,
    ) -> Self {
        let connection = sink.state();
        Self {
            store,
            history,
            sink,
            user_id: user_id.into(),
            naming: NamingStrategy::default(),
            connection,
            state: ControllerState::Idle,
            active: None,
            transcript: Vec::new(),
            awaiting_reply: false,
            generation: 0,
        }
    }

    pub fn with_naming(mut self, naming: NamingStrategy) -> Self {
        self.naming = naming;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active(&self) -> Option<&ActiveChat> {
        self.active.as_ref()
    }

    pub fn active_session_id(&self) -> Option<&SessionId> {
        self.active.as_ref().and_then(|a| a.session_id.as_ref())
    }

    /// Stored record of the active conversation
    pub fn active_session(&self) -> Option<&Session> {
        let active = self.active.as_ref()?;
        match &active.session_id {
            Some(id) => self.store.get(id),
            None => self.store.find_by_document(&active.document_id),
        }
    }

    /// Title of the active conversation
    pub fn title(&self) -> Option<String> {
        self.active_session().map(Session::title)
    }

    /// All sessions, most recently updated first
    pub fn sessions(&self) -> Vec<Session> {
        self.store.list()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Bind the view to a document
    ///
    /// Absent or provisional ids go straight to `Ready` with an empty
    /// transcript; canonical ids need their history fetched first.
    pub fn activate(&mut self, document_id: &str, session_id: Option<SessionId>) -> Activation {
        self.generation += 1;
        self.transcript.clear();
        self.awaiting_reply = false;
        self.active = Some(ActiveChat {
            document_id: document_id.to_string(),
            session_id: session_id.clone(),
        });

        match session_id {
            Some(id @ SessionId::Canonical(_)) => {
                tracing::info!(
                    "Activating document {} (session {}), loading history",
                    document_id,
                    id
                );
                self.state = ControllerState::HistoryLoading;
                Activation::Pending(PendingHistory {
                    generation: self.generation,
                    document_id: document_id.to_string(),
                    session_id: id,
                    loader: Arc::clone(&self.history),
                })
            }
            other => {
                tracing::info!(
                    "Activating document {} with a fresh transcript ({})",
                    document_id,
                    other.map_or_else(|| "no session".to_string(), |id| id.to_string())
                );
                self.state = ControllerState::Ready;
                Activation::Ready
            }
        }
    }

    /// Apply a resolved history fetch
    ///
    /// Returns `false` when the fetch no longer matches the active
    /// conversation; the transcript is left untouched in that case.
    pub fn apply_history(&mut self, loaded: LoadedHistory) -> bool {
        let still_current = self.state == ControllerState::HistoryLoading
            && loaded.generation == self.generation
            && self.active.as_ref().is_some_and(|active| {
                active.document_id == loaded.document_id
                    && active.session_id.as_ref() == Some(&loaded.session_id)
            });

        if !still_current {
            tracing::debug!(
                "Discarding stale history for session {} of document {}",
                loaded.session_id,
                loaded.document_id
            );
            return false;
        }

        self.transcript = match loaded.outcome {
            HistoryOutcome::Loaded(messages) => {
                tracing::info!(
                    "Loaded {} messages for session {}",
                    messages.len(),
                    loaded.session_id
                );
                messages
            }
            HistoryOutcome::Empty => {
                tracing::info!("Session {} has no history yet", loaded.session_id);
                Vec::new()
            }
            HistoryOutcome::Failed(e) => {
                tracing::warn!(
                    "History unavailable for session {}, starting empty: {}",
                    loaded.session_id,
                    e
                );
                Vec::new()
            }
        };
        self.state = ControllerState::Ready;
        true
    }

    /// Find or create the session for a document, then activate it
    pub fn open_document(&mut self, document_id: &str, document_name: &str) -> Activation {
        if self.store.find_by_document(document_id).is_none() {
            if let Err(e) = self.store.create(document_id, document_name) {
                tracing::error!("New session for {} was not persisted: {}", document_id, e);
            }
        }

        let session_id = self
            .store
            .find_by_document(document_id)
            .map(|s| s.session_id.clone());
        self.activate(document_id, session_id)
    }

    /// Activate a stored session; `None` if the id is unknown
    pub fn select_session(&mut self, session_id: &SessionId) -> Option<Activation> {
        let session = self.store.get(session_id)?;
        let document_id = session.document_id.clone();
        let session_id = session.session_id.clone();
        Some(self.activate(&document_id, Some(session_id)))
    }

    /// Send a user query
    ///
    /// Returns `false` (and changes nothing) for blank text, while not
    /// connected, or while no transcript is ready.
    pub fn send(&mut self, text: &str) -> bool {
        let query = text.trim();
        if query.is_empty() {
            return false;
        }
        if self.state != ControllerState::Ready {
            tracing::debug!("Query ignored in state {:?}", self.state);
            return false;
        }
        if !self.connection.is_connected() {
            tracing::debug!("Query ignored while {}", self.connection.label());
            return false;
        }
        let Some(active) = self.active.clone() else {
            return false;
        };

        let first_message = self.transcript.is_empty();
        self.transcript.push(Message::user(query));

        if first_message {
            self.name_session(active.session_id.as_ref(), query);
        }
        self.update_preview(active.session_id.as_ref(), query);

        let request = QueryRequest {
            document_id: active.document_id.clone(),
            query: query.to_string(),
            session_id: active.session_id.as_ref().map(SessionId::to_wire),
            user_id: self.user_id.clone(),
        };

        self.awaiting_reply = true;
        match self.sink.submit_query(request) {
            Ok(()) => tracing::debug!("Query submitted for document {}", active.document_id),
            Err(e) => {
                tracing::warn!("Query for document {} not sent: {}", active.document_id, e);
                self.on_error(&format!("Failed to send query: {}", e));
            }
        }
        true
    }

    /// Handle an assistant reply
    pub fn on_reply(&mut self, reply: Reply) {
        let for_active = self
            .active
            .as_ref()
            .is_some_and(|active| active.document_id == reply.document_id);

        if let Some(canonical) = reply.session_id.as_deref() {
            self.adopt_canonical_id(&reply.document_id, canonical, for_active);
        }

        let preview_target = if for_active {
            self.active_session_id().cloned()
        } else {
            tracing::debug!(
                "Reply for inactive document {}, updating its session only",
                reply.document_id
            );
            self.store
                .find_by_document(&reply.document_id)
                .map(|s| s.session_id.clone())
        };
        self.update_preview(preview_target.as_ref(), &reply.text);

        if for_active {
            self.awaiting_reply = false;
            self.transcript
                .push(Message::assistant(reply.text, reply.sources));
        }
    }

    /// Surface a backend-reported error in the transcript
    pub fn on_error(&mut self, message: &str) {
        self.awaiting_reply = false;
        if self.active.is_none() {
            tracing::warn!("Error with no active conversation: {}", message);
            return;
        }
        self.transcript
            .push(Message::assistant(message, Vec::new()));
    }

    /// Single dispatch point for connection events
    pub fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => self.set_connection(ConnectionState::Connected),
            ConnectionEvent::Connecting { .. } => self.set_connection(ConnectionState::Connecting),
            ConnectionEvent::Disconnected => self.set_connection(ConnectionState::Disconnected),
            ConnectionEvent::Typing => {
                if self.active.is_some() {
                    self.awaiting_reply = true;
                }
            }
            ConnectionEvent::Reply(reply) => self.on_reply(reply),
            ConnectionEvent::Error(message) => self.on_error(&message),
        }
    }

    /// Unbind the view; the store is left untouched
    pub fn deactivate(&mut self) {
        self.generation += 1;
        self.active = None;
        self.transcript.clear();
        self.awaiting_reply = false;
        self.state = ControllerState::Idle;
    }

    /// User-initiated rename; `false` if the session is unknown or not persisted
    pub fn rename_session(&mut self, session_id: &SessionId, name: &str) -> bool {
        match self.store.rename(session_id, name) {
            Ok(renamed) => renamed,
            Err(e) => {
                tracing::error!("Rename of {} not persisted: {}", session_id, e);
                false
            }
        }
    }

    /// Delete a session
    ///
    /// Deleting the active session falls back to the most recent remaining
    /// one (returned as its activation), or to `Idle` when none remain.
    pub fn delete_session(&mut self, session_id: &SessionId) -> Option<Activation> {
        let was_active = self.active_session_id() == Some(session_id);

        if let Err(e) = self.store.delete(session_id) {
            tracing::error!("Deletion of {} not persisted: {}", session_id, e);
        }

        if !was_active {
            return None;
        }

        self.deactivate();
        let fallback = self.store.list().into_iter().next()?;
        tracing::info!("Falling back to session {}", fallback.session_id);
        Some(self.activate(&fallback.document_id, Some(fallback.session_id)))
    }

    fn set_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            tracing::debug!("Connection {} -> {}", self.connection.label(), state.label());
        }
        self.connection = state;
    }

    /// Name a session from its first query, once
    fn name_session(&mut self, session_id: Option<&SessionId>, query: &str) {
        let Some(session_id) = session_id else {
            return;
        };
        let Some(session) = self.store.get(session_id) else {
            return;
        };
        if session.chat_name.is_some() {
            return;
        }

        let name = derive_chat_name(query, self.naming);
        match self.store.rename(session_id, &name) {
            Ok(_) => tracing::info!("Named session {} '{}'", session_id, name),
            Err(e) => tracing::error!("Name for {} not persisted: {}", session_id, e),
        }
    }

    /// Record the backend-assigned id; only a provisional (or absent) id is replaced
    fn adopt_canonical_id(&mut self, document_id: &str, canonical: &str, for_active: bool) {
        if for_active {
            if let Some(active) = self.active.as_mut() {
                if let Some(SessionId::Canonical(current)) = &active.session_id {
                    if current != canonical {
                        tracing::warn!(
                            "Ignoring reassignment of session {} to {}",
                            current,
                            canonical
                        );
                    }
                    return;
                }

                tracing::info!(
                    "Session for document {} confirmed as {}",
                    document_id,
                    canonical
                );
                active.session_id = Some(SessionId::canonical(canonical));
            }
        }

        match self.store.promote_session_id(document_id, canonical) {
            Ok(0) => {}
            Ok(count) => tracing::debug!("Promoted {} stored session(s) to {}", count, canonical),
            Err(e) => tracing::error!("Promotion to {} not persisted: {}", canonical, e),
        }
    }

    fn update_preview(&mut self, session_id: Option<&SessionId>, text: &str) {
        let Some(session_id) = session_id else {
            return;
        };
        if let Err(e) = self.store.set_preview(session_id, &preview_excerpt(text)) {
            tracing::error!("Preview for {} not persisted: {}", session_id, e);
        }
    }
}

/// Whitespace-collapsed excerpt, `…` when truncated
fn preview_excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= PREVIEW_CHARS {
        return collapsed;
    }
    let mut excerpt: String = collapsed.chars().take(PREVIEW_CHARS).collect();
    excerpt.push('…');
    excerpt
}
