//! Session store - write-through CRUD over the persisted session collection

use super::{Session, SessionId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Name of the record holding the serialized session collection
pub const SESSIONS_KEY: &str = "chat_sessions";

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize sessions: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable named-record storage
pub trait KeyValueStore: Send {
    /// Read a record, `None` if it was never written
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace a record
    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Records as `<dir>/<key>.json` files
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.record_path(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        // Write then rename so a crash never leaves a half-written record
        let path = self.record_path(key);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, value).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| StoreError::Io { path, source })
    }
}

/// In-process records; clones share the same backing map
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    records: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(records.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        records.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Owns the session collection; every mutation is persisted before returning
pub struct SessionStore {
    backend: Box<dyn KeyValueStore>,
    sessions: Vec<Session>,
}

impl SessionStore {
    /// Load the collection from the backend
    ///
    /// A missing, unreadable or corrupt record yields an empty collection.
    pub fn open(backend: impl KeyValueStore + 'static) -> Self {
        let sessions = match backend.read(SESSIONS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Session>>(&raw) {
                Ok(sessions) => sessions,
                Err(e) => {
                    tracing::error!("Failed to parse persisted sessions, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!("Failed to read persisted sessions, starting empty: {}", e);
                Vec::new()
            }
        };

        tracing::debug!("Loaded {} sessions", sessions.len());

        Self {
            backend: Box::new(backend),
            sessions,
        }
    }

    /// All sessions, most recently updated first
    pub fn list(&self) -> Vec<Session> {
        let mut sessions = self.sessions.clone();
        // Stable sort keeps insertion order (newest at head) for ties
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| &s.session_id == session_id)
    }

    /// Most recently updated session for a document
    pub fn find_by_document(&self, document_id: &str) -> Option<&Session> {
        self.sessions
            .iter()
            .filter(|s| s.document_id == document_id)
            .max_by_key(|s| s.updated_at)
    }

    /// Create a session with a fresh provisional id
    pub fn create(
        &mut self,
        document_id: &str,
        document_name: &str,
    ) -> Result<Session, StoreError> {
        let session = Session::new(document_id, document_name);
        tracing::info!(
            "Created session {} for document {}",
            session.session_id,
            document_id
        );
        self.sessions.insert(0, session.clone());
        self.persist()?;
        Ok(session)
    }

    /// Set the chat name; unknown ids are a no-op returning `false`
    pub fn rename(&mut self, session_id: &SessionId, new_name: &str) -> Result<bool, StoreError> {
        let Some(session) = self.sessions.iter_mut().find(|s| &s.session_id == session_id) else {
            tracing::debug!("Rename skipped, session {} not found", session_id);
            return Ok(false);
        };

        session.chat_name = Some(new_name.to_string());
        session.touch();
        self.persist()?;
        Ok(true)
    }

    /// Replace the provisional id of the document's sessions with `canonical_id`
    ///
    /// Returns how many records were promoted. Records already holding a
    /// canonical id are left untouched, so repeating the call is a no-op.
    pub fn promote_session_id(
        &mut self,
        document_id: &str,
        canonical_id: &str,
    ) -> Result<usize, StoreError> {
        let new_id = SessionId::canonical(canonical_id);
        let mut promoted = 0;

        for session in self
            .sessions
            .iter_mut()
            .filter(|s| s.document_id == document_id && s.session_id.is_provisional())
        {
            tracing::info!("Promoting session {} -> {}", session.session_id, new_id);
            session.session_id = new_id.clone();
            session.touch();
            promoted += 1;
        }

        if promoted == 0 {
            return Ok(0);
        }

        self.collapse_duplicates(&new_id);
        self.persist()?;
        Ok(promoted)
    }

    /// Remove a session, returning it if it existed
    pub fn delete(&mut self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        let Some(index) = self.sessions.iter().position(|s| &s.session_id == session_id) else {
            return Ok(None);
        };

        let removed = self.sessions.remove(index);
        tracing::info!("Deleted session {}", session_id);
        self.persist()?;
        Ok(Some(removed))
    }

    /// Set the preview excerpt; unknown ids are a no-op returning `false`
    pub fn set_preview(&mut self, session_id: &SessionId, text: &str) -> Result<bool, StoreError> {
        let Some(session) = self.sessions.iter_mut().find(|s| &s.session_id == session_id) else {
            return Ok(false);
        };

        session.preview_message = Some(text.to_string());
        session.touch();
        self.persist()?;
        Ok(true)
    }

    /// Keep only the most recently updated record carrying `id`
    fn collapse_duplicates(&mut self, id: &SessionId) {
        let newest = self
            .sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| &s.session_id == id)
            .max_by_key(|(_, s)| s.updated_at)
            .map(|(i, _)| i);

        if let Some(keep) = newest {
            let mut index = 0;
            self.sessions.retain(|s| {
                let retain = &s.session_id != id || index == keep;
                index += 1;
                retain
            });
        }
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&self.sessions)?;
        self.backend.write(SESSIONS_KEY, &serialized).map_err(|e| {
            tracing::error!("Failed to persist sessions: {}", e);
            e
        })
    }
}
