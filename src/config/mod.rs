//! Configuration management

use crate::connection::{ConnectionError, LiveConnectionConfig};
use crate::controller::NamingStrategy;
use crate::history::{HistoryError, HttpHistoryLoader};
use crate::upload::{UploadClient, UploadError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub connection: ConnectionConfig,
    pub storage: StorageConfig,
    pub naming: NamingConfig,
}

/// Backend endpoints and identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP base URL for history requests
    pub base_url: String,

    /// Live channel URL
    pub socket_url: String,

    /// Bearer token sent with history requests
    pub auth_token: Option<String>,

    /// User id attached to every query
    pub user_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            socket_url: "ws://localhost:8000/ws/chat".to_string(),
            auth_token: Some("dev-token".to_string()),
            user_id: "anonymous".to_string(),
        }
    }
}

/// Reconnection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,

    /// Per-request limit for history fetches
    pub history_timeout_ms: u64,

    /// Limit for an upload, including server-side processing
    pub upload_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            connect_timeout_ms: 10000,
            history_timeout_ms: 10000,
            upload_timeout_ms: 120000,
        }
    }
}

/// Where sessions are persisted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `chat_sessions.json`
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub strategy: NamingStrategy,
}

impl Config {
    /// Load config from the default location, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, or return defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pdfpal")
            .join("config.toml")
    }

    /// Get the directory sessions are stored in
    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pdfpal")
        })
    }

    pub fn live_connection(&self) -> Result<LiveConnectionConfig, ConnectionError> {
        Ok(LiveConnectionConfig::new(&self.server.socket_url)?
            .with_reconnect(
                self.connection.reconnect_attempts,
                Duration::from_millis(self.connection.reconnect_delay_ms),
            )
            .with_connect_timeout(Duration::from_millis(self.connection.connect_timeout_ms)))
    }

    /// History loader whose requests give up after `history_timeout_ms`
    pub fn history_loader(&self) -> Result<HttpHistoryLoader, HistoryError> {
        HttpHistoryLoader::with_timeout(
            self.server.base_url.clone(),
            self.server.auth_token.clone(),
            Duration::from_millis(self.connection.history_timeout_ms),
        )
    }

    pub fn upload_client(&self) -> Result<UploadClient, UploadError> {
        UploadClient::with_timeout(
            self.server.base_url.clone(),
            self.server.auth_token.clone(),
            Duration::from_millis(self.connection.upload_timeout_ms),
        )
    }
}
