//! Client - interactive line-oriented chat front end
//!
//! A single event loop owns the controller. Stdin lines, connection events
//! and resolved history fetches all re-enter through it, so the controller
//! never needs locking.

mod commands;
mod input;
mod render;

pub use commands::{handle_control_command, resolve_session, CommandResult};
pub use input::{parse_input, ParsedInput};
pub use render::{day_label, format_message, group_sessions, Screen};

use crate::config::Config;
use crate::connection::{LiveConnection, QuerySink};
use crate::controller::{Activation, ChatController, LoadedHistory};
use crate::history::HistoryLoader;
use crate::session::{FileKeyValueStore, SessionId, SessionStore};
use crate::upload::UploadResponse;
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// What to show when the client starts
#[derive(Debug, Clone)]
pub enum StartupTarget {
    /// Open (or create) the conversation for a document
    Document {
        document_id: String,
        document_name: String,
    },
    /// Resume a stored session by id or list number
    Session(String),
    /// Resume the most recently updated session
    MostRecent,
}

/// Open the configured session store
pub fn open_store(config: &Config) -> SessionStore {
    let dir = config.data_dir();
    tracing::debug!("Session store at {}", dir.display());
    SessionStore::open(FileKeyValueStore::new(dir))
}

/// Handle one line of user input
pub fn handle_line<W: Write>(
    line: &str,
    controller: &mut ChatController,
    screen: &mut Screen<W>,
) -> Result<CommandResult> {
    let parsed = match parse_input(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            screen.system(&e.to_string())?;
            return Ok(CommandResult::Continue);
        }
    };

    match parsed {
        ParsedInput::Empty => {}
        ParsedInput::Query(text) => {
            if controller.active().is_none() {
                screen.system("No active conversation; use :sessions and :open")?;
            } else if !controller.connection_state().is_connected() {
                screen.system(&format!(
                    "Not sent: {}",
                    controller.connection_state().label()
                ))?;
            } else if !controller.send(&text) {
                screen.system("Not sent: history is still loading")?;
            }
        }
        ParsedInput::SwitchSession(index) => {
            return commands::switch_session(index, controller, screen);
        }
        ParsedInput::ControlCommand { command, args } => {
            return handle_control_command(&command, &args, controller, screen);
        }
    }

    Ok(CommandResult::Continue)
}

/// Run the interactive client until `:quit`, end of input, or Ctrl+C
pub async fn run(config: &Config, target: StartupTarget) -> Result<()> {
    let store = open_store(config);
    let history: Arc<dyn HistoryLoader> = Arc::new(
        config
            .history_loader()
            .context("Failed to build the history client")?,
    );
    let live_config = config
        .live_connection()
        .context("Invalid [server] socket_url")?;

    let (connection, mut events) = LiveConnection::spawn(live_config);
    let connection = Arc::new(connection);

    let mut controller = ChatController::new(
        store,
        history,
        Arc::clone(&connection) as Arc<dyn QuerySink>,
        config.server.user_id.clone(),
    )
    .with_naming(config.naming.strategy);

    let initial = match target {
        StartupTarget::Document {
            document_id,
            document_name,
        } => controller.open_document(&document_id, &document_name),
        StartupTarget::Session(raw) => {
            let Some(session_id) = resolve_session(&controller, &raw) else {
                bail!("Unknown session '{}'", raw);
            };
            match controller.select_session(&session_id) {
                Some(activation) => activation,
                None => bail!("Unknown session '{}'", raw),
            }
        }
        StartupTarget::MostRecent => match controller.sessions().into_iter().next() {
            Some(session) => controller
                .select_session(&session.session_id)
                .unwrap_or(Activation::Ready),
            None => {
                println!("No conversations yet. Start one with `pdfpal chat <document-id>`.");
                return Ok(());
            }
        },
    };

    let (history_tx, mut history_rx) = mpsc::channel::<LoadedHistory>(16);
    spawn_fetch(initial, &history_tx);

    let mut screen = Screen::new(std::io::stdout());
    screen.system("Type :help for commands")?;
    screen.sync(&controller)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                match handle_line(&line, &mut controller, &mut screen)? {
                    CommandResult::Continue => {}
                    CommandResult::Activated(activation) => spawn_fetch(activation, &history_tx),
                    CommandResult::Exit => break,
                }
            }

            Some(event) = events.recv() => {
                controller.on_connection_event(event);
            }

            Some(loaded) = history_rx.recv() => {
                controller.apply_history(loaded);
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }

        screen.sync(&controller)?;
    }

    // The controller holds the other reference to the connection
    drop(controller);
    match Arc::try_unwrap(connection) {
        Ok(connection) => connection.shutdown().await,
        Err(_) => tracing::warn!("Connection still shared at exit"),
    }

    Ok(())
}

/// Resolve a pending history fetch off the event loop
fn spawn_fetch(activation: Activation, results: &mpsc::Sender<LoadedHistory>) {
    let Activation::Pending(pending) = activation else {
        return;
    };

    let results = results.clone();
    tokio::spawn(async move {
        let loaded = pending.fetch().await;
        if results.send(loaded).await.is_err() {
            tracing::debug!("History result arrived after exit");
        }
    });
}

/// Upload a PDF and report the document it became
pub async fn upload_document(config: &Config, path: &Path) -> Result<UploadResponse> {
    let uploader = config
        .upload_client()
        .context("Failed to build the upload client")?;
    let uploaded = uploader
        .upload(path)
        .await
        .with_context(|| format!("Upload of {} failed", path.display()))?;

    match uploaded.page_count {
        Some(pages) => println!("Uploaded {} ({} pages)", uploaded.filename, pages),
        None => println!("Uploaded {}", uploaded.filename),
    }
    Ok(uploaded)
}

/// Print the stored session list (non-interactive)
pub fn list_sessions(config: &Config) -> Result<()> {
    let sessions = open_store(config).list();
    let mut screen = Screen::new(std::io::stdout());
    screen.session_list(&sessions, None)?;
    Ok(())
}

/// Rename a stored session (non-interactive)
pub fn rename_session(config: &Config, session: &str, name: &str) -> Result<()> {
    let mut store = open_store(config);
    let session_id = resolve_stored(&store, session)?;
    if store.rename(&session_id, name)? {
        println!("Renamed {} to '{}'", session_id, name);
    }
    Ok(())
}

/// Delete a stored session (non-interactive)
pub fn delete_session(config: &Config, session: &str) -> Result<()> {
    let mut store = open_store(config);
    let session_id = resolve_stored(&store, session)?;
    if let Some(deleted) = store.delete(&session_id)? {
        println!("Deleted '{}'", deleted.title());
    }
    Ok(())
}

fn resolve_stored(store: &SessionStore, target: &str) -> Result<SessionId> {
    if let Ok(index) = target.parse::<usize>() {
        if let Some(session) = index.checked_sub(1).and_then(|i| store.list().into_iter().nth(i)) {
            return Ok(session.session_id);
        }
    }

    let session_id = SessionId::parse(target);
    match store.get(&session_id) {
        Some(session) => Ok(session.session_id.clone()),
        None => bail!("Unknown session '{}'", target),
    }
}
