//! Command handling for client control commands (prefixed with `:`)

use crate::client::render::Screen;
use crate::controller::{Activation, ChatController};
use crate::session::SessionId;
use anyhow::Result;
use std::io::Write;

pub enum CommandResult {
    Continue,
    /// A conversation was (re)activated; its history may need fetching
    Activated(Activation),
    Exit,
}

/// Resolve a list number (1-based) or a session id
pub fn resolve_session(controller: &ChatController, target: &str) -> Option<SessionId> {
    if let Ok(index) = target.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| controller.sessions().into_iter().nth(i))
            .map(|s| s.session_id);
    }

    let session_id = SessionId::parse(target);
    controller.store().get(&session_id).map(|s| s.session_id.clone())
}

/// Activate a listed session by number
pub fn switch_session<W: Write>(
    index: usize,
    controller: &mut ChatController,
    screen: &mut Screen<W>,
) -> Result<CommandResult> {
    open(&index.to_string(), controller, screen)
}

/// Handle a parsed control command and return whether to continue or exit.
pub fn handle_control_command<W: Write>(
    command: &str,
    args: &[String],
    controller: &mut ChatController,
    screen: &mut Screen<W>,
) -> Result<CommandResult> {
    match command {
        "sessions" | "ls" => {
            let sessions = controller.sessions();
            screen.session_list(&sessions, controller.active_session_id())?;
        }
        "open" | "o" => {
            let Some(target) = args.first() else {
                screen.system("Usage: :open <n|session-id>")?;
                return Ok(CommandResult::Continue);
            };
            return open(target, controller, screen);
        }
        "rename" => {
            if args.is_empty() {
                screen.system("Usage: :rename <name>")?;
                return Ok(CommandResult::Continue);
            }
            let Some(session_id) = controller.active_session().map(|s| s.session_id.clone())
            else {
                screen.system("No active conversation")?;
                return Ok(CommandResult::Continue);
            };
            let name = args.join(" ");
            if controller.rename_session(&session_id, &name) {
                screen.system(&format!("Renamed to '{}'", name))?;
            } else {
                screen.system("Rename failed")?;
            }
        }
        "delete" | "rm" => {
            let target = match args.first() {
                Some(target) => resolve_session(controller, target),
                None => controller.active_session().map(|s| s.session_id.clone()),
            };
            let Some(session_id) = target else {
                screen.system("Usage: :delete [n|session-id]")?;
                return Ok(CommandResult::Continue);
            };

            let title = controller
                .store()
                .get(&session_id)
                .map(|s| s.title())
                .unwrap_or_else(|| session_id.to_string());
            let fallback = controller.delete_session(&session_id);
            screen.system(&format!("Deleted '{}'", title))?;
            if let Some(activation) = fallback {
                return Ok(CommandResult::Activated(activation));
            }
        }
        "status" => {
            screen.system(&format!("Connection: {}", controller.connection_state().label()))?;
            match controller.active_session() {
                Some(session) => {
                    screen.system(&format!(
                        "Conversation: {} [{}] on {}",
                        session.title(),
                        session.session_id,
                        session.document_name
                    ))?;
                    screen.system(&format!(
                        "{} messages{}",
                        controller.transcript().len(),
                        if controller.is_awaiting_reply() {
                            ", waiting for a reply"
                        } else {
                            ""
                        }
                    ))?;
                }
                None => screen.system("No active conversation")?,
            }
        }
        "help" | "?" => screen.help()?,
        "quit" | "exit" | "q" => return Ok(CommandResult::Exit),
        _ => {
            screen.system(&format!("Unknown command: {}", command))?;
        }
    }

    Ok(CommandResult::Continue)
}

fn open<W: Write>(
    target: &str,
    controller: &mut ChatController,
    screen: &mut Screen<W>,
) -> Result<CommandResult> {
    let activation = resolve_session(controller, target)
        .and_then(|session_id| controller.select_session(&session_id));

    match activation {
        Some(activation) => Ok(CommandResult::Activated(activation)),
        None => {
            screen.system(&format!("No conversation '{}'", target))?;
            Ok(CommandResult::Continue)
        }
    }
}
