//! Integration tests for the interactive client commands

use async_trait::async_trait;
use pdfpal::client::{handle_line, CommandResult, Screen};
use pdfpal::connection::{ConnectionError, ConnectionState, QueryRequest, QuerySink};
use pdfpal::controller::{Activation, ChatController};
use pdfpal::history::{HistoryError, HistoryLoader};
use pdfpal::session::{MemoryKeyValueStore, Message, SessionId, SessionStore};
use std::sync::Arc;

struct EmptyLoader;

#[async_trait]
impl HistoryLoader for EmptyLoader {
    async fn load(&self, _session_id: &SessionId) -> Result<Vec<Message>, HistoryError> {
        Ok(Vec::new())
    }
}

struct AcceptingSink;

impl QuerySink for AcceptingSink {
    fn state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    fn submit_query(&self, _request: QueryRequest) -> Result<(), ConnectionError> {
        Ok(())
    }
}

fn controller_with(documents: &[(&str, &str)]) -> ChatController {
    let mut store = SessionStore::open(MemoryKeyValueStore::new());
    for (document_id, name) in documents {
        store.create(document_id, name).unwrap();
    }
    ChatController::new(store, Arc::new(EmptyLoader), Arc::new(AcceptingSink), "anonymous")
}

fn output(screen: Screen<Vec<u8>>) -> String {
    String::from_utf8(screen.into_inner()).unwrap()
}

#[test]
fn test_sessions_lists_numbered_titles() -> anyhow::Result<()> {
    let mut controller = controller_with(&[("doc-1", "a.pdf"), ("doc-2", "b.pdf")]);
    let mut screen = Screen::new(Vec::new());

    handle_line(":sessions", &mut controller, &mut screen)?;

    let text = output(screen);
    assert!(text.contains("Today"));
    assert!(text.contains(" 1. Chat about b.pdf (b.pdf)"));
    assert!(text.contains(" 2. Chat about a.pdf (a.pdf)"));
    Ok(())
}

#[test]
fn test_switch_by_number_activates_session() -> anyhow::Result<()> {
    let mut controller = controller_with(&[("doc-1", "a.pdf"), ("doc-2", "b.pdf")]);
    let mut screen = Screen::new(Vec::new());

    let result = handle_line("@2", &mut controller, &mut screen)?;

    assert!(matches!(result, CommandResult::Activated(Activation::Ready)));
    assert_eq!(controller.active().unwrap().document_id, "doc-1");
    Ok(())
}

#[test]
fn test_open_unknown_session_reports() -> anyhow::Result<()> {
    let mut controller = controller_with(&[("doc-1", "a.pdf")]);
    let mut screen = Screen::new(Vec::new());

    let result = handle_line(":open 7", &mut controller, &mut screen)?;

    assert!(matches!(result, CommandResult::Continue));
    assert!(output(screen).contains("No conversation '7'"));
    Ok(())
}

#[test]
fn test_query_without_active_conversation_is_not_sent() -> anyhow::Result<()> {
    let mut controller = controller_with(&[]);
    let mut screen = Screen::new(Vec::new());

    handle_line("what is this?", &mut controller, &mut screen)?;

    assert!(controller.transcript().is_empty());
    assert!(output(screen).contains("No active conversation"));
    Ok(())
}

#[test]
fn test_query_and_rename_flow() -> anyhow::Result<()> {
    let mut controller = controller_with(&[("doc-1", "a.pdf")]);
    let mut screen = Screen::new(Vec::new());
    handle_line("@1", &mut controller, &mut screen)?;

    handle_line("Explain the methodology section", &mut controller, &mut screen)?;
    assert_eq!(controller.transcript().len(), 1);
    assert_eq!(
        controller.title().as_deref(),
        Some("Explanation: Methodology Section")
    );

    handle_line(":rename Methods deep dive", &mut controller, &mut screen)?;
    assert_eq!(controller.title().as_deref(), Some("Methods deep dive"));

    screen.sync(&controller)?;
    let text = output(screen);
    assert!(text.contains("you: Explain the methodology section"));
    assert!(text.contains("-- assistant is typing…"));
    Ok(())
}

#[test]
fn test_delete_active_and_quit() -> anyhow::Result<()> {
    let mut controller = controller_with(&[("doc-1", "a.pdf"), ("doc-2", "b.pdf")]);
    let mut screen = Screen::new(Vec::new());
    handle_line("@1", &mut controller, &mut screen)?;

    let result = handle_line(":delete", &mut controller, &mut screen)?;

    assert!(matches!(result, CommandResult::Activated(_)));
    assert_eq!(controller.sessions().len(), 1);
    assert_eq!(controller.active().unwrap().document_id, "doc-1");

    assert!(matches!(
        handle_line(":quit", &mut controller, &mut screen)?,
        CommandResult::Exit
    ));
    assert!(matches!(
        handle_line(":bogus", &mut controller, &mut screen)?,
        CommandResult::Continue
    ));
    assert!(output(screen).contains("Unknown command: bogus"));
    Ok(())
}

/// Serves one fixed transcript for every canonical id
struct FixedLoader(Vec<Message>);

#[async_trait]
impl HistoryLoader for FixedLoader {
    async fn load(&self, _session_id: &SessionId) -> Result<Vec<Message>, HistoryError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_loaded_history_is_printed_in_full() -> anyhow::Result<()> {
    let loader = FixedLoader(vec![
        Message::user("What does chapter two cover?"),
        Message::assistant("Chapter two covers revenue.", Vec::new()),
    ]);
    let mut controller = ChatController::new(
        SessionStore::open(MemoryKeyValueStore::new()),
        Arc::new(loader),
        Arc::new(AcceptingSink),
        "anonymous",
    );
    let mut screen = Screen::new(Vec::new());

    let activation = controller.activate("doc-1", Some(SessionId::canonical("c9f1")));
    let Activation::Pending(pending) = activation else {
        panic!("expected a pending history fetch");
    };
    screen.sync(&controller)?;

    // Printed while the fetch is still in flight
    controller.on_error("Server busy");
    screen.sync(&controller)?;

    assert!(controller.apply_history(pending.fetch().await));
    screen.sync(&controller)?;

    let text = output(screen);
    assert!(text.contains("Server busy"));
    assert!(text.contains("What does chapter two cover?"));
    assert!(text.contains("Chapter two covers revenue."));
    Ok(())
}
