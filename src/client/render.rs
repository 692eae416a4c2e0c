//! Output rendering - transcript, session list, status
//!
//! The screen is append-only: [`Screen::sync`] compares what it last printed
//! with the controller and writes only what is new. A new activation (a bumped
//! generation) starts a fresh transcript section headed by the chat title.

use crate::connection::ConnectionState;
use crate::controller::{ChatController, ControllerState};
use crate::session::{Message, Session, SessionId};
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::io::{self, Write};

/// Longest citation excerpt printed under a reply
const SOURCE_EXCERPT_CHARS: usize = 100;

/// Help shown by `:help`
pub const HELP: &[&str] = &[
    "Type a question to ask about the active document.",
    "",
    "  :sessions          List stored conversations",
    "  @<n>               Switch to conversation n of the list",
    "  :open <n|id>       Same, by number or session id",
    "  :rename <name>     Rename the active conversation",
    "  :delete [n|id]     Delete a conversation (default: the active one)",
    "  :status            Connection and conversation status",
    "  :help              Show this help",
    "  :quit              Exit (Ctrl+C also works)",
];

/// Incremental transcript printer
pub struct Screen<W: Write> {
    out: W,
    generation: Option<u64>,
    rendered: usize,
    state: Option<ControllerState>,
    connection: Option<ConnectionState>,
    awaiting_shown: bool,
}

impl<W: Write> Screen<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            generation: None,
            rendered: 0,
            state: None,
            connection: None,
            awaiting_shown: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print a client notice
    pub fn system(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "-- {}", text)?;
        self.out.flush()
    }

    pub fn help(&mut self) -> io::Result<()> {
        for line in HELP {
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()
    }

    /// Bring the output up to date with the controller
    pub fn sync(&mut self, controller: &ChatController) -> io::Result<()> {
        let connection = controller.connection_state();
        if self.connection != Some(connection) {
            self.connection = Some(connection);
            writeln!(self.out, "-- {}", connection.label())?;
        }

        if self.generation != Some(controller.generation()) {
            self.generation = Some(controller.generation());
            self.rendered = 0;
            self.state = None;
            self.awaiting_shown = false;
            if let Some(title) = controller.title() {
                writeln!(self.out, "\n== {} ==", title)?;
            }
        }

        let state = controller.state();
        if self.state != Some(state) {
            // Loaded history replaces anything printed while it was in flight
            if self.state == Some(ControllerState::HistoryLoading) {
                self.rendered = 0;
            }
            self.state = Some(state);
            if state == ControllerState::HistoryLoading {
                writeln!(self.out, "-- Loading history…")?;
            }
        }

        let transcript = controller.transcript();
        if transcript.len() < self.rendered {
            self.rendered = 0;
        }
        for message in &transcript[self.rendered..] {
            writeln!(self.out, "{}", format_message(message))?;
        }
        self.rendered = transcript.len();

        let awaiting = controller.is_awaiting_reply();
        if awaiting && !self.awaiting_shown {
            writeln!(self.out, "-- assistant is typing…")?;
        }
        self.awaiting_shown = awaiting;

        self.out.flush()
    }

    /// Numbered session list grouped by day
    pub fn session_list(
        &mut self,
        sessions: &[Session],
        active: Option<&SessionId>,
    ) -> io::Result<()> {
        if sessions.is_empty() {
            writeln!(self.out, "-- No conversations yet")?;
            return self.out.flush();
        }

        let today = Local::now().date_naive();
        for (label, entries) in group_sessions(sessions, today) {
            writeln!(self.out, "{}", label)?;
            for (index, session) in entries {
                let marker = if Some(&session.session_id) == active { '*' } else { ' ' };
                writeln!(
                    self.out,
                    "{} {:>2}. {} ({})",
                    marker,
                    index + 1,
                    session.title(),
                    session.document_name
                )?;
                if let Some(preview) = &session.preview_message {
                    writeln!(self.out, "       {}", preview)?;
                }
            }
        }
        self.out.flush()
    }
}

/// One transcript entry with its citations
pub fn format_message(message: &Message) -> String {
    let mut rendered = format!(
        "[{}] {}: {}",
        local_time(&message.timestamp),
        message.sender.label(),
        message.text
    );

    for source in &message.sources {
        let excerpt = excerpt(&source.text);
        match source.page {
            Some(page) => rendered.push_str(&format!("\n    [p. {}] {}", page, excerpt)),
            None => rendered.push_str(&format!("\n    [source] {}", excerpt)),
        }
    }
    rendered
}

/// "Today", "Yesterday", or the date
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(date) {
        "Yesterday".to_string()
    } else {
        date.format("%b %-d, %Y").to_string()
    }
}

/// Group an ordered session list by local day, keeping list indices
pub fn group_sessions(
    sessions: &[Session],
    today: NaiveDate,
) -> Vec<(String, Vec<(usize, &Session)>)> {
    let mut groups: Vec<(String, Vec<(usize, &Session)>)> = Vec::new();

    for (index, session) in sessions.iter().enumerate() {
        let label = day_label(session.updated_at.with_timezone(&Local).date_naive(), today);
        match groups.last_mut() {
            Some((current, entries)) if *current == label => entries.push((index, session)),
            _ => groups.push((label, vec![(index, session)])),
        }
    }
    groups
}

fn local_time(timestamp: &DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%H:%M").to_string()
}

fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SOURCE_EXCERPT_CHARS {
        return collapsed;
    }
    let mut short: String = collapsed.chars().take(SOURCE_EXCERPT_CHARS).collect();
    short.push('…');
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Source;
    use chrono::Duration;

    #[test]
    fn test_day_labels() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(
            day_label(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(), today),
            "Yesterday"
        );
        assert_eq!(
            day_label(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), today),
            "Feb 1, 2024"
        );
    }

    #[test]
    fn test_group_sessions_keeps_list_indices() {
        let now = Utc::now();
        let mut first = Session::new("doc-1", "a.pdf");
        first.updated_at = now;
        let mut second = Session::new("doc-2", "b.pdf");
        second.updated_at = now;
        let mut third = Session::new("doc-3", "c.pdf");
        third.updated_at = now - Duration::days(10);

        let sessions = vec![first, second, third];
        let today = Local::now().date_naive();
        let groups = group_sessions(&sessions, today);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "Today");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1[0].0, 2);
        assert_eq!(groups[1].1[0].1.document_id, "doc-3");
    }

    #[test]
    fn test_format_message_with_sources() {
        let message = Message::assistant(
            "Revenue grew 12%.",
            vec![
                Source {
                    page: Some(4),
                    text: "Revenue grew   12% year over year".to_string(),
                },
                Source {
                    page: None,
                    text: "x".repeat(150),
                },
            ],
        );

        let rendered = format_message(&message);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("assistant: Revenue grew 12%."));
        assert_eq!(lines[1], "    [p. 4] Revenue grew 12% year over year");
        assert!(lines[2].starts_with("    [source] xxx"));
        assert!(lines[2].ends_with('…'));
    }

    #[test]
    fn test_session_list_marks_active() {
        let session = Session::new("doc-1", "report.pdf");
        let active = session.session_id.clone();
        let mut screen = Screen::new(Vec::new());

        screen.session_list(&[session], Some(&active)).unwrap();

        let output = String::from_utf8(screen.into_inner()).unwrap();
        assert!(output.contains("*  1. Chat about report.pdf (report.pdf)"));
    }
}
