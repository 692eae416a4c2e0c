//! Input handling - parse user input and commands

use anyhow::{bail, Result};

/// Parsed user input
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedInput {
    /// Blank line
    Empty,

    /// Query for the active document
    Query(String),

    /// Switch to a listed session: @3
    SwitchSession(usize),

    /// Control command: :command args
    ControlCommand { command: String, args: Vec<String> },
}

/// Parse a line of user input
pub fn parse_input(line: &str) -> Result<ParsedInput> {
    let line = line.trim();

    if line.is_empty() {
        return Ok(ParsedInput::Empty);
    }

    // Control command: :command
    if let Some(rest) = line.strip_prefix(':') {
        let parts: Vec<&str> = rest.splitn(2, ' ').collect();
        let command = parts[0].to_string();
        let args = parts
            .get(1)
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        return Ok(ParsedInput::ControlCommand { command, args });
    }

    // Session switch: @n
    if let Some(rest) = line.strip_prefix('@') {
        let target = rest.trim();
        return match target.parse::<usize>() {
            Ok(0) | Err(_) => bail!("Expected a session number after '@', got '{}'", target),
            Ok(n) => Ok(ParsedInput::SwitchSession(n)),
        };
    }

    Ok(ParsedInput::Query(line.to_string()))
}
