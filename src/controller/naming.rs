//! Chat naming - derive a short title from the first query of a session

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// How titles are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStrategy {
    /// Intent prefix plus the first meaningful words
    #[default]
    Intent,
    /// First four words of the query
    Truncate,
}

/// Words never used in an intent title
const STOP_WORDS: &[&str] = &[
    "about", "the", "of", "in", "on", "for", "with", "from", "to", "a", "an", "this", "that",
    "these", "those", "is", "are",
];

const TITLE_WORDS: usize = 3;
const TRUNCATE_WORDS: usize = 4;

struct Intent {
    prefix: &'static str,
    trigger: Regex,
}

/// Checked in order; the first matching intent wins
static INTENTS: LazyLock<Vec<Intent>> = LazyLock::new(|| {
    [
        ("Summary:", r"(?i)\b(?:summari[sz]e\w*|summary|summaries)\b"),
        ("Explanation:", r"(?i)\b(?:explain\w*|what\s+is|what\s+are)\b"),
        ("Analysis:", r"(?i)\b(?:list|find|show\s+me)\b"),
        ("Guide:", r"(?i)\b(?:how|process\w*|methods?)\b"),
        ("Comparison:", r"(?i)\b(?:compar\w*|differences?|vs)\b\.?"),
    ]
    .into_iter()
    .map(|(prefix, pattern)| Intent {
        prefix,
        trigger: Regex::new(pattern).unwrap(),
    })
    .collect()
});

/// Derive a chat name from a query
///
/// Pure and deterministic: the same query and strategy always yield the same name.
pub fn derive_chat_name(query: &str, strategy: NamingStrategy) -> String {
    match strategy {
        NamingStrategy::Intent => intent_name(query),
        NamingStrategy::Truncate => truncated_name(query),
    }
}

fn intent_name(query: &str) -> String {
    let normalized = query.to_lowercase();
    let Some(intent) = INTENTS.iter().find(|i| i.trigger.is_match(&normalized)) else {
        return truncated_name(query);
    };

    let stripped = intent.trigger.replace_all(query, " ");
    let words: Vec<String> = stripped
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !STOP_WORDS.contains(&word.to_lowercase().as_str()))
        .filter(|word| word.chars().count() > 2)
        .take(TITLE_WORDS)
        .map(capitalize)
        .collect();

    if words.is_empty() {
        return truncated_name(query);
    }

    format!("{} {}", intent.prefix, words.join(" "))
}

fn truncated_name(query: &str) -> String {
    let words: Vec<&str> = query.split_whitespace().collect();
    let head = words[..words.len().min(TRUNCATE_WORDS)].join(" ");
    let mut name = capitalize(&head);
    if words.len() > TRUNCATE_WORDS {
        name.push('…');
    }
    name
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
