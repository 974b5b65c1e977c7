//! Conversation history compaction.
//!
//! Stored assistant turns carry the full structured reply (decision line,
//! action list, hints). Feeding that back verbatim grows the prompt without
//! bound and teaches the model our own markup, so each assistant turn is cut
//! down to its labelled reply and summary lines.

use crate::sanitize::sanitize_text;
use serde::{Deserialize, Serialize};

/// Turns kept after compaction.
pub const MAX_TURNS: usize = 8;
/// Character cap for a compacted assistant turn.
pub const MAX_ASSISTANT_CHARS: usize = 700;

const REPLY_LABELS: &[&str] = &["risposta:", "reply:"];
const SUMMARY_LABELS: &[&str] = &["riepilogo:", "summary:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Only user/assistant roles survive; system or tool rows are dropped.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A turn as read back from storage; role is free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTurn {
    pub role: String,
    pub content: String,
}

impl StoredTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Compact turns as stored (newest first) into model input (oldest first).
pub fn compact_history(stored_newest_first: &[StoredTurn]) -> Vec<ConversationTurn> {
    let oldest_first: Vec<ConversationTurn> = stored_newest_first
        .iter()
        .rev()
        .filter_map(|t| {
            Role::parse(&t.role).map(|role| ConversationTurn {
                role,
                content: t.content.clone(),
            })
        })
        .collect();
    compact_turns(&oldest_first)
}

/// Compact an oldest-first turn list. Idempotent.
pub fn compact_turns(turns: &[ConversationTurn]) -> Vec<ConversationTurn> {
    let compacted: Vec<ConversationTurn> = turns
        .iter()
        .filter_map(|t| {
            let content = match t.role {
                Role::User => sanitize_text(&t.content),
                Role::Assistant => compact_assistant_content(&t.content),
            };
            (!content.is_empty()).then_some(ConversationTurn {
                role: t.role,
                content,
            })
        })
        .collect();

    let skip = compacted.len().saturating_sub(MAX_TURNS);
    compacted.into_iter().skip(skip).collect()
}

/// Reduce an assistant reply to its reply/summary lines, or else its first
/// two lines, capped at `MAX_ASSISTANT_CHARS`.
pub fn compact_assistant_content(content: &str) -> String {
    let clean = sanitize_text(content);
    let lines: Vec<&str> = clean
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let reply = lines.iter().find(|l| has_label(l, REPLY_LABELS));
    let summary = lines.iter().find(|l| has_label(l, SUMMARY_LABELS));

    let salient: Vec<&str> = if reply.is_some() || summary.is_some() {
        reply.into_iter().chain(summary).copied().collect()
    } else {
        lines.into_iter().take(2).collect()
    };

    join_within(&salient, MAX_ASSISTANT_CHARS)
}

/// Join lines under `max` chars. Only the first line is ever cut; later
/// lines are kept whole or dropped, so no label fragment survives.
fn join_within(lines: &[&str], max: usize) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            out = truncate_chars(line, max);
            continue;
        }
        if out.chars().count() + 1 + line.chars().count() > max {
            break;
        }
        out.push('\n');
        out.push_str(line);
    }
    out
}

fn has_label(line: &str, labels: &[&str]) -> bool {
    let lower = line.to_lowercase();
    labels.iter().any(|label| lower.starts_with(label))
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect::<String>().trim_end().to_string()
}
