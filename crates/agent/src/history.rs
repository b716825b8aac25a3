//! Conversation history kept inside the session state.
//!
//! History lives under a reserved key next to the model's fields, so it is
//! persisted by the same store write. It is never part of the state model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use statewright_core::message::Role;

use crate::changes::ChangeSet;

/// Reserved key holding the conversation history array.
pub const HISTORY_KEY: &str = "conversation_history";

/// Reserved key holding the last message applied with the system role.
pub const SYSTEM_LAST_MESSAGE_KEY: &str = "system_last_message";

/// Keys outside the state model that survive from one interaction to the next.
pub const RESERVED_KEYS: [&str; 2] = [HISTORY_KEY, SYSTEM_LAST_MESSAGE_KEY];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub message: String,
}

impl HistoryEntry {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            message: message.into(),
        }
    }

    pub fn assistant(message: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            message: message.into(),
        }
    }
}

/// The well-formed history entries in `state`. Malformed items are skipped.
pub fn read_history(state: &Map<String, Value>) -> Vec<HistoryEntry> {
    state
        .get(HISTORY_KEY)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Append entries to the stored history and record the change.
pub fn append_history(
    state: &mut Map<String, Value>,
    entries: impl IntoIterator<Item = HistoryEntry>,
    changes: &mut ChangeSet,
) {
    let mut items = state
        .get(HISTORY_KEY)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let before = items.len();
    items.extend(
        entries
            .into_iter()
            .filter_map(|entry| serde_json::to_value(entry).ok()),
    );
    if items.len() > before {
        state.insert(HISTORY_KEY.to_string(), Value::Array(items));
        changes.push(HISTORY_KEY);
    }
}

/// Render history as `role: message` lines for a prompt.
pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No previous conversation.".into();
    }
    entries
        .iter()
        .map(|e| format!("{}: {}", e.role, e.message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Copy reserved keys from a loaded state into a freshly merged one.
pub fn carry_reserved_keys(from: &Map<String, Value>, to: &mut Map<String, Value>) {
    for key in RESERVED_KEYS {
        if let Some(value) = from.get(key) {
            to.insert(key.to_string(), value.clone());
        }
    }
}
