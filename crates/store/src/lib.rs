//! Session state store implementations for statewright.
//!
//! Every backend is scoped to a single session key and implements
//! `statewright_core::StateStore`.

pub mod file_backend;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use serde_json::Value;
use statewright_core::error::StoreError;

/// Parse `set` content, which must be a serialized JSON object.
pub(crate) fn parse_state_content(content: &str) -> Result<Value, StoreError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| StoreError::InvalidPayload(format!("state is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(StoreError::InvalidPayload("state must be a JSON object".into()));
    }
    Ok(value)
}
