//! StateStore trait: the persistence contract for session state.
//!
//! A store is scoped to one session and exposes two logical operations through
//! a single invocation surface, mirroring the `{operation, content}` envelope
//! used by external persistence workflows. Backends live in `statewright-store`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::error::StoreError;

/// Which logical store operation is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreOperation {
    Get,
    Set,
}

/// The envelope passed to a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub operation: StoreOperation,

    /// Serialized state for `set`; empty for `get`
    #[serde(default)]
    pub content: String,
}

impl StoreRequest {
    pub fn get() -> Self {
        Self {
            operation: StoreOperation::Get,
            content: String::new(),
        }
    }

    pub fn set(content: impl Into<String>) -> Self {
        Self {
            operation: StoreOperation::Set,
            content: content.into(),
        }
    }
}

/// The core StateStore trait.
///
/// Implementations: in-memory, JSON file, SQLite.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The backend name (e.g., "file", "sqlite").
    fn name(&self) -> &str;

    /// Invoke the store. `get` returns the stored payload (a bare object or a
    /// one-element array wrapping it); `set` persists `content` and its return
    /// value is ignored by callers.
    async fn call(&self, request: StoreRequest) -> std::result::Result<Option<Value>, StoreError>;

    /// Load the raw payload.
    async fn get(&self) -> std::result::Result<Option<Value>, StoreError> {
        self.call(StoreRequest::get()).await
    }

    /// Persist a serialized state object.
    async fn set(&self, serialized: String) -> std::result::Result<(), StoreError> {
        self.call(StoreRequest::set(serialized)).await.map(|_| ())
    }
}

/// Normalize whatever a store's `get` returned into a state object.
///
/// Accepts a bare object, a one-element array wrapping it, a JSON string
/// holding either of those, or nothing at all (first interaction).
pub fn unwrap_state_payload(payload: Option<Value>) -> std::result::Result<Map<String, Value>, StoreError> {
    match payload {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::Array(items)) => match items.into_iter().next() {
            None => Ok(Map::new()),
            Some(first) => unwrap_state_payload(Some(first)),
        },
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(text)) => {
            let parsed: Value = serde_json::from_str(&text)
                .map_err(|e| StoreError::InvalidPayload(format!("stored state is not JSON: {e}")))?;
            match parsed {
                Value::String(_) => Err(StoreError::InvalidPayload(
                    "stored state is a doubly-encoded string".into(),
                )),
                other => unwrap_state_payload(Some(other)),
            }
        }
        Some(other) => Err(StoreError::InvalidPayload(format!(
            "expected a state object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_bare_object() {
        let state = unwrap_state_payload(Some(json!({"destination": "Tokyo"}))).unwrap();
        assert_eq!(state["destination"], "Tokyo");
    }

    #[test]
    fn unwraps_singleton_array() {
        let state = unwrap_state_payload(Some(json!([{"destination": "Paris"}]))).unwrap();
        assert_eq!(state["destination"], "Paris");
    }

    #[test]
    fn missing_payload_is_empty_state() {
        assert!(unwrap_state_payload(None).unwrap().is_empty());
        assert!(unwrap_state_payload(Some(json!([]))).unwrap().is_empty());
        assert!(unwrap_state_payload(Some(Value::Null)).unwrap().is_empty());
    }

    #[test]
    fn unwraps_serialized_string() {
        let state = unwrap_state_payload(Some(json!("{\"a\":1}"))).unwrap();
        assert_eq!(state["a"], 1);
    }

    #[test]
    fn rejects_scalar_payload() {
        let err = unwrap_state_payload(Some(json!(42))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));
    }

    #[test]
    fn request_envelope_serializes_lowercase() {
        let json = serde_json::to_value(StoreRequest::set("{}")).unwrap();
        assert_eq!(json, json!({"operation": "set", "content": "{}"}));
    }
}
