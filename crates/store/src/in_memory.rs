//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use serde_json::Value;
use statewright_core::error::StoreError;
use statewright_core::store::{StateStore, StoreOperation, StoreRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An in-memory store holding every session's state in a shared map.
///
/// Cloning is cheap; [`scoped`](Self::scoped) hands out per-session views
/// over the same map.
#[derive(Clone)]
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<String, Value>>>,
    session_id: String,
}

impl InMemoryStore {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_id: session_id.into(),
        }
    }

    /// A view of the same underlying map for another session.
    pub fn scoped(&self, session_id: impl Into<String>) -> Self {
        Self {
            sessions: self.sessions.clone(),
            session_id: session_id.into(),
        }
    }

    /// Seed this session's state directly (tests, fixtures).
    pub async fn seed(&self, state: Value) {
        self.sessions
            .write()
            .await
            .insert(self.session_id.clone(), state);
    }

    /// The currently stored state, if any.
    pub async fn snapshot(&self) -> Option<Value> {
        self.sessions.read().await.get(&self.session_id).cloned()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn call(&self, request: StoreRequest) -> Result<Option<Value>, StoreError> {
        match request.operation {
            StoreOperation::Get => Ok(self.snapshot().await),
            StoreOperation::Set => {
                let state = crate::parse_state_content(&request.content)?;
                self.seed(state).await;
                Ok(None)
            }
        }
    }
}
