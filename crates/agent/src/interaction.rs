//! Interaction inputs, outputs, and the per-interaction working state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use statewright_core::error::Result;
use statewright_core::event::{DomainEvent, EventBus};
use statewright_core::store::{StateStore, unwrap_state_payload};
use tracing::{debug, info};

use crate::changes::{ChangeSet, changed_paths, detect_changes};
use crate::dispatch::ToolInvocationResult;
use crate::history::carry_reserved_keys;
use crate::merge::merge_state;
use crate::parse::Untrusted;
use crate::schema::StateModel;

/// Which side of the conversation a handled message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerRole {
    #[default]
    User,
    System,
}

impl std::str::FromStr for HandlerRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            other => Err(format!("unknown role '{other}', expected 'user' or 'system'")),
        }
    }
}

/// One line of a batch: the message and, for the handler, its role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<HandlerRole>,
}

impl InteractionRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: HandlerRole) -> Self {
        self.role = Some(role);
        self
    }
}

/// The outcome of one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub state: Map<String, Value>,
    pub prev_state: Map<String, Value>,
    pub state_changed_props: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_invoked: Option<Vec<ToolInvocationResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<HandlerRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InteractionResult {
    /// A stateless reply.
    pub fn plain(response: String) -> Self {
        Self {
            response: Some(response),
            state: Map::new(),
            prev_state: Map::new(),
            state_changed_props: Vec::new(),
            tools_invoked: None,
            role: None,
            message: None,
        }
    }
}

/// Mutable context threaded through the steps of one interaction.
pub(crate) struct WorkingState {
    /// Exactly what the store returned, normalized to an object.
    pub loaded: Map<String, Value>,
    /// `loaded` restricted to the model's fields.
    pub baseline: Map<String, Value>,
    /// The state being built.
    pub state: Map<String, Value>,
    pub changes: ChangeSet,
    pub first_run: bool,
    reconciled: bool,
}

impl WorkingState {
    pub async fn load(store: &dyn StateStore, model: Option<&StateModel>) -> Result<Self> {
        let loaded = unwrap_state_payload(store.get().await?)?;
        let (baseline, first_run) = match model {
            Some(model) => (model.restrict(&loaded), model.is_absent_from(&loaded)),
            None => (Map::new(), false),
        };
        let mut state = baseline.clone();
        carry_reserved_keys(&loaded, &mut state);
        debug!(store = store.name(), first_run, "Loaded session state");
        Ok(Self {
            loaded,
            baseline,
            state,
            changes: ChangeSet::new(),
            first_run,
            reconciled: false,
        })
    }

    /// Merge a candidate into the working state and record what changed.
    ///
    /// The first round runs full change detection against the loaded state;
    /// later rounds append any further differences from it.
    pub fn reconcile(&mut self, candidate: &Untrusted, model: &StateModel) {
        let mut next = merge_state(candidate, model, &self.state);
        carry_reserved_keys(&self.state, &mut next);
        if self.reconciled {
            self.changes
                .extend(changed_paths(&self.baseline, &next, model.paths()));
        } else {
            self.changes = detect_changes(&self.baseline, &next, model, self.first_run);
            self.reconciled = true;
        }
        self.state = next;
    }

    /// Write the state when anything changed. Returns whether it wrote.
    pub async fn persist(
        &self,
        store: &dyn StateStore,
        event_bus: &EventBus,
        session_id: &str,
    ) -> Result<bool> {
        if self.changes.is_empty() {
            debug!("No state changes, skipping write");
            return Ok(false);
        }
        let serialized = serde_json::to_string(&self.state)?;
        store.set(serialized).await?;
        info!(changed = ?self.changes.as_slice(), "Persisted session state");
        event_bus.publish(DomainEvent::StatePersisted {
            session_id: session_id.to_string(),
            changed: self.changes.as_slice().to_vec(),
            timestamp: chrono::Utc::now(),
        });
        Ok(true)
    }

    pub fn into_result(
        self,
        response: Option<String>,
        tools_invoked: Option<Vec<ToolInvocationResult>>,
    ) -> InteractionResult {
        InteractionResult {
            response,
            state: self.state,
            prev_state: self.loaded,
            state_changed_props: self.changes.into_vec(),
            tools_invoked,
            role: None,
            message: None,
        }
    }
}
