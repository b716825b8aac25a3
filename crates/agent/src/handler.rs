//! The state handler: applies user or system messages to the session state
//! without producing a conversational reply.
//!
//! A user message goes through extraction, tool dispatch, and, when the
//! model says some fields depend on tool output, a targeted second pass
//! over only those fields. A system message is an authoritative update:
//! one call, no tools.

use statewright_core::error::{Error, Result};
use statewright_core::event::{DomainEvent, EventBus};
use statewright_core::provider::Provider;
use statewright_core::store::StateStore;
use statewright_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::{info, warn};

use crate::dispatch::{FieldTargetPolicy, StepsFieldPolicy, ToolDispatcher};
use crate::history::{HistoryEntry, SYSTEM_LAST_MESSAGE_KEY, append_history, read_history};
use crate::interaction::{HandlerRole, InteractionResult, WorkingState};
use crate::model_client::ModelClient;
use crate::parse::Untrusted;
use crate::path::{get_value_path, set_path};
use crate::prompt::{self, PromptContext};
use crate::schema::StateModel;

pub struct StateHandler {
    client: ModelClient,
    state_model: StateModel,
    tools: Arc<ToolRegistry>,
    store: Option<Arc<dyn StateStore>>,
    track_history: bool,
    policy: Arc<dyn FieldTargetPolicy>,
}

impl StateHandler {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        state_model: StateModel,
    ) -> Self {
        Self::from_client(ModelClient::new(provider, model, temperature), state_model)
    }

    pub fn from_client(client: ModelClient, state_model: StateModel) -> Self {
        Self {
            client,
            state_model,
            tools: Arc::new(ToolRegistry::new()),
            store: None,
            track_history: false,
            policy: Arc::new(StepsFieldPolicy),
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Record user messages in the conversation history.
    pub fn with_history(mut self, enabled: bool) -> Self {
        self.track_history = enabled;
        self
    }

    pub fn with_field_policy(mut self, policy: Arc<dyn FieldTargetPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.client = self.client.with_event_bus(event_bus);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.client = self.client.with_session_id(session_id);
        self
    }

    /// Apply `message` as coming from `role`.
    pub async fn handle(&self, role: HandlerRole, message: &str) -> Result<InteractionResult> {
        self.client.event_bus().publish(DomainEvent::InteractionStarted {
            session_id: self.client.session_id().to_string(),
            variant: format!("handler_{}", role_name(role)),
            timestamp: chrono::Utc::now(),
        });

        let outcome = self.run(role, message).await;
        if let Err(e) = &outcome {
            warn!(error = %e, role = role_name(role), "State handling failed");
            self.client.event_bus().publish(DomainEvent::InteractionFailed {
                session_id: self.client.session_id().to_string(),
                error_message: e.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
        outcome
    }

    async fn run(&self, role: HandlerRole, message: &str) -> Result<InteractionResult> {
        if message.trim().is_empty() {
            return Err(Error::config("message must not be empty"));
        }
        if self.state_model.is_empty() {
            return Err(Error::config("the state handler needs a non-empty state model"));
        }
        let store = self
            .store
            .as_deref()
            .ok_or_else(|| Error::config("the state handler requires a connected state store"))?;

        match role {
            HandlerRole::User => self.user(store, message).await,
            HandlerRole::System => self.system(store, message).await,
        }
    }

    async fn user(&self, store: &dyn StateStore, message: &str) -> Result<InteractionResult> {
        let model = &self.state_model;
        let mut working = WorkingState::load(store, Some(model)).await?;
        let history = self.track_history.then(|| read_history(&working.loaded));

        let messages = prompt::state_tools_and_dependents(&PromptContext {
            model,
            state: &working.state,
            history: history.as_deref(),
            tools: &self.tools,
            message,
        })?;
        let turn = self.client.generate_turn("handler_user", messages).await?;
        working.reconcile(&turn.state, model);

        let outcome = ToolDispatcher::new(&self.tools, self.policy.as_ref())
            .with_event_bus(self.client.event_bus())
            .dispatch(&turn.tools_to_invoke, model, &mut working.state, &mut working.changes)
            .await;

        let dependents: Vec<String> = turn
            .post_analysis_fields
            .into_iter()
            .filter(|f| model.contains(f))
            .collect();

        if !dependents.is_empty() && outcome.fired() {
            let messages = prompt::dependent_fields_reconciliation(
                &PromptContext {
                    model,
                    state: &working.state,
                    history: history.as_deref(),
                    tools: &self.tools,
                    message,
                },
                &outcome.results,
                &dependents,
            )?;
            match self.client.generate_turn("handler_dependents", messages).await {
                Ok(turn) => working.reconcile(&only_fields(&turn.state, &dependents), model),
                Err(e) => warn!(error = %e, "Dependent field analysis failed, keeping current state"),
            }
        }

        if self.track_history {
            append_history(&mut working.state, [HistoryEntry::user(message)], &mut working.changes);
        }

        working
            .persist(store, self.client.event_bus(), self.client.session_id())
            .await?;

        let summary = format!(
            "Processed user message: {} field(s) changed, {} tool(s) invoked",
            working.changes.len(),
            outcome.invoked.len()
        );
        info!(%summary);
        let tools_invoked = (!outcome.results.is_empty()).then_some(outcome.results);
        let mut result = working.into_result(None, tools_invoked);
        result.role = Some(HandlerRole::User);
        result.message = Some(summary);
        Ok(result)
    }

    async fn system(&self, store: &dyn StateStore, message: &str) -> Result<InteractionResult> {
        let model = &self.state_model;
        let mut working = WorkingState::load(store, Some(model)).await?;

        let messages = prompt::system_update(&PromptContext {
            model,
            state: &working.state,
            history: None,
            tools: &self.tools,
            message,
        })?;
        let turn = self.client.generate_turn("handler_system", messages).await?;
        working.reconcile(&turn.state, model);

        let previous = working.loaded.get(SYSTEM_LAST_MESSAGE_KEY).and_then(|v| v.as_str());
        if previous != Some(message) {
            working
                .state
                .insert(SYSTEM_LAST_MESSAGE_KEY.to_string(), message.into());
            working.changes.push(SYSTEM_LAST_MESSAGE_KEY);
        }

        working
            .persist(store, self.client.event_bus(), self.client.session_id())
            .await?;

        let summary = format!(
            "Applied system message: {} field(s) changed",
            working.changes.len()
        );
        info!(%summary);
        let mut result = working.into_result(None, None);
        result.role = Some(HandlerRole::System);
        result.message = Some(summary);
        Ok(result)
    }
}

fn role_name(role: HandlerRole) -> &'static str {
    match role {
        HandlerRole::User => "user",
        HandlerRole::System => "system",
    }
}

/// Keep only `fields` from a candidate state; everything else falls back.
fn only_fields(candidate: &Untrusted, fields: &[String]) -> Untrusted {
    let mut kept = serde_json::Map::new();
    for field in fields {
        if let Some(value) = get_value_path(candidate.as_value(), field) {
            set_path(&mut kept, field, value.clone());
        }
    }
    Untrusted::new(serde_json::Value::Object(kept))
}
