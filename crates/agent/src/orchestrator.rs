//! The state agent: one user message in, a reply and an updated state out.
//!
//! An interaction takes one of three paths:
//!
//! - **plain**: no state model and no history. The model answers directly,
//!   through the tool-calling loop when tools are connected.
//! - **history only**: no state model, history tracked. The reply sees the
//!   conversation so far and both turns are appended to the stored history.
//! - **stateful**: the model extracts state, tools fill in what they can,
//!   and the reply is produced in the same call (single mode) or in a
//!   separate call from the reconciled state (double mode).

use serde_json::Map;
use statewright_config::PromptMode;
use statewright_core::error::{Error, Result};
use statewright_core::event::{DomainEvent, EventBus};
use statewright_core::provider::Provider;
use statewright_core::store::StateStore;
use statewright_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::{info, warn};

use crate::dispatch::{
    DispatchOutcome, FieldTargetPolicy, StepsFieldPolicy, ToolDispatcher, ToolInvocationRequest,
};
use crate::history::{HistoryEntry, append_history, read_history};
use crate::interaction::{InteractionResult, WorkingState};
use crate::loop_runner::{AgentLoop, DEFAULT_MAX_ITERATIONS};
use crate::model_client::ModelClient;
use crate::prompt::{self, PromptContext};
use crate::schema::StateModel;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub struct StateAgent {
    client: ModelClient,
    state_model: Option<StateModel>,
    tools: Arc<ToolRegistry>,
    store: Option<Arc<dyn StateStore>>,
    mode: PromptMode,
    track_history: bool,
    system_prompt: String,
    max_iterations: u32,
    policy: Arc<dyn FieldTargetPolicy>,
}

impl StateAgent {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self::from_client(ModelClient::new(provider, model, temperature))
    }

    pub fn from_client(client: ModelClient) -> Self {
        Self {
            client,
            state_model: None,
            tools: Arc::new(ToolRegistry::new()),
            store: None,
            mode: PromptMode::Single,
            track_history: false,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            policy: Arc::new(StepsFieldPolicy),
        }
    }

    /// Track the given state model. An empty model is the same as none.
    pub fn with_state_model(mut self, model: StateModel) -> Self {
        self.state_model = (!model.is_empty()).then_some(model);
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_mode(mut self, mode: PromptMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_history(mut self, enabled: bool) -> Self {
        self.track_history = enabled;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the tool-calling loop limit for plain replies.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
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

    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.client.event_bus()
    }

    /// Process one user message.
    pub async fn process(&self, message: &str) -> Result<InteractionResult> {
        let variant = self.variant();
        self.client.event_bus().publish(DomainEvent::InteractionStarted {
            session_id: self.client.session_id().to_string(),
            variant: variant.into(),
            timestamp: chrono::Utc::now(),
        });

        let outcome = self.run(message).await;
        if let Err(e) = &outcome {
            warn!(error = %e, variant, "Interaction failed");
            self.client.event_bus().publish(DomainEvent::InteractionFailed {
                session_id: self.client.session_id().to_string(),
                error_message: e.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
        outcome
    }

    fn variant(&self) -> &'static str {
        match (&self.state_model, self.track_history, self.mode) {
            (None, false, _) => "plain",
            (None, true, _) => "history",
            (Some(_), _, PromptMode::Single) => "single",
            (Some(_), _, PromptMode::Double) => "double",
        }
    }

    async fn run(&self, message: &str) -> Result<InteractionResult> {
        if message.trim().is_empty() {
            return Err(Error::config("message must not be empty"));
        }

        if self.state_model.is_none() && !self.track_history {
            return self.plain(message).await;
        }

        let store = self
            .store
            .as_deref()
            .ok_or_else(|| Error::config("state tracking requires a connected state store"))?;

        match &self.state_model {
            None => self.history_only(store, message).await,
            Some(model) => self.stateful(store, model, message).await,
        }
    }

    async fn plain(&self, message: &str) -> Result<InteractionResult> {
        let mut messages = prompt::plain_response(&self.system_prompt, None, message)?;
        let response = if self.tools.is_empty() {
            self.client.generate("plain_response", messages).await?
        } else {
            AgentLoop::new(self.client.clone(), self.tools.clone())
                .with_max_iterations(self.max_iterations)
                .process(&mut messages)
                .await?
        };
        Ok(InteractionResult::plain(response))
    }

    async fn history_only(&self, store: &dyn StateStore, message: &str) -> Result<InteractionResult> {
        let mut working = WorkingState::load(store, None).await?;
        let history = read_history(&working.loaded);

        let messages = prompt::plain_response(&self.system_prompt, Some(&history), message)?;
        let response = self.client.generate("plain_response", messages).await?;

        append_history(
            &mut working.state,
            [HistoryEntry::user(message), HistoryEntry::assistant(&response)],
            &mut working.changes,
        );
        working
            .persist(store, self.client.event_bus(), self.client.session_id())
            .await?;
        Ok(working.into_result(Some(response), None))
    }

    async fn stateful(
        &self,
        store: &dyn StateStore,
        model: &StateModel,
        message: &str,
    ) -> Result<InteractionResult> {
        let mut working = WorkingState::load(store, Some(model)).await?;
        let history = self.track_history.then(|| read_history(&working.loaded));

        let (response, dispatched) = match self.mode {
            PromptMode::Single => self.single(&mut working, model, history.as_deref(), message).await?,
            PromptMode::Double => self.double(&mut working, model, history.as_deref(), message).await?,
        };

        if self.track_history {
            append_history(
                &mut working.state,
                [HistoryEntry::user(message), HistoryEntry::assistant(&response)],
                &mut working.changes,
            );
        }

        working
            .persist(store, self.client.event_bus(), self.client.session_id())
            .await?;

        info!(
            changed = working.changes.len(),
            tools = dispatched.as_ref().map_or(0, |d| d.invoked.len()),
            "Interaction complete"
        );
        let tools_invoked = dispatched.map(|d| d.results).filter(|r| !r.is_empty());
        Ok(working.into_result(Some(response), tools_invoked))
    }

    /// Single mode: state and reply come from the same call when possible.
    async fn single(
        &self,
        working: &mut WorkingState,
        model: &StateModel,
        history: Option<&[HistoryEntry]>,
        message: &str,
    ) -> Result<(String, Option<DispatchOutcome>)> {
        if self.tools.is_empty() {
            let messages = prompt::state_extraction(&self.context(model, &working.state, history, message))?;
            let turn = self.client.generate_turn("state_extraction", messages).await?;
            working.reconcile(&turn.state, model);
            let response = match turn.response.filter(|text| !text.trim().is_empty()) {
                Some(text) => text,
                None => self.respond_from_state(working, model, history, message).await?,
            };
            return Ok((response, None));
        }

        let messages = prompt::state_and_tools(&self.context(model, &working.state, history, message))?;
        let turn = self.client.generate_turn("state_and_tools", messages).await?;
        working.reconcile(&turn.state, model);

        let outcome = self.dispatch(working, model, &turn.tools_to_invoke).await;

        let mut response = None;
        if outcome.fired() {
            let messages = prompt::tool_reconciliation(
                &self.context(model, &working.state, history, message),
                &outcome.results,
                true,
            )?;
            match self.client.generate_turn("tool_reconciliation", messages).await {
                Ok(turn) => {
                    working.reconcile(&turn.state, model);
                    response = turn.response;
                }
                Err(e) => warn!(error = %e, "Tool reconciliation failed, keeping current state"),
            }
        }

        let response = match response {
            Some(text) => text,
            None => self.respond_from_state(working, model, history, message).await?,
        };
        Ok((response, Some(outcome)))
    }

    /// Double mode: state first, then a separate reply from the reconciled state.
    async fn double(
        &self,
        working: &mut WorkingState,
        model: &StateModel,
        history: Option<&[HistoryEntry]>,
        message: &str,
    ) -> Result<(String, Option<DispatchOutcome>)> {
        let messages = prompt::state_and_tools(&self.context(model, &working.state, history, message))?;
        let turn = self.client.generate_turn("state_and_tools", messages).await?;
        working.reconcile(&turn.state, model);

        let mut dispatched = None;
        if !self.tools.is_empty() {
            let outcome = self.dispatch(working, model, &turn.tools_to_invoke).await;
            if outcome.fired() {
                let messages = prompt::tool_reconciliation(
                    &self.context(model, &working.state, history, message),
                    &outcome.results,
                    false,
                )?;
                match self.client.generate_turn("tool_reconciliation", messages).await {
                    Ok(turn) => working.reconcile(&turn.state, model),
                    Err(e) => warn!(error = %e, "Tool reconciliation failed, keeping current state"),
                }
            }
            dispatched = Some(outcome);
        }

        let response = self.respond_from_state(working, model, history, message).await?;
        Ok((response, dispatched))
    }

    async fn respond_from_state(
        &self,
        working: &WorkingState,
        model: &StateModel,
        history: Option<&[HistoryEntry]>,
        message: &str,
    ) -> Result<String> {
        let messages = prompt::response_from_state(&self.context(model, &working.state, history, message))?;
        self.client.generate("response_generation", messages).await
    }

    async fn dispatch(
        &self,
        working: &mut WorkingState,
        model: &StateModel,
        requests: &[ToolInvocationRequest],
    ) -> DispatchOutcome {
        ToolDispatcher::new(&self.tools, self.policy.as_ref())
            .with_event_bus(self.client.event_bus())
            .dispatch(requests, model, &mut working.state, &mut working.changes)
            .await
    }

    fn context<'a>(
        &'a self,
        model: &'a StateModel,
        state: &'a Map<String, serde_json::Value>,
        history: Option<&'a [HistoryEntry]>,
        message: &'a str,
    ) -> PromptContext<'a> {
        PromptContext {
            model,
            state,
            history,
            tools: &self.tools,
            message,
        }
    }
}
