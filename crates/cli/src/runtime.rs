//! Builds the engine's collaborators from configuration.

use anyhow::{Context, Result, anyhow};
use statewright_agent::{ModelClient, StateAgent, StateHandler, StateModel};
use statewright_config::{AppConfig, StoreBackend};
use statewright_core::event::{DomainEvent, EventBus};
use statewright_core::provider::Provider;
use statewright_core::store::StateStore;
use statewright_core::tool::ToolRegistry;
use statewright_store::{FileStore, InMemoryStore, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = config_path(explicit);
    AppConfig::load_with_env(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

pub struct Runtime {
    pub config: AppConfig,
    pub provider: Arc<dyn Provider>,
    pub tools: Arc<ToolRegistry>,
    pub state_model: Option<StateModel>,
    pub event_bus: Arc<EventBus>,
}

impl Runtime {
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let router = statewright_providers::build_from_config(&config);
        let provider = router
            .default()
            .ok_or_else(|| anyhow!("No provider named '{}' is configured", config.default_provider))?;

        let tools = Arc::new(statewright_tools::build_registry(&config.tools));

        let state_model = config
            .engine
            .state_model_source()?
            .map(|source| StateModel::parse(&source))
            .transpose()?;

        let event_bus = Arc::new(EventBus::default());
        spawn_event_logger(&event_bus);

        Ok(Self {
            config,
            provider,
            tools,
            state_model,
            event_bus,
        })
    }

    /// The state store for `session`, per `[store]`.
    pub async fn store(&self, session: &str) -> Result<Arc<dyn StateStore>> {
        let path = self.config.store.resolved_path();
        let store: Arc<dyn StateStore> = match self.config.store.backend {
            StoreBackend::Memory => Arc::new(InMemoryStore::new(session)),
            StoreBackend::File => Arc::new(FileStore::new(&path, session)),
            StoreBackend::Sqlite => Arc::new(SqliteStore::open(&path, session).await?),
        };
        debug!(backend = store.name(), session, "State store ready");
        Ok(store)
    }

    fn model_name(&self) -> String {
        self.config
            .providers
            .get(&self.config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    /// The model client every orchestrator for `session` shares.
    fn client(&self, session: &str) -> ModelClient {
        ModelClient::new(self.provider.clone(), self.model_name(), self.config.default_temperature)
            .with_max_tokens(self.config.default_max_tokens)
            .with_event_bus(self.event_bus.clone())
            .with_session_id(session)
    }

    /// A state agent for `session`. A store is attached only when state or
    /// history is tracked.
    pub async fn agent(&self, session: &str) -> Result<StateAgent> {
        let engine = &self.config.engine;
        let mut agent = StateAgent::from_client(self.client(session))
            .with_tools(self.tools.clone())
            .with_mode(engine.mode)
            .with_history(engine.track_history)
            .with_system_prompt(&engine.system_prompt)
            .with_max_iterations(engine.max_agent_iterations);
        if let Some(model) = &self.state_model {
            agent = agent.with_state_model(model.clone());
        }
        if self.state_model.is_some() || engine.track_history {
            agent = agent.with_store(self.store(session).await?);
        }
        Ok(agent)
    }

    pub async fn handler(&self, session: &str) -> Result<StateHandler> {
        let model = self
            .state_model
            .clone()
            .context("The state handler needs engine.state_model or engine.state_model_file")?;
        Ok(StateHandler::from_client(self.client(session), model)
            .with_tools(self.tools.clone())
            .with_history(self.config.engine.track_history)
            .with_store(self.store(session).await?))
    }
}

/// Mirror domain events into the debug log.
fn spawn_event_logger(event_bus: &EventBus) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match &*event {
                DomainEvent::ModelCalled { round, tokens_used, .. } => {
                    debug!(round = %round, tokens = ?tokens_used, "model called");
                }
                DomainEvent::ToolExecuted { tool_name, success, duration_ms, .. } => {
                    debug!(tool = %tool_name, success, duration_ms, "tool executed");
                }
                DomainEvent::StatePersisted { changed, .. } => {
                    debug!(?changed, "state persisted");
                }
                other => debug!(event = ?other, "event"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use statewright_agent::HandlerRole;
    use statewright_core::error::ProviderError;
    use statewright_core::message::Message;
    use statewright_core::provider::{ProviderRequest, ProviderResponse};
    use std::sync::Mutex;

    /// Replies with fixed text and keeps every request it receives.
    struct CapturingProvider {
        reply: String,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait::async_trait]
    impl Provider for CapturingProvider {
        fn name(&self) -> &str {
            "capturing"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            Ok(ProviderResponse {
                message: Message::assistant(self.reply.clone()),
                usage: None,
                model: "mock".into(),
            })
        }
    }

    fn runtime(reply: &str, state_model: Option<StateModel>) -> (Runtime, Arc<CapturingProvider>) {
        let provider = Arc::new(CapturingProvider {
            reply: reply.into(),
            requests: Mutex::new(Vec::new()),
        });
        let mut config = AppConfig::default();
        config.default_max_tokens = 321;
        config.store.backend = StoreBackend::Memory;
        let runtime = Runtime {
            config,
            provider: provider.clone(),
            tools: Arc::new(ToolRegistry::new()),
            state_model,
            event_bus: Arc::new(EventBus::default()),
        };
        (runtime, provider)
    }

    #[tokio::test]
    async fn agent_requests_carry_configured_max_tokens() {
        let (runtime, provider) = runtime("Hello.", None);
        let agent = runtime.agent("s1").await.unwrap();

        agent.process("hi").await.unwrap();

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, Some(321));
    }

    #[tokio::test]
    async fn handler_requests_carry_configured_max_tokens() {
        let model = StateModel::parse(r#"{"destination": "City"}"#).unwrap();
        let (runtime, provider) = runtime(r#"{"state": {"destination": "Oslo"}}"#, Some(model));
        let handler = runtime.handler("s1").await.unwrap();

        handler.handle(HandlerRole::System, "Destination is Oslo").await.unwrap();

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, Some(321));
    }
}
