//! One model round: send prompt messages, get text back.

use statewright_core::error::Result;
use statewright_core::event::{DomainEvent, EventBus};
use statewright_core::message::Message;
use statewright_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use tracing::debug;

use crate::parse::{ModelTurn, parse_turn};

/// The model capability shared by every orchestrator.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    event_bus: Arc<EventBus>,
    session_id: String,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            event_bus: Arc::new(EventBus::default()),
            session_id: "default".into(),
        }
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send `messages` and return the reply text. `round` labels the call
    /// in logs and events.
    pub async fn generate(&self, round: &str, messages: Vec<Message>) -> Result<String> {
        debug!(round, model = %self.model, "Calling model");
        let mut request = ProviderRequest::text(&self.model, messages, self.temperature);
        request.max_tokens = self.max_tokens;

        let response = self.provider.complete(request).await?;

        self.event_bus.publish(DomainEvent::ModelCalled {
            session_id: self.session_id.clone(),
            round: round.to_string(),
            model: response.model.clone(),
            tokens_used: response.usage.as_ref().map(|u| u.total_tokens),
            timestamp: chrono::Utc::now(),
        });

        Ok(response.message.content)
    }

    /// Like [`generate`](Self::generate) but the reply must be JSON.
    pub async fn generate_turn(&self, round: &str, messages: Vec<Message>) -> Result<ModelTurn> {
        let text = self.generate(round, messages).await?;
        parse_turn(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialMockProvider;
    use statewright_core::error::Error;

    #[tokio::test]
    async fn generate_sends_settings_and_publishes_event() {
        let provider = Arc::new(SequentialMockProvider::texts(&["hello"]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let client = ModelClient::new(provider.clone(), "test-model", 0.1)
            .with_max_tokens(256)
            .with_event_bus(bus)
            .with_session_id("s1");

        let text = client.generate("reply", vec![Message::user("hi")]).await.unwrap();
        assert_eq!(text, "hello");

        let request = provider.request(0);
        assert_eq!(request.model, "test-model");
        assert_eq!(request.max_tokens, Some(256));
        assert!(request.tools.is_empty());

        let event = rx.recv().await.unwrap();
        match &*event {
            DomainEvent::ModelCalled { session_id, round, tokens_used, .. } => {
                assert_eq!(session_id, "s1");
                assert_eq!(round, "reply");
                assert_eq!(*tokens_used, Some(15));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn generate_turn_rejects_prose() {
        let provider = Arc::new(SequentialMockProvider::texts(&["I think the answer is yes."]));
        let client = ModelClient::new(provider, "m", 0.0);
        let err = client.generate_turn("state", vec![Message::user("q")]).await.unwrap_err();
        assert!(matches!(err, Error::MalformedModelOutput { .. }));
    }
}
