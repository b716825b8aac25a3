//! The tool-calling loop used for plain replies when tools are connected.
//!
//! Without a state model the engine lets the model call tools natively:
//! send the conversation with tool definitions, run whatever it calls,
//! append the results, and repeat until it answers in text.

use statewright_core::error::Result;
use statewright_core::event::DomainEvent;
use statewright_core::message::Message;
use statewright_core::provider::ProviderRequest;
use statewright_core::tool::{ToolCall, ToolRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::model_client::ModelClient;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

pub struct AgentLoop {
    client: ModelClient,

    tools: Arc<ToolRegistry>,

    /// Maximum tool call iterations per turn
    max_iterations: u32,
}

impl AgentLoop {
    pub fn new(client: ModelClient, tools: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Set the maximum number of tool call iterations.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Run the loop over `messages` and return the final text.
    ///
    /// Assistant tool calls and tool results are appended to `messages`.
    pub async fn process(&self, messages: &mut Vec<Message>) -> Result<String> {
        info!(messages = messages.len(), tools = self.tools.len(), "Processing with tools");

        let tool_definitions = self.tools.definitions();
        let mut iteration = 0;

        loop {
            iteration += 1;
            if iteration > self.max_iterations {
                warn!(iterations = iteration - 1, "Max tool iterations reached, stopping");
                break;
            }
            debug!(iteration, "Agent loop iteration");

            let request = ProviderRequest {
                model: self.client.model().to_string(),
                messages: messages.clone(),
                temperature: self.client.temperature(),
                max_tokens: self.client.max_tokens(),
                tools: tool_definitions.clone(),
            };

            let response = self.client.provider().complete(request).await?;

            self.client.event_bus().publish(DomainEvent::ModelCalled {
                session_id: self.client.session_id().to_string(),
                round: format!("agent_loop_{iteration}"),
                model: response.model.clone(),
                tokens_used: response.usage.as_ref().map(|u| u.total_tokens),
                timestamp: chrono::Utc::now(),
            });

            if response.message.tool_calls.is_empty() {
                let text = response.message.content.clone();
                messages.push(response.message);
                return Ok(text);
            }

            debug!(tool_count = response.message.tool_calls.len(), "Executing tool calls");
            let tool_calls = response.message.tool_calls.clone();
            messages.push(response.message);

            for tc in &tool_calls {
                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: serde_json::from_str(&tc.arguments).unwrap_or_default(),
                };

                let start = std::time::Instant::now();
                let result = self.tools.execute(&call).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                let (success, content) = match result {
                    Ok(tool_result) => (tool_result.success, tool_result.output),
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, "Tool execution failed");
                        (false, format!("Error: {e}"))
                    }
                };

                self.client.event_bus().publish(DomainEvent::ToolExecuted {
                    tool_name: tc.name.clone(),
                    success,
                    duration_ms,
                    timestamp: chrono::Utc::now(),
                });

                messages.push(Message::tool_result(&tc.id, content));
            }
        }

        Ok("I've reached the maximum number of tool call iterations. Please provide further guidance.".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        SequentialMockProvider, StaticTool, make_text_response, make_tool_call,
        make_tool_call_response,
    };
    use serde_json::json;
    use statewright_core::message::Role;

    fn client(provider: Arc<SequentialMockProvider>) -> ModelClient {
        ModelClient::new(provider, "mock-model", 0.2)
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(SequentialMockProvider::texts(&["Hello! How can I help?"]));
        let agent = AgentLoop::new(client(provider.clone()), Arc::new(ToolRegistry::new()));

        let mut messages = vec![Message::system("Be kind."), Message::user("Hello!")];
        let response = agent.process(&mut messages).await.unwrap();

        assert_eq!(response, "Hello! How can I help?");
        assert_eq!(messages.len(), 3);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("Weather API", json!({"city": "Austin"}))], ""),
            make_text_response("It is 72F in Austin."),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StaticTool::text("Weather API", "72F")));
        let agent = AgentLoop::new(client(provider.clone()), Arc::new(registry));

        let mut messages = vec![Message::user("Weather in Austin?")];
        let response = agent.process(&mut messages).await.unwrap();

        assert_eq!(response, "It is 72F in Austin.");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.request(0).tools.len(), 1);
        let tool_message = messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_message.content, "72F");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_back() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("nope", json!({}))], ""),
            make_text_response("Sorry."),
        ]));
        let agent = AgentLoop::new(client(provider), Arc::new(ToolRegistry::new()));

        let mut messages = vec![Message::user("hi")];
        agent.process(&mut messages).await.unwrap();
        let tool_message = messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_message.content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn stops_at_max_iterations() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("Weather API", json!({}))], ""),
            make_tool_call_response(vec![make_tool_call("Weather API", json!({}))], ""),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StaticTool::text("Weather API", "72F")));
        let agent = AgentLoop::new(client(provider.clone()), Arc::new(registry)).with_max_iterations(2);

        let mut messages = vec![Message::user("loop")];
        let response = agent.process(&mut messages).await.unwrap();
        assert!(response.contains("maximum number of tool call iterations"));
        assert_eq!(provider.call_count(), 2);
    }
}
