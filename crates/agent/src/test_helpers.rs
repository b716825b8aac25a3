//! Shared test helpers for engine tests.

use async_trait::async_trait;
use serde_json::Value;
use statewright_core::error::{ProviderError, StoreError, ToolError};
use statewright_core::message::{Message, MessageToolCall};
use statewright_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use statewright_core::store::{StateStore, StoreOperation, StoreRequest};
use statewright_core::tool::{Tool, ToolResult};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider answering each call with the next text in `texts`.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| make_text_response(t)).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The prompt text (all messages joined) of call `index`.
    pub fn prompt(&self, index: usize) -> String {
        self.requests.lock().unwrap()[index]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();

        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                index,
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[index].clone())
    }
}

/// A provider that always fails.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with native tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut response = make_text_response(thought);
    response.message.tool_calls = tool_calls;
    response
}

pub fn make_tool_call(name: &str, args: Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A tool that always returns the same text and records its inputs.
pub struct StaticTool {
    name: String,
    output: String,
    pub calls: Mutex<Vec<Value>>,
}

impl StaticTool {
    pub fn text(name: &str, output: &str) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed answer"
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        self.calls.lock().unwrap().push(arguments);
        Ok(ToolResult::text(&self.output))
    }
}

/// A tool that always fails.
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: "service unavailable".into(),
        })
    }
}

/// A store that returns a fixed payload and records every `set`.
#[derive(Default)]
pub struct RecordingStore {
    payload: Mutex<Option<Value>>,
    pub writes: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn with_payload(payload: Value) -> Self {
        Self {
            payload: Mutex::new(Some(payload)),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    /// The last written state, parsed.
    pub fn last_written(&self) -> Option<Value> {
        self.writes
            .lock()
            .unwrap()
            .last()
            .map(|w| serde_json::from_str(w).unwrap())
    }
}

#[async_trait]
impl StateStore for RecordingStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn call(&self, request: StoreRequest) -> Result<Option<Value>, StoreError> {
        match request.operation {
            StoreOperation::Get => Ok(self.payload.lock().unwrap().clone()),
            StoreOperation::Set => {
                let parsed: Value = serde_json::from_str(&request.content)
                    .map_err(|e| StoreError::InvalidPayload(e.to_string()))?;
                *self.payload.lock().unwrap() = Some(parsed);
                self.writes.lock().unwrap().push(request.content);
                Ok(None)
            }
        }
    }
}
