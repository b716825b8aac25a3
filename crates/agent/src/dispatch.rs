//! Tool dispatch: run the tools a model asked for and fold their results
//! into the working state.
//!
//! Requests run one at a time, in order. A request naming an unknown tool
//! is skipped. A failing tool is recorded and never aborts the interaction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use statewright_core::error::ToolError;
use statewright_core::event::{DomainEvent, EventBus};
use statewright_core::tool::ToolRegistry;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::changes::ChangeSet;
use crate::path::{get_path, same_value, set_path};
use crate::schema::StateModel;

/// A tool call proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub tool_name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub state_field: Option<String>,
    #[serde(default)]
    pub input_params: Value,
}

impl ToolInvocationRequest {
    /// Lenient conversion from a model-produced item. Items without a
    /// non-empty `tool_name` are rejected.
    pub fn from_value(item: &Value) -> Option<Self> {
        let tool_name = item.get("tool_name")?.as_str()?.trim();
        if tool_name.is_empty() {
            return None;
        }
        let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::trim);
        Some(Self {
            tool_name: tool_name.to_string(),
            reason: text("reason").unwrap_or_default().to_string(),
            state_field: text("state_field")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            input_params: match item.get("input_params") {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(params) => params.clone(),
            },
        })
    }
}

/// What happened when one tool ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub tool_name: String,
    pub state_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolInvocationResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Decides which state field receives a tool's result.
pub trait FieldTargetPolicy: Send + Sync {
    fn target_field(&self, request: &ToolInvocationRequest, model: &StateModel) -> Option<String>;
}

/// The declared `state_field`; failing that, `task_steps` when the tool
/// name or the stated reason mentions "steps" (any case).
#[derive(Debug, Clone, Copy, Default)]
pub struct StepsFieldPolicy;

pub const STEPS_FIELD: &str = "task_steps";

impl FieldTargetPolicy for StepsFieldPolicy {
    fn target_field(&self, request: &ToolInvocationRequest, _model: &StateModel) -> Option<String> {
        if let Some(field) = &request.state_field {
            return Some(field.clone());
        }
        let mentions_steps = |text: &str| text.to_lowercase().contains("steps");
        (mentions_steps(&request.tool_name) || mentions_steps(&request.reason))
            .then(|| STEPS_FIELD.to_string())
    }
}

/// Only the declared `state_field`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredFieldPolicy;

impl FieldTargetPolicy for DeclaredFieldPolicy {
    fn target_field(&self, request: &ToolInvocationRequest, _model: &StateModel) -> Option<String> {
        request.state_field.clone()
    }
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Registry names of tools that were actually invoked (success or failure).
    pub invoked: Vec<String>,
    pub results: Vec<ToolInvocationResult>,
}

impl DispatchOutcome {
    pub fn fired(&self) -> bool {
        !self.invoked.is_empty()
    }
}

pub struct ToolDispatcher<'a> {
    tools: &'a ToolRegistry,
    policy: &'a dyn FieldTargetPolicy,
    event_bus: Option<&'a EventBus>,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(tools: &'a ToolRegistry, policy: &'a dyn FieldTargetPolicy) -> Self {
        Self {
            tools,
            policy,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: &'a EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Run `requests` sequentially against the working `state`.
    ///
    /// A result is written to its target field only when the field is part
    /// of `model` and the value differs from what is there; the field is
    /// then added to `changes`.
    pub async fn dispatch(
        &self,
        requests: &[ToolInvocationRequest],
        model: &StateModel,
        state: &mut Map<String, Value>,
        changes: &mut ChangeSet,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for request in requests {
            let Some(tool) = self.tools.resolve(&request.tool_name) else {
                debug!(tool = %request.tool_name, "Requested tool is not connected, skipping");
                continue;
            };
            let tool_name = tool.name().to_string();
            let target = self.policy.target_field(request, model);

            info!(tool = %tool_name, reason = %request.reason, "Executing tool");
            let start = Instant::now();
            let executed = tool.execute(request.input_params.clone()).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let value = match executed {
                Ok(result) if result.success => Ok(normalize_tool_output(result.into_value())),
                Ok(result) => Err(ToolError::ExecutionFailed {
                    tool_name: tool_name.clone(),
                    reason: result.output,
                }),
                Err(e) => Err(e),
            };

            if let Some(bus) = self.event_bus {
                bus.publish(DomainEvent::ToolExecuted {
                    tool_name: tool_name.clone(),
                    success: value.is_ok(),
                    duration_ms,
                    timestamp: chrono::Utc::now(),
                });
            }
            outcome.invoked.push(tool_name.clone());

            match value {
                Ok(value) => {
                    if let Some(field) = target.as_deref().filter(|f| model.contains(f)) {
                        let unchanged = get_path(state, field).is_some_and(|old| same_value(old, &value));
                        if !unchanged {
                            set_path(state, field, value.clone());
                            changes.push(field);
                        }
                    }
                    outcome.results.push(ToolInvocationResult {
                        tool_name,
                        state_field: target,
                        result: Some(value),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(tool = %tool_name, error = %e, "Tool failed, continuing");
                    outcome.results.push(ToolInvocationResult {
                        tool_name,
                        state_field: target,
                        result: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        outcome
    }
}

/// Text that holds JSON becomes that JSON; anything else is kept as is.
pub fn normalize_tool_output(value: Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}
