//! Parsing model output.
//!
//! Models are asked for JSON but often wrap it in a markdown code fence.
//! The fence is stripped, the rest must parse as JSON, and the result is
//! kept as [`Untrusted`] until the merger has reconciled it with the model.

use serde_json::Value;
use statewright_core::error::{Error, Result};

use crate::dispatch::ToolInvocationRequest;

/// A JSON value produced by a model and not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Untrusted(Value);

impl Untrusted {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The member `key`, or null when absent or when this is not an object.
    pub fn field(&self, key: &str) -> Untrusted {
        Untrusted(self.0.get(key).cloned().unwrap_or(Value::Null))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

/// Remove a surrounding ```` ``` ```` fence, if any. Whatever info string
/// follows the opening fence (`json`, `JSON`, `jsonc`) is dropped with it.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match inner.split_once('\n') {
        Some((info, rest)) if !info.trim_start().starts_with(['{', '[']) => rest,
        Some(_) => inner,
        None => inner.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse model text as JSON after stripping a code fence.
pub fn parse_model_json(text: &str) -> Result<Untrusted> {
    let body = strip_code_fence(text);
    serde_json::from_str(body)
        .map(Untrusted)
        .map_err(|e| Error::MalformedModelOutput {
            message: format!("{e} in model output: {}", preview(body)),
        })
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}

/// The recognized parts of one structured model reply.
#[derive(Debug, Clone)]
pub struct ModelTurn {
    pub state: Untrusted,
    pub response: Option<String>,
    pub tools_to_invoke: Vec<ToolInvocationRequest>,
    pub post_analysis_fields: Vec<String>,
}

impl ModelTurn {
    /// Pick the known members out of a parsed reply. Unknown members are
    /// ignored and malformed ones are treated as absent.
    pub fn from_untrusted(reply: &Untrusted) -> Self {
        let response = match reply.as_value().get("response") {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        let tools_to_invoke = reply
            .as_value()
            .get("tools_to_invoke")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(ToolInvocationRequest::from_value).collect())
            .unwrap_or_default();

        let post_analysis_fields = reply
            .as_value()
            .get("fields_requiring_post_analysis")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            state: reply.field("state"),
            response,
            tools_to_invoke,
            post_analysis_fields,
        }
    }
}

/// Parse model text straight into a [`ModelTurn`].
pub fn parse_turn(text: &str) -> Result<ModelTurn> {
    parse_model_json(text).map(|reply| ModelTurn::from_untrusted(&reply))
}
