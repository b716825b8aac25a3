//! Prompt templates for every model round.
//!
//! Templates use `{name}` placeholders; literal braces are written `{{` and
//! `}}`. Values are substituted in a single pass, so braces inside a value
//! are never re-interpreted. Each builder returns the system and user
//! messages for one round.

use serde_json::{Map, Value};
use statewright_core::error::{Error, Result};
use statewright_core::message::Message;
use statewright_core::tool::ToolRegistry;

use crate::dispatch::ToolInvocationResult;
use crate::history::{HistoryEntry, render_history};
use crate::schema::StateModel;

/// A system/human template pair.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
    human: String,
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>, human: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            human: human.into(),
        }
    }

    /// Substitute variables and produce `[system, user]` messages.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<Vec<Message>> {
        Ok(vec![
            Message::system(render_template(&self.system, vars)?),
            Message::user(render_template(&self.human, vars)?),
        ])
    }
}

/// Double every brace so `text` renders literally inside a template.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Render one template string.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(Error::Internal(format!(
                                "unterminated placeholder '{{{name}' in prompt template"
                            )));
                        }
                    }
                }
                let value = vars
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| {
                        Error::Internal(format!("no value for prompt variable '{name}'"))
                    })?;
                out.push_str(value);
            }
            '}' => {
                return Err(Error::Internal(
                    "unmatched '}' in prompt template".into(),
                ));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Everything a stateful prompt can draw on.
pub struct PromptContext<'a> {
    pub model: &'a StateModel,
    pub state: &'a Map<String, Value>,
    pub history: Option<&'a [HistoryEntry]>,
    pub tools: &'a ToolRegistry,
    pub message: &'a str,
}

impl PromptContext<'_> {
    fn current_state(&self) -> String {
        pretty(&Value::Object(self.model.restrict(self.state)))
    }

    fn history_text(&self) -> String {
        render_history(self.history.unwrap_or(&[]))
    }

    fn state_example(&self) -> String {
        pretty(&Value::Object(self.model.skeleton()))
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

const FIELD_RULES: &str = "\
Rules for the state:
- Include every field listed above, using the same nesting.
- Set a field only when the conversation gives you the information.
- Use null for anything you do not know. Never invent values.
- Keep the exact field names listed above. Do not add fields that are not listed.
- Keep values you are not changing exactly as they are in the current state.";

fn state_system(intro: &str, ctx: &PromptContext<'_>, output_shape: &str) -> String {
    format!(
        "{intro}\n\n\
         State fields:\n{{field_descriptions}}\n\n\
         {FIELD_RULES}\n\n\
         Reply with a single JSON object and nothing else, shaped like:\n{}",
        escape_braces(&output_shape.replace("__STATE__", &ctx.state_example()))
    )
}

const STATEFUL_HUMAN: &str = "\
Current state:
{current_state}

Conversation so far:
{conversation_history}

New message:
{message}";

const TOOL_HUMAN: &str = "\
Current state:
{current_state}

Available tools:
{tool_catalog}

Conversation so far:
{conversation_history}

New message:
{message}";

const TOOL_LIST_SHAPE: &str = r#""tools_to_invoke": [
    {
      "tool_name": "exact name from the tool list",
      "reason": "why the tool is needed",
      "state_field": "field that should receive the result, or null",
      "input_params": {}
    }
  ]"#;

/// State extraction with an inline reply (single mode, no tools).
pub fn state_extraction(ctx: &PromptContext<'_>) -> Result<Vec<Message>> {
    let system = state_system(
        "You track structured state for a conversation and answer the user.",
        ctx,
        "{\n  \"state\": __STATE__,\n  \"response\": \"your reply to the user\"\n}",
    );
    let current_state = ctx.current_state();
    let history = ctx.history_text();
    PromptTemplate::new(system, STATEFUL_HUMAN).render(&[
        ("field_descriptions", &ctx.model.describe()),
        ("current_state", &current_state),
        ("conversation_history", &history),
        ("message", ctx.message),
    ])
}

/// State extraction plus tool selection.
pub fn state_and_tools(ctx: &PromptContext<'_>) -> Result<Vec<Message>> {
    let shape = format!("{{\n  \"state\": __STATE__,\n  {TOOL_LIST_SHAPE}\n}}");
    let system = state_system(
        "You track structured state for a conversation and decide which tools \
         must run to fill in missing information. Only pick tools from the list. \
         Return an empty tools_to_invoke array when no tool is needed.",
        ctx,
        &shape,
    );
    render_with_tools(system, ctx)
}

/// State extraction, tool selection, and fields to revisit after the tools ran.
pub fn state_tools_and_dependents(ctx: &PromptContext<'_>) -> Result<Vec<Message>> {
    let shape = format!(
        "{{\n  \"state\": __STATE__,\n  {TOOL_LIST_SHAPE},\n  \
         \"fields_requiring_post_analysis\": [\"fields whose value depends on tool results\"]\n}}"
    );
    let system = state_system(
        "You track structured state for a conversation and decide which tools \
         must run to fill in missing information. Only pick tools from the list. \
         List in fields_requiring_post_analysis the fields that can only be \
         decided once the tool results are known.",
        ctx,
        &shape,
    );
    render_with_tools(system, ctx)
}

fn render_with_tools(system: String, ctx: &PromptContext<'_>) -> Result<Vec<Message>> {
    let current_state = ctx.current_state();
    let history = ctx.history_text();
    let catalog = ctx.tools.catalog();
    PromptTemplate::new(system, TOOL_HUMAN).render(&[
        ("field_descriptions", &ctx.model.describe()),
        ("current_state", &current_state),
        ("tool_catalog", &catalog),
        ("conversation_history", &history),
        ("message", ctx.message),
    ])
}

const TOOL_RESULTS_HUMAN: &str = "\
State after the tools ran:
{current_state}

Tool results:
{tool_results}

Conversation so far:
{conversation_history}

New message:
{message}";

/// Reconcile the state with tool results, optionally also asking for the reply.
pub fn tool_reconciliation(
    ctx: &PromptContext<'_>,
    results: &[ToolInvocationResult],
    with_response: bool,
) -> Result<Vec<Message>> {
    let (intro, shape) = if with_response {
        (
            "Tools were run for this conversation. Update the state with what \
             their results tell you, then answer the user using the updated state.",
            "{\n  \"state\": __STATE__,\n  \"response\": \"your reply to the user\"\n}",
        )
    } else {
        (
            "Tools were run for this conversation. Update the state with what \
             their results tell you.",
            "{\n  \"state\": __STATE__\n}",
        )
    };
    let system = state_system(intro, ctx, shape);
    let current_state = ctx.current_state();
    let history = ctx.history_text();
    let tool_results = pretty(&serde_json::to_value(results)?);
    PromptTemplate::new(system, TOOL_RESULTS_HUMAN).render(&[
        ("field_descriptions", &ctx.model.describe()),
        ("current_state", &current_state),
        ("tool_results", &tool_results),
        ("conversation_history", &history),
        ("message", ctx.message),
    ])
}

/// Revisit only `fields` now that tool results are known.
pub fn dependent_fields_reconciliation(
    ctx: &PromptContext<'_>,
    results: &[ToolInvocationResult],
    fields: &[String],
) -> Result<Vec<Message>> {
    let mut example = Map::new();
    for path in fields {
        crate::path::set_path(&mut example, path, Value::Null);
    }
    let system = format!(
        "Tools were run for this conversation. Decide the values of these fields \
         using the tool results:\n{{field_descriptions}}\n\n\
         Use null when the results do not settle a field. Reply with a single \
         JSON object and nothing else, shaped like:\n{}",
        escape_braces(&pretty(&serde_json::json!({ "state": Value::Object(example) })))
    );
    let current_state = ctx.current_state();
    let history = ctx.history_text();
    let tool_results = pretty(&serde_json::to_value(results)?);
    PromptTemplate::new(system, TOOL_RESULTS_HUMAN).render(&[
        ("field_descriptions", &ctx.model.describe_only(fields)),
        ("current_state", &current_state),
        ("tool_results", &tool_results),
        ("conversation_history", &history),
        ("message", ctx.message),
    ])
}

const SYSTEM_UPDATE_HUMAN: &str = "\
Current state:
{current_state}

Instruction from the system:
{message}";

/// Apply a system-originated instruction to the state.
pub fn system_update(ctx: &PromptContext<'_>) -> Result<Vec<Message>> {
    let system = state_system(
        "You maintain structured state for a conversation. The message below \
         comes from the system, not the user: apply it to the state as an \
         authoritative update.",
        ctx,
        "{\n  \"state\": __STATE__\n}",
    );
    let current_state = ctx.current_state();
    PromptTemplate::new(system, SYSTEM_UPDATE_HUMAN).render(&[
        ("field_descriptions", &ctx.model.describe()),
        ("current_state", &current_state),
        ("message", ctx.message),
    ])
}

const RESPONSE_SYSTEM: &str = "\
You are a helpful assistant. Answer the user's latest message in plain text.
Use the known state below; do not ask for information it already holds.

Known state:
{current_state}";

const RESPONSE_HUMAN: &str = "\
Conversation so far:
{conversation_history}

New message:
{message}";

/// Generate the reply from the reconciled state.
pub fn response_from_state(ctx: &PromptContext<'_>) -> Result<Vec<Message>> {
    let current_state = ctx.current_state();
    let history = ctx.history_text();
    PromptTemplate::new(RESPONSE_SYSTEM, RESPONSE_HUMAN).render(&[
        ("current_state", &current_state),
        ("conversation_history", &history),
        ("message", ctx.message),
    ])
}

/// A plain reply with no state model. History is included when tracked.
pub fn plain_response(
    system_prompt: &str,
    history: Option<&[HistoryEntry]>,
    message: &str,
) -> Result<Vec<Message>> {
    let mut messages = vec![Message::system(system_prompt)];
    let human = match history {
        Some(entries) => render_template(
            RESPONSE_HUMAN,
            &[
                ("conversation_history", &render_history(entries)),
                ("message", message),
            ],
        )?,
        None => message.to_string(),
    };
    messages.push(Message::user(human));
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statewright_core::message::Role;

    #[test]
    fn renders_placeholders_and_escapes() {
        let out = render_template("{{\"a\": {value}}} and {name}", &[("value", "1"), ("name", "x")]).unwrap();
        assert_eq!(out, "{\"a\": 1} and x");
    }

    #[test]
    fn braces_in_values_are_literal() {
        let out = render_template("state: {state}", &[("state", "{\"k\": \"{v}\"}")]).unwrap();
        assert_eq!(out, "state: {\"k\": \"{v}\"}");
    }

    #[test]
    fn unknown_variable_is_an_error() {
        assert!(render_template("{missing}", &[]).is_err());
        assert!(render_template("{open", &[]).is_err());
        assert!(render_template("close}", &[]).is_err());
    }

    #[test]
    fn escape_round_trips_through_render() {
        let raw = "{\"nested\": {\"x\": null}}";
        assert_eq!(render_template(&escape_braces(raw), &[]).unwrap(), raw);
    }

    fn model() -> StateModel {
        StateModel::parse(r#"{"location": "Where the user is", "weather_info": "Current weather"}"#).unwrap()
    }

    #[test]
    fn extraction_prompt_carries_fields_state_and_message() {
        let model = model();
        let state = json!({"location": "Austin", "conversation_history": []});
        let tools = ToolRegistry::new();
        let ctx = PromptContext {
            model: &model,
            state: state.as_object().unwrap(),
            history: None,
            tools: &tools,
            message: "Is it raining?",
        };
        let messages = state_extraction(&ctx).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("- location: Where the user is"));
        assert!(messages[0].content.contains("\"response\""));
        assert!(messages[1].content.contains("\"Austin\""));
        assert!(messages[1].content.contains("No previous conversation."));
        assert!(messages[1].content.ends_with("Is it raining?"));
        assert!(!messages[1].content.contains("conversation_history"));
    }

    #[test]
    fn tool_prompt_lists_catalog() {
        let model = model();
        let state = Map::new();
        let tools = ToolRegistry::new();
        let ctx = PromptContext {
            model: &model,
            state: &state,
            history: Some(&[]),
            tools: &tools,
            message: "hi",
        };
        let messages = state_and_tools(&ctx).unwrap();
        assert!(messages[0].content.contains("tools_to_invoke"));
        assert!(messages[1].content.contains("No tools available"));
    }

    #[test]
    fn reconciliation_prompt_forbids_new_fields() {
        let model = model();
        let state = Map::new();
        let tools = ToolRegistry::new();
        let ctx = PromptContext {
            model: &model,
            state: &state,
            history: None,
            tools: &tools,
            message: "hi",
        };
        for with_response in [true, false] {
            let messages = tool_reconciliation(&ctx, &[], with_response).unwrap();
            assert!(messages[0].content.contains("Do not add fields that are not listed."));
            assert!(messages[0].content.contains("Keep the exact field names"));
            assert_eq!(messages[0].content.contains("\"response\""), with_response);
        }
    }

    #[test]
    fn dependent_prompt_names_only_requested_fields() {
        let model = model();
        let state = Map::new();
        let tools = ToolRegistry::new();
        let ctx = PromptContext {
            model: &model,
            state: &state,
            history: None,
            tools: &tools,
            message: "hi",
        };
        let messages =
            dependent_fields_reconciliation(&ctx, &[], &["weather_info".to_string()]).unwrap();
        assert!(messages[0].content.contains("- weather_info: Current weather"));
        assert!(!messages[0].content.contains("- location:"));
    }

    #[test]
    fn plain_response_includes_history_only_when_tracked() {
        let plain = plain_response("Be brief.", None, "hello").unwrap();
        assert_eq!(plain[0].content, "Be brief.");
        assert_eq!(plain[1].content, "hello");

        let with_history =
            plain_response("Be brief.", Some(&[HistoryEntry::user("earlier")]), "hello").unwrap();
        assert!(with_history[1].content.contains("user: earlier"));
    }
}
