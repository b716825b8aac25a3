//! The statewright orchestration engine.
//!
//! Each interaction follows the same shape:
//!
//! 1. **Load** the session state from the store
//! 2. **Ask** the model for an updated state (and tool requests) as JSON
//! 3. **Merge** the proposal into the state model's fields, keeping known
//!    values the model left null
//! 4. **Dispatch** requested tools and write their results into state
//! 5. **Reconcile** again with the tool results, then produce a reply
//! 6. **Persist** the state, but only when a field actually changed
//!
//! [`StateAgent`] runs this for conversational replies; [`StateHandler`]
//! applies user or system messages to state without replying.

pub mod batch;
pub mod changes;
pub mod dispatch;
pub mod handler;
pub mod history;
pub mod interaction;
pub mod loop_runner;
pub mod merge;
pub mod model_client;
pub mod orchestrator;
pub mod parse;
pub mod path;
pub mod prompt;
pub mod schema;

#[cfg(test)]
mod test_helpers;

pub use batch::{BatchItem, BatchRunner, InteractionRunner};
pub use changes::{ChangeSet, detect_changes};
pub use dispatch::{
    DeclaredFieldPolicy, FieldTargetPolicy, StepsFieldPolicy, ToolDispatcher,
    ToolInvocationRequest, ToolInvocationResult,
};
pub use handler::StateHandler;
pub use history::{HISTORY_KEY, HistoryEntry, SYSTEM_LAST_MESSAGE_KEY};
pub use interaction::{HandlerRole, InteractionRequest, InteractionResult};
pub use loop_runner::AgentLoop;
pub use merge::merge_state;
pub use model_client::ModelClient;
pub use orchestrator::StateAgent;
pub use parse::{Untrusted, parse_model_json, strip_code_fence};
pub use schema::{FieldSpec, StateModel};
