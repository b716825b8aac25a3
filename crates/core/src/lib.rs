//! # statewright core
//!
//! Domain types, capability traits, and error definitions for the statewright
//! state-orchestration engine. This crate performs **no I/O**: it defines the
//! contracts that the model adapters, tools, and state stores implement.
//!
//! ## Capabilities
//!
//! The engine consumes three external collaborators, each modelled as a trait:
//! - [`Provider`]: a language model that turns prompt messages into text
//! - [`Tool`]: an invocable external capability, resolved by name
//! - [`StateStore`]: durable get/set of one session's state object

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use store::{StateStore, StoreOperation, StoreRequest};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
