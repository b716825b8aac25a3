//! Tool implementations for statewright.
//!
//! The engine itself ships no concrete tools; deployments connect external
//! HTTP endpoints declared under `[[tools]]` in the configuration.

pub mod http_tool;

pub use http_tool::HttpTool;

use statewright_config::ToolConfig;
use statewright_core::tool::ToolRegistry;

/// Build a registry from the enabled `[[tools]]` entries, in config order.
pub fn build_registry(tools: &[ToolConfig]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for config in tools.iter().filter(|t| t.enabled) {
        registry.register(Box::new(HttpTool::new(config.clone())));
    }
    registry
}
