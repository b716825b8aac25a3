//! `statewright batch`: run a JSONL file of interactions in order.
//!
//! Each non-empty line is `{"message": "...", "role": "user" | "system"}`;
//! `role` is only read in handler mode.

use anyhow::{Context, Result};
use statewright_agent::{BatchRunner, InteractionRequest, InteractionRunner};
use std::path::Path;

use crate::runtime::{Runtime, load_config};

pub fn parse_requests(content: &str) -> Result<Vec<InteractionRequest>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid batch line {}", number + 1))
        })
        .collect()
}

pub async fn run(
    config_path: Option<&Path>,
    file: &Path,
    continue_on_fail: bool,
    use_handler: bool,
    session: &str,
) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let requests = parse_requests(&content)?;

    let runtime = Runtime::from_config(load_config(config_path)?)?;
    let runner: Box<dyn InteractionRunner> = if use_handler {
        Box::new(runtime.handler(session).await?)
    } else {
        Box::new(runtime.agent(session).await?)
    };

    let items = BatchRunner::new(runner.as_ref())
        .continue_on_fail(continue_on_fail)
        .run(&requests)
        .await?;
    super::print_json(&items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use statewright_agent::HandlerRole;

    #[test]
    fn parses_lines_and_skips_blanks() {
        let requests = parse_requests(
            "{\"message\": \"hi\"}\n\n{\"message\": \"reset\", \"role\": \"system\"}\n",
        )
        .unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].role, None);
        assert_eq!(requests[1].role, Some(HandlerRole::System));
    }

    #[test]
    fn reports_bad_line_number() {
        let err = parse_requests("{\"message\": \"ok\"}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
