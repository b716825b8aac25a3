//! Running several interactions in one invocation.

use async_trait::async_trait;
use serde::Serialize;
use statewright_core::error::{Error, Result};
use tracing::{info, warn};

use crate::handler::StateHandler;
use crate::interaction::{InteractionRequest, InteractionResult};
use crate::orchestrator::StateAgent;

/// Anything that can run one interaction.
#[async_trait]
pub trait InteractionRunner: Send + Sync {
    async fn run(&self, request: &InteractionRequest) -> Result<InteractionResult>;
}

#[async_trait]
impl InteractionRunner for StateAgent {
    async fn run(&self, request: &InteractionRequest) -> Result<InteractionResult> {
        self.process(&request.message).await
    }
}

#[async_trait]
impl InteractionRunner for StateHandler {
    async fn run(&self, request: &InteractionRequest) -> Result<InteractionResult> {
        self.handle(request.role.unwrap_or_default(), &request.message).await
    }
}

/// One batch entry's outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Completed(Box<InteractionResult>),
    Failed { index: usize, error: String },
}

impl BatchItem {
    pub fn is_failed(&self) -> bool {
        matches!(self, BatchItem::Failed { .. })
    }
}

/// Runs requests in order against one runner. Each interaction sees the
/// state persisted by the previous one.
pub struct BatchRunner<'a> {
    runner: &'a dyn InteractionRunner,
    continue_on_fail: bool,
}

impl<'a> BatchRunner<'a> {
    pub fn new(runner: &'a dyn InteractionRunner) -> Self {
        Self {
            runner,
            continue_on_fail: false,
        }
    }

    /// Record failures as items instead of aborting the batch.
    pub fn continue_on_fail(mut self, enabled: bool) -> Self {
        self.continue_on_fail = enabled;
        self
    }

    pub async fn run(&self, requests: &[InteractionRequest]) -> Result<Vec<BatchItem>> {
        let mut items = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            match self.runner.run(request).await {
                Ok(result) => items.push(BatchItem::Completed(Box::new(result))),
                Err(e) if self.continue_on_fail => {
                    warn!(index, error = %e, "Interaction failed, continuing batch");
                    items.push(BatchItem::Failed {
                        index,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(Error::Interaction {
                        index,
                        source: Box::new(e),
                    });
                }
            }
        }
        info!(
            total = items.len(),
            failed = items.iter().filter(|i| i.is_failed()).count(),
            "Batch complete"
        );
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialMockProvider;
    use std::sync::Arc;

    fn agent(texts: &[&str]) -> StateAgent {
        StateAgent::new(Arc::new(SequentialMockProvider::texts(texts)), "m", 0.2)
    }

    #[tokio::test]
    async fn runs_requests_in_order() {
        let agent = agent(&["one", "two"]);
        let items = BatchRunner::new(&agent)
            .run(&[InteractionRequest::new("a"), InteractionRequest::new("b")])
            .await
            .unwrap();
        let responses: Vec<_> = items
            .iter()
            .map(|item| match item {
                BatchItem::Completed(result) => result.response.clone().unwrap(),
                BatchItem::Failed { .. } => panic!("unexpected failure"),
            })
            .collect();
        assert_eq!(responses, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn failure_aborts_with_index() {
        let agent = agent(&["one"]);
        let err = BatchRunner::new(&agent)
            .run(&[InteractionRequest::new("a"), InteractionRequest::new("  ")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Interaction { index: 1, .. }));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn continue_on_fail_records_error_items() {
        let agent = agent(&["one", "three"]);
        let items = BatchRunner::new(&agent)
            .continue_on_fail(true)
            .run(&[
                InteractionRequest::new("a"),
                InteractionRequest::new(""),
                InteractionRequest::new("c"),
            ])
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[1], BatchItem::Failed { index: 1, .. }));
        let json = serde_json::to_value(&items[1]).unwrap();
        assert_eq!(json["index"], 1);
        assert!(json["error"].as_str().unwrap().contains("must not be empty"));
    }
}
