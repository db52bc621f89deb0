use std::sync::Arc;

use thiserror::Error;

use super::{ExecutionId, ExecutionIdAllocator, ExecutionStatus, Reporter, Topics};
use crate::channel::MessageChannel;
use crate::script::{CommandReference, ResolveError, ScriptResolver};
use crate::worker::{RunError, ScriptExecutor};

/// Anything that ends an execution as `Failed`.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Run(#[from] RunError),
}

/// Final state of one handled run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
}

/// Drives run requests from raw payload to terminal status.
///
/// For every request:
/// 1. allocate an execution id and publish `Starting`
/// 2. parse the payload into a [`CommandReference`]
/// 3. resolve it to a script (possibly fetching it)
/// 4. run it, streaming stdout to `log` and stderr to `error`
/// 5. publish `Succeeded`, or the error text followed by `Failed`
///
/// Exactly one terminal status is published and nothing is retried. Fetched
/// scripts are deleted once the run returns.
pub struct Orchestrator {
    channel: Arc<dyn MessageChannel>,
    topics: Topics,
    ids: ExecutionIdAllocator,
    resolver: ScriptResolver,
    executor: ScriptExecutor,
}

impl Orchestrator {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        topics: Topics,
        resolver: ScriptResolver,
        executor: ScriptExecutor,
    ) -> Self {
        Self {
            channel,
            topics,
            ids: ExecutionIdAllocator::new(),
            resolver,
            executor,
        }
    }

    /// Handle one run request. Never fails; the outcome is for the caller's
    /// diagnostics only.
    pub async fn handle(&self, payload: &[u8]) -> ExecutionOutcome {
        let execution_id = self.ids.allocate();
        let reporter = Reporter::new(
            self.channel.clone(),
            execution_id.clone(),
            self.topics.execution(&execution_id),
        );

        tracing::info!(
            execution_id = %execution_id,
            bytes = payload.len(),
            "Run request received"
        );

        reporter.status(ExecutionStatus::Starting).await;

        let status = match self.execute(&reporter, payload).await {
            Ok(()) => {
                tracing::info!(execution_id = %execution_id, "Execution succeeded");
                ExecutionStatus::Succeeded
            }
            Err(e) => {
                tracing::warn!(execution_id = %execution_id, error = %e, "Execution failed");
                reporter.error(e.to_string().as_bytes()).await;
                ExecutionStatus::Failed
            }
        };

        reporter.status(status).await;

        ExecutionOutcome {
            execution_id,
            status,
        }
    }

    async fn execute(&self, reporter: &Reporter, payload: &[u8]) -> Result<(), ExecutionError> {
        let reference = CommandReference::from_payload(payload)?;
        tracing::info!(
            execution_id = %reporter.execution_id(),
            reference = %reference,
            "Resolving command reference"
        );
        let script = self
            .resolver
            .resolve(&reference, reporter.execution_id())
            .await?;

        tracing::debug!(
            execution_id = %reporter.execution_id(),
            scheme = reference.scheme(),
            script = %script.path().display(),
            "Script resolved"
        );

        self.executor
            .run(script.path(), &reporter.stdout(), &reporter.stderr())
            .await?;

        Ok(())
    }
}
