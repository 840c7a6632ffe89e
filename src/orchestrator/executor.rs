use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;

use crate::event::{ToolArgsObject, ToolCallSegment, ToolResultSegment, ARGS_PARSE_ERROR_KEY};
use crate::util::duration_millis;

/// A tool call handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub args: ToolArgsObject,
    pub server_label: Option<String>,
}

impl ToolInvocation {
    #[must_use]
    pub fn args_parse_error(&self) -> Option<&str> {
        self.args.get(ARGS_PARSE_ERROR_KEY).and_then(Value::as_str)
    }
}

impl From<&ToolCallSegment> for ToolInvocation {
    fn from(call: &ToolCallSegment) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.args.clone(),
            server_label: call.server_label.clone(),
        }
    }
}

/// Per-phase context shared by every call of one `EXECUTING_TOOLS` phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    pub conversation_id: String,
    pub iteration: u32,
}

/// Result of one tool call. A populated `error` is fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub id: String,
    pub output: Value,
    pub error: Option<String>,
}

impl ToolOutcome {
    #[must_use]
    pub fn ok(id: impl Into<String>, output: Value) -> Self {
        Self {
            id: id.into(),
            output,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            output: Value::Null,
            error: Some(error.into()),
        }
    }
}

impl From<ToolOutcome> for ToolResultSegment {
    fn from(outcome: ToolOutcome) -> Self {
        Self {
            id: outcome.id,
            output: outcome.output,
            error: outcome.error,
        }
    }
}

/// External tool executor. Must tolerate concurrent calls with distinct ids.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: ToolInvocation, context: &ToolContext) -> ToolOutcome;
}

/// Run every call concurrently, each bounded by `timeout`.
///
/// Outcomes come back in call order. Calls whose arguments carry the
/// parse-error marker are not executed; they resolve to an error outcome so
/// the model sees what went wrong.
pub async fn execute_all(
    executor: &dyn ToolExecutor,
    calls: Vec<ToolInvocation>,
    context: &ToolContext,
    timeout: Duration,
) -> Vec<ToolOutcome> {
    let runs = calls.into_iter().map(|call| run_one(executor, call, context, timeout));
    join_all(runs).await
}

async fn run_one(
    executor: &dyn ToolExecutor,
    call: ToolInvocation,
    context: &ToolContext,
    timeout: Duration,
) -> ToolOutcome {
    if let Some(message) = call.args_parse_error() {
        tracing::warn!(call_id = %call.id, tool = %call.name, error = %message, "skipping call with unparseable arguments");
        let error = format!("invalid tool arguments: {message}");
        return ToolOutcome::failed(call.id, error);
    }

    let id = call.id.clone();
    let name = call.name.clone();
    let started = Instant::now();
    match tokio::time::timeout(timeout, executor.execute(call, context)).await {
        Ok(mut outcome) => {
            if outcome.id != id {
                tracing::warn!(call_id = %id, returned = %outcome.id, "executor returned a mismatched id");
                outcome.id = id;
            }
            tracing::debug!(
                call_id = %outcome.id,
                tool = %name,
                elapsed_ms = duration_millis(started.elapsed()),
                failed = outcome.error.is_some(),
                "tool call finished"
            );
            outcome
        }
        Err(_) => {
            tracing::warn!(call_id = %id, tool = %name, timeout_ms = duration_millis(timeout), "tool call timed out");
            ToolOutcome::failed(id, format!("tool call timed out after {}ms", duration_millis(timeout)))
        }
    }
}
