//! Worker dispatch contract and action conversion.
//!
//! The pool hands a converted action to a [`WorkDispatcher`] and receives a
//! stream of [`WorkerStatusUpdate`]s correlated by order id and execution id.
//! Converters are resolved per [`TaskType`] through an explicit
//! [`ConverterRegistry`] built at startup.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::definition::{TaskDefinition, TaskType, Variable};
use crate::core::WorkError;
use crate::util::{ExecutionId, TaskOrderId};

/// Status reported by the worker layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// Work accepted.
    Received,
    /// Process is being started.
    Starting,
    /// Process is running.
    Executing,
    /// Process ended; the return code decides the outcome.
    Ended,
    /// Process could not run or was cancelled.
    Failed,
    /// Queued on the worker.
    Waiting,
    /// Worker has nothing to report.
    Idle,
    /// Worker has no capacity; the work was not accepted.
    WorkerBusy,
}

impl WorkerStatus {
    /// True for statuses ending an execution.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Received => "RECEIVED",
            Self::Starting => "STARTING",
            Self::Executing => "EXECUTING",
            Self::Ended => "ENDED",
            Self::Failed => "FAILED",
            Self::Waiting => "WAITING",
            Self::Idle => "IDLE",
            Self::WorkerBusy => "WORKER_BUSY",
        };
        f.write_str(label)
    }
}

/// One status update for an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatusUpdate {
    /// Task the update belongs to.
    pub order_id: TaskOrderId,
    /// Execution the update belongs to.
    pub execution_id: ExecutionId,
    /// Reported status.
    pub status: WorkerStatus,
    /// Process return code, meaningful with [`WorkerStatus::Ended`].
    pub return_code: i32,
    /// Worker specific status code.
    pub status_code: i32,
    /// Name of the worker handling the execution.
    pub worker: String,
    /// Optional diagnostic text.
    pub message: Option<String>,
}

/// Receiving end of an execution's status updates.
pub type StatusStream = mpsc::Receiver<WorkerStatusUpdate>;

/// Work handed to the worker layer.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Task order id.
    pub order_id: TaskOrderId,
    /// Execution id of this run.
    pub execution_id: ExecutionId,
    /// Task name.
    pub task_name: String,
    /// Work kind.
    pub task_type: TaskType,
    /// Converted action payload.
    pub action: Value,
    /// Execution variables.
    pub variables: Vec<Variable>,
    /// Cancelled when the user cancels the execution.
    pub cancel: CancellationToken,
}

/// Runtime abstraction for detached futures.
pub trait Spawn {
    /// Spawn a future that runs to completion on its own.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Hands work to workers and streams their status back.
#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    /// Start work. The stream ends after a terminal or busy update.
    async fn launch(&self, request: LaunchRequest) -> Result<StatusStream, WorkError>;
}

/// Turns a definition's action payload into the worker's action.
pub trait ActionConverter: Send + Sync {
    /// Convert with the execution variables available for substitution.
    fn convert(&self, definition: &TaskDefinition, variables: &[Variable]) -> Result<Value, WorkError>;
}

/// Converters keyed by task type.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<TaskType, Arc<dyn ActionConverter>>,
}

impl ConverterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter, replacing any previous one for the type.
    pub fn register(&mut self, task_type: TaskType, converter: Arc<dyn ActionConverter>) -> &mut Self {
        self.converters.insert(task_type, converter);
        self
    }

    /// True if a converter exists for the type.
    pub fn supports(&self, task_type: TaskType) -> bool {
        self.converters.contains_key(&task_type)
    }

    /// Convert a definition's action.
    pub fn convert(&self, definition: &TaskDefinition, variables: &[Variable]) -> Result<Value, WorkError> {
        self.converters
            .get(&definition.task_type)
            .ok_or_else(|| WorkError::NoConverter(definition.task_type.to_string()))?
            .convert(definition, variables)
    }
}
