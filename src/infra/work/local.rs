//! In-process work dispatcher.
//!
//! Runs each execution as a tokio task with a bounded number of concurrent
//! slots. The action describes how long the execution takes and what it
//! returns; it stands in for a remote worker fleet in tests and single-node
//! deployments.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::executor::{LaunchRequest, StatusStream, WorkDispatcher, WorkerStatus, WorkerStatusUpdate};
use crate::core::WorkError;

/// What a local execution does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalAction {
    /// Run time in milliseconds.
    pub sleep_ms: u64,
    /// Reported return code.
    pub return_code: i32,
    /// Reported status code.
    pub status_code: i32,
    /// Fail with this message instead of ending.
    pub fail: Option<String>,
}

/// Counters of a [`LocalWorkDispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalWorkStats {
    /// Executions currently running.
    pub running: usize,
    /// Executions accepted since start.
    pub accepted: u64,
    /// Launches refused for lack of capacity.
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    running: AtomicUsize,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

struct Slot(Arc<Counters>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Tokio backed dispatcher with a fixed number of slots.
pub struct LocalWorkDispatcher {
    name: String,
    capacity: usize,
    counters: Arc<Counters>,
}

impl LocalWorkDispatcher {
    /// Dispatcher with `capacity` concurrent executions.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Dispatcher with one slot per CPU.
    pub fn with_default_capacity(name: impl Into<String>) -> Self {
        Self::new(name, num_cpus::get())
    }

    /// Current counters.
    pub fn stats(&self) -> LocalWorkStats {
        LocalWorkStats {
            running: self.counters.running.load(Ordering::Acquire),
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    fn try_reserve(&self) -> Option<Slot> {
        let reserved = self
            .counters
            .running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.capacity).then_some(n + 1))
            .is_ok();
        reserved.then(|| Slot(Arc::clone(&self.counters)))
    }
}

fn update(request: &LaunchRequest, worker: &str, status: WorkerStatus) -> WorkerStatusUpdate {
    WorkerStatusUpdate {
        order_id: request.order_id.clone(),
        execution_id: request.execution_id.clone(),
        status,
        return_code: 0,
        status_code: 0,
        worker: worker.to_string(),
        message: None,
    }
}

#[async_trait]
impl WorkDispatcher for LocalWorkDispatcher {
    async fn launch(&self, request: LaunchRequest) -> Result<StatusStream, WorkError> {
        let action: LocalAction = if request.action.is_null() {
            LocalAction::default()
        } else {
            serde_json::from_value(request.action.clone()).map_err(|e| WorkError::Launch(e.to_string()))?
        };

        let (tx, rx) = mpsc::channel(8);
        let Some(slot) = self.try_reserve() else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(order_id = %request.order_id, worker = %self.name, "no free slot");
            // The receiver is returned below, so the buffered send cannot fail.
            let _ = tx.try_send(update(&request, &self.name, WorkerStatus::WorkerBusy));
            return Ok(rx);
        };
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);

        let worker = self.name.clone();
        tokio::spawn(async move {
            let _slot = slot;
            if tx.send(update(&request, &worker, WorkerStatus::Received)).await.is_err() {
                return;
            }
            let _ = tx.send(update(&request, &worker, WorkerStatus::Executing)).await;

            let finished = tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(action.sleep_ms)) => true,
                () = request.cancel.cancelled() => false,
            };

            let mut last = update(&request, &worker, WorkerStatus::Ended);
            if !finished {
                last.status = WorkerStatus::Failed;
                last.message = Some("cancelled".into());
            } else if let Some(message) = action.fail {
                last.status = WorkerStatus::Failed;
                last.message = Some(message);
            } else {
                last.return_code = action.return_code;
                last.status_code = action.status_code;
            }
            info!(order_id = %request.order_id, worker = %worker, status = %last.status, "local execution finished");
            let _ = tx.send(last).await;
        });
        Ok(rx)
    }
}
