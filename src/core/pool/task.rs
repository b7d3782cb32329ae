//! Active task entries and their state machine.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::calendar::calc_real_odate;
use crate::core::definition::{RunFrom, TaskDefinition};
use crate::core::events::CheckedTicket;
use crate::util::{ExecutionId, HourMinTime, Odate, TaskOrderId};

/// Primary state of an active task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Preconditions not met yet.
    Waiting,
    /// Preconditions met; waiting for flags and dispatch.
    Eligible,
    /// Handed to the worker layer.
    Starting,
    /// Worker reports the process running.
    Executing,
    /// Ended within the accepted return code.
    Ended,
    /// Ended above the accepted return code, failed or cancelled.
    Failed,
}

impl TaskState {
    /// True for `Ended` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }

    /// True while work is out on a worker.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Starting | Self::Executing)
    }

    /// Every edge the pool may take: the processing cycle, worker callbacks,
    /// user actions and restore. Rerun leaves both terminal states for
    /// `Waiting`, set OK turns `Failed` into `Ended`, a busy worker sends
    /// `Starting` back to `Eligible` and restore resets `Eligible` to
    /// `Waiting`.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Waiting => matches!(target, Self::Eligible),
            Self::Eligible => matches!(target, Self::Starting | Self::Waiting),
            Self::Starting => matches!(target, Self::Executing | Self::Eligible | Self::Ended | Self::Failed),
            Self::Executing => matches!(target, Self::Ended | Self::Failed),
            Self::Ended => matches!(target, Self::Waiting),
            Self::Failed => matches!(target, Self::Waiting | Self::Ended),
        }
    }

    /// Label used in listings and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Eligible => "Eligible",
            Self::Starting => "Starting",
            Self::Executing => "Executing",
            Self::Ended => "Ended OK",
            Self::Failed => "Ended Not OK",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One run of a task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExecution {
    /// Execution id.
    pub execution_id: ExecutionId,
    /// Worker that handled the run.
    #[serde(default)]
    pub worker: String,
    /// Start time.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// End time.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Return code reported by the worker.
    #[serde(default)]
    pub return_code: Option<i32>,
    /// Failure reason, if any.
    #[serde(default)]
    pub reason: Option<String>,
}

impl TaskExecution {
    fn fresh() -> Self {
        Self {
            execution_id: ExecutionId::new(),
            worker: String::new(),
            start: None,
            end: None,
            return_code: None,
            reason: None,
        }
    }
}

/// Mutable part of an active task, guarded by the entry's own lock.
#[derive(Debug, Clone)]
pub struct TaskRuntime {
    /// Primary state.
    pub state: TaskState,
    /// Held modifier.
    pub held: bool,
    /// Confirmed modifier; set at creation for tasks without confirmation.
    pub confirmed: bool,
    /// Next cycle skips the time window and ticket evaluation.
    pub enforced: bool,
    /// Number of started runs.
    pub run_number: u32,
    /// Executions, the last one being current.
    pub executions: Vec<TaskExecution>,
    /// Last ticket evaluation.
    pub tickets: Vec<CheckedTicket>,
    /// Earliest time of day of the next cyclic run.
    pub next_run: Option<HourMinTime>,
    /// Local date and minute of the next cyclic run. Intervals may cross
    /// midnight, so the time of day alone does not order runs.
    pub next_run_at: Option<NaiveDateTime>,
    /// Why the task is not progressing.
    pub waiting: String,
    /// Cancellation of the running execution.
    pub cancel: Option<CancellationToken>,
    /// Flags are held for the current execution.
    pub flags_held: bool,
}

impl TaskRuntime {
    /// Current execution.
    pub fn current(&self) -> &TaskExecution {
        // An entry always has at least one execution.
        &self.executions[self.executions.len() - 1]
    }

    /// Current execution, mutable.
    pub fn current_mut(&mut self) -> &mut TaskExecution {
        let last = self.executions.len() - 1;
        &mut self.executions[last]
    }

    /// Schedule the next cyclic run at minute precision.
    pub fn schedule_next_run(&mut self, at: &NaiveDateTime) {
        let next = HourMinTime::from_datetime(at);
        self.next_run = Some(next);
        self.next_run_at = Some(next.on(at.date()));
    }

    /// When the next cyclic run is due. Entries restored without a date fall
    /// back to the time of day on `today`.
    pub fn next_run_due(&self, today: NaiveDate) -> Option<NaiveDateTime> {
        self.next_run_at.or_else(|| self.next_run.map(|n| n.on(today)))
    }

    /// Move to `target`. Debug builds check the edge against
    /// [`TaskState::can_transition_to`].
    pub fn transition(&mut self, target: TaskState) {
        debug_assert!(
            self.state.can_transition_to(target),
            "illegal task transition {} -> {}",
            self.state,
            target
        );
        self.state = target;
    }

    /// Start a new execution record.
    pub fn new_execution(&mut self) {
        self.executions.push(TaskExecution::fresh());
    }
}

/// One instantiated task in the active pool.
pub struct ActiveTask {
    order_id: TaskOrderId,
    odate: Odate,
    definition: Arc<TaskDefinition>,
    runtime: RwLock<TaskRuntime>,
}

impl ActiveTask {
    /// New entry in `Waiting`. Cyclic tasks may run immediately.
    pub fn new(order_id: TaskOrderId, odate: Odate, definition: Arc<TaskDefinition>, now: &NaiveDateTime) -> Self {
        let mut runtime = TaskRuntime {
            state: TaskState::Waiting,
            held: false,
            confirmed: !definition.confirm,
            enforced: false,
            run_number: 0,
            executions: vec![TaskExecution::fresh()],
            tickets: Vec::new(),
            next_run: None,
            next_run_at: None,
            waiting: String::new(),
            cancel: None,
            flags_held: false,
        };
        if definition.cyclic.is_cyclic {
            runtime.schedule_next_run(now);
        }
        Self::from_parts(order_id, odate, definition, runtime)
    }

    pub(crate) fn from_parts(
        order_id: TaskOrderId,
        odate: Odate,
        definition: Arc<TaskDefinition>,
        mut runtime: TaskRuntime,
    ) -> Self {
        if runtime.executions.is_empty() {
            runtime.new_execution();
        }
        Self {
            order_id,
            odate,
            definition,
            runtime: RwLock::new(runtime),
        }
    }

    /// Order id.
    pub fn order_id(&self) -> &TaskOrderId {
        &self.order_id
    }

    /// Order date.
    pub fn odate(&self) -> &Odate {
        &self.odate
    }

    /// Definition the entry was created from.
    pub fn definition(&self) -> &Arc<TaskDefinition> {
        &self.definition
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        self.runtime.read().state
    }

    /// True if held.
    pub fn is_held(&self) -> bool {
        self.runtime.read().held
    }

    /// Copy of the runtime.
    pub fn snapshot(&self) -> TaskRuntime {
        self.runtime.read().clone()
    }

    /// Run a closure under the entry's write lock.
    pub fn with_runtime<R>(&self, f: impl FnOnce(&mut TaskRuntime) -> R) -> R {
        f(&mut self.runtime.write())
    }

    /// In-tickets resolved against the order date.
    pub fn resolve_tickets(&self) -> Vec<CheckedTicket> {
        self.definition
            .in_tickets
            .iter()
            .map(|t| CheckedTicket {
                name: t.name.clone(),
                odate: calc_real_odate(&self.odate, t.odate, &self.definition.schedule)
                    .map(String::from)
                    .unwrap_or_default(),
                fulfilled: false,
            })
            .collect()
    }

    /// Compute the next cyclic run. Returns false when the task should not
    /// run again.
    pub fn prepare_next_cycle(&self, runtime: &mut TaskRuntime) -> bool {
        let cyclic = &self.definition.cyclic;
        if !cyclic.is_cyclic || runtime.run_number >= cyclic.max_runs {
            return false;
        }
        let current = runtime.current();
        let base = match cyclic.run_from {
            RunFrom::Start => current.start,
            RunFrom::End | RunFrom::Schedule => current.end,
        };
        let Some(base) = base else {
            return false;
        };
        let next = base + chrono::Duration::minutes(i64::from(cyclic.interval_minutes));
        runtime.schedule_next_run(&next.with_timezone(&chrono::Local).naive_local());
        true
    }
}

impl fmt::Debug for ActiveTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveTask")
            .field("order_id", &self.order_id)
            .field("odate", &self.odate)
            .field("name", &self.definition.name)
            .field("group", &self.definition.group)
            .field("state", &self.state())
            .finish()
    }
}
