//! The active task pool.
//!
//! The pool is the single writer of entry state. A processing cycle walks
//! every entry: `Waiting` entries go through the confirmation gate, the
//! cyclic schedule, the time window and a batched ticket check; `Eligible`
//! entries acquire their flags and are launched through the
//! [`WorkDispatcher`]. Status updates come back on a per-execution stream
//! consumed by a spawned forwarder.
//!
//! Every lock is per entry; the shards of the [`TaskStore`] are only held
//! while entries are looked up, inserted or removed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::calendar::{calc_real_odate, ended_ok, prepare_variables};
use super::store::TaskStore;
use super::task::{ActiveTask, TaskRuntime, TaskState};
use crate::config::PoolConfig;
use crate::core::definition::{SchedulingData, TicketRelation};
use crate::core::events::{
    CheckedTicket, DispatchedMessage, EventDispatcher, EventMessage, EventParticipant, EventResponse,
    FlagAcquireMsg, FlagReleaseMsg, FlagRequest, JournalMsg, RouteName, TicketActionItem, TicketActionMsg,
    TicketCheckMsg,
};
use crate::core::executor::{
    ConverterRegistry, LaunchRequest, Spawn, StatusStream, WorkDispatcher, WorkerStatus, WorkerStatusUpdate,
};
use crate::core::journal::JournalEvent;
use crate::core::resources::build_expr;
use crate::core::{DispatchError, PoolError};
use crate::runtime::TokioSpawner;
use crate::util::{now_utc, ExecutionId, HourMinTime, Odate, TaskOrderId};

/// Processing mode of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolMode {
    /// Cycles are processed.
    Active,
    /// Cycles are ignored; user actions still apply.
    Quiesce,
}

/// Listing row for an active task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    /// Order id.
    pub order_id: TaskOrderId,
    /// Definition group.
    pub group: String,
    /// Definition name.
    pub name: String,
    /// Order date.
    pub odate: Odate,
    /// State label.
    pub state: String,
    /// Held modifier.
    pub held: bool,
    /// Confirmed modifier.
    pub confirmed: bool,
    /// Started runs.
    pub run_number: u32,
    /// Why the task is not progressing.
    pub waiting: String,
}

impl TaskInfo {
    fn new(task: &ActiveTask, rt: &TaskRuntime) -> Self {
        Self {
            order_id: task.order_id().clone(),
            group: task.definition().group.clone(),
            name: task.definition().name.clone(),
            odate: task.odate().clone(),
            state: rt.state.as_label().to_string(),
            held: rt.held,
            confirmed: rt.confirmed,
            run_number: rt.run_number,
            waiting: rt.waiting.clone(),
        }
    }
}

/// Detailed view of an active task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDetail {
    /// Listing fields.
    #[serde(flatten)]
    pub info: TaskInfo,
    /// Definition description.
    pub description: String,
    /// Current execution id.
    pub execution_id: ExecutionId,
    /// Worker of the current execution.
    pub worker: String,
    /// Start of the current execution.
    pub start: Option<DateTime<Utc>>,
    /// End of the current execution.
    pub end: Option<DateTime<Utc>>,
    /// Return code of the current execution.
    pub return_code: Option<i32>,
    /// Failure reason of the current execution.
    pub reason: Option<String>,
    /// Next cyclic run.
    pub next_run: Option<HourMinTime>,
    /// Local date and time the next cyclic run is due.
    pub next_run_at: Option<NaiveDateTime>,
    /// In-tickets with live fulfillment.
    pub tickets: Vec<CheckedTicket>,
}

enum Outcome {
    Ended { ok: bool, rc: i32, sc: i32 },
    Failed(String),
}

/// The active task pool.
pub struct ActiveTaskPool {
    config: PoolConfig,
    store: Arc<TaskStore>,
    dispatcher: Arc<EventDispatcher>,
    work: Arc<dyn WorkDispatcher>,
    converters: ConverterRegistry,
    spawner: TokioSpawner,
    odate: RwLock<Odate>,
    active: AtomicBool,
    cycle_running: AtomicBool,
    me: Weak<Self>,
}

impl ActiveTaskPool {
    /// Create a pool over a task store. The current odate starts at today.
    pub fn new(
        config: PoolConfig,
        store: Arc<TaskStore>,
        dispatcher: Arc<EventDispatcher>,
        work: Arc<dyn WorkDispatcher>,
        converters: ConverterRegistry,
        spawner: TokioSpawner,
    ) -> Arc<Self> {
        let active = !config.start_quiesced;
        Arc::new_cyclic(|me| Self {
            config,
            store,
            dispatcher,
            work,
            converters,
            spawner,
            odate: RwLock::new(Odate::today()),
            active: AtomicBool::new(active),
            cycle_running: AtomicBool::new(false),
            me: me.clone(),
        })
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Order date new tasks are ordered with.
    pub fn current_odate(&self) -> Odate {
        self.odate.read().clone()
    }

    /// Move the pool to a new order date.
    pub fn set_current_odate(&self, odate: Odate) {
        info!(odate = %odate, "pool order date changed");
        *self.odate.write() = odate;
    }

    /// Current mode.
    pub fn mode(&self) -> PoolMode {
        if self.active.load(Ordering::Acquire) {
            PoolMode::Active
        } else {
            PoolMode::Quiesce
        }
    }

    /// Stop processing cycles.
    pub fn quiesce(&self) {
        self.active.store(false, Ordering::Release);
        info!("pool quiesced");
    }

    /// Resume processing cycles.
    pub fn resume(&self) {
        self.active.store(true, Ordering::Release);
        info!("pool resumed");
    }

    /// Add an entry.
    pub fn add(&self, task: ActiveTask) -> Result<Arc<ActiveTask>, PoolError> {
        let task = Arc::new(task);
        self.store.insert(Arc::clone(&task))?;
        Ok(task)
    }

    /// Entry by id.
    pub fn task(&self, id: &TaskOrderId) -> Result<Arc<ActiveTask>, PoolError> {
        self.store.get(id).ok_or_else(|| PoolError::UnableFindTask(id.clone()))
    }

    /// Journal an event for an entry's current execution.
    pub fn journal(&self, task: &ActiveTask, event: JournalEvent) {
        let execution_id = task.with_runtime(|rt| rt.current().execution_id.to_string());
        self.journal_execution(task, execution_id, event);
    }

    fn journal_execution(&self, task: &ActiveTask, execution_id: String, event: JournalEvent) {
        let msg = EventMessage::Journal(JournalMsg {
            order_id: task.order_id().clone(),
            execution_id,
            time: now_utc(),
            message: event.to_string(),
        });
        if let Err(e) = self.dispatcher.push_event(None, RouteName::Journal, msg) {
            debug!(order_id = %task.order_id(), error = %e, "journal entry dropped");
        }
    }

    /// Timer entry point. Spawns a cycle unless the pool is quiesced or the
    /// previous cycle is still running.
    pub fn process_time_event(&self, now: NaiveDateTime) {
        if !self.active.load(Ordering::Acquire) {
            debug!("pool quiesced, cycle skipped");
            return;
        }
        let Some(pool) = self.me.upgrade() else {
            return;
        };
        if self.cycle_running.swap(true, Ordering::AcqRel) {
            debug!("previous cycle still running");
            return;
        }
        self.spawner.spawn(async move {
            pool.run_cycle(now).await;
            pool.cycle_running.store(false, Ordering::Release);
        });
    }

    /// Process every entry once, regardless of the pool mode.
    pub async fn run_cycle(&self, now: NaiveDateTime) {
        let started = Instant::now();
        let tasks = self.store.all();
        let mut launched = 0_usize;
        for task in &tasks {
            if self.process_task(task, &now).await {
                launched += 1;
            }
        }
        debug!(tasks = tasks.len(), launched, elapsed = ?started.elapsed(), "cycle processed");
    }

    async fn process_task(&self, task: &Arc<ActiveTask>, now: &NaiveDateTime) -> bool {
        let (state, held) = task.with_runtime(|rt| (rt.state, rt.held));
        if held {
            return false;
        }
        match state {
            TaskState::Waiting => {
                if !self.check_preconditions(task, now) {
                    return false;
                }
            }
            TaskState::Eligible => {}
            _ => return false,
        }
        self.start(task).await
    }

    fn check_preconditions(&self, task: &ActiveTask, now: &NaiveDateTime) -> bool {
        let def = task.definition();
        let gate = task.with_runtime(|rt| {
            if !rt.confirmed {
                rt.waiting = "waiting for confirmation".into();
                return None;
            }
            Some((std::mem::take(&mut rt.enforced), rt.next_run_due(now.date())))
        });
        let Some((enforced, next_due)) = gate else {
            return false;
        };
        if enforced {
            return self.make_eligible(task, false);
        }

        if def.cyclic.is_cyclic {
            if let Some(due) = next_due {
                if due > *now {
                    let next = HourMinTime::from_datetime(&due);
                    let waiting = if due.date() == now.date() {
                        format!("next run at {next}")
                    } else {
                        format!("next run at {} {next}", due.date())
                    };
                    task.with_runtime(|rt| rt.waiting = waiting);
                    return false;
                }
            }
        }

        let window = time_window(&def.schedule, now);
        let resolved = task.resolve_tickets();
        let (fulfilled, tickets) = if resolved.is_empty() {
            (true, resolved)
        } else {
            match self.check_tickets(resolved) {
                Ok(tickets) => (relation_fulfilled(def.relation, &tickets), tickets),
                Err(e) => {
                    warn!(order_id = %task.order_id(), error = %e, "ticket check failed");
                    task.with_runtime(|rt| rt.waiting = format!("ticket check failed: {e}"));
                    return false;
                }
            }
        };

        let ready = task.with_runtime(|rt| {
            rt.tickets = tickets;
            match (&window, fulfilled) {
                (Err(reason), _) => {
                    rt.waiting.clone_from(reason);
                    false
                }
                (Ok(()), false) => {
                    rt.waiting = "waiting for tickets".into();
                    false
                }
                (Ok(()), true) => true,
            }
        });
        ready && self.make_eligible(task, true)
    }

    fn check_tickets(&self, tickets: Vec<CheckedTicket>) -> Result<Vec<CheckedTicket>, DispatchError> {
        match self.dispatcher.request(EventMessage::TicketCheck(TicketCheckMsg { tickets }))? {
            EventResponse::TicketCheck(msg) => Ok(msg.tickets),
            _ => Err(DispatchError::UnrecognizedMessageFormat),
        }
    }

    fn make_eligible(&self, task: &ActiveTask, journal: bool) -> bool {
        let execution_id = task.with_runtime(|rt| {
            if rt.held || rt.state != TaskState::Waiting {
                return None;
            }
            rt.transition(TaskState::Eligible);
            rt.waiting.clear();
            Some(rt.current().execution_id.to_string())
        });
        match execution_id {
            Some(execution_id) => {
                debug!(order_id = %task.order_id(), "task eligible");
                if journal {
                    self.journal_execution(task, execution_id, JournalEvent::PreconditionsOk);
                }
                true
            }
            None => false,
        }
    }

    async fn start(&self, task: &Arc<ActiveTask>) -> bool {
        let def = Arc::clone(task.definition());
        if !def.flags.is_empty() {
            let request = FlagAcquireMsg {
                flags: def
                    .flags
                    .iter()
                    .map(|f| FlagRequest {
                        name: f.name.clone(),
                        policy: f.policy,
                    })
                    .collect(),
            };
            let waiting = match self.dispatcher.request(EventMessage::FlagAcquire(request)) {
                Ok(EventResponse::Flags { success: true, .. }) => None,
                Ok(EventResponse::Flags { conflicts, .. }) => Some(format!("waiting for flags: {}", conflicts.join(", "))),
                Ok(_) => Some("flag acquisition failed: unexpected response".to_string()),
                Err(e) => Some(format!("flag acquisition failed: {e}")),
            };
            if let Some(waiting) = waiting {
                debug!(order_id = %task.order_id(), reason = %waiting, "flags not acquired");
                task.with_runtime(|rt| rt.waiting = waiting);
                return false;
            }
        }

        let has_flags = !def.flags.is_empty();
        let prepared = task.with_runtime(|rt| {
            if rt.held || rt.state != TaskState::Eligible {
                return None;
            }
            let token = CancellationToken::new();
            rt.transition(TaskState::Starting);
            rt.run_number += 1;
            rt.flags_held = has_flags;
            rt.cancel = Some(token.clone());
            rt.waiting.clear();
            let exec = rt.current_mut();
            exec.start = Some(now_utc());
            exec.end = None;
            exec.return_code = None;
            exec.reason = None;
            Some((exec.execution_id.clone(), rt.run_number, token))
        });
        let Some((execution_id, run_number, cancel)) = prepared else {
            if has_flags {
                self.release_flags(task);
            }
            return false;
        };

        let variables = prepare_variables(&def, task.order_id(), run_number, execution_id.as_str(), task.odate());
        let action = match self.converters.convert(&def, &variables) {
            Ok(action) => action,
            Err(e) => {
                warn!(order_id = %task.order_id(), error = %e, "action conversion failed");
                self.finish(task, Outcome::Failed(e.to_string()));
                return false;
            }
        };

        let request = LaunchRequest {
            order_id: task.order_id().clone(),
            execution_id: execution_id.clone(),
            task_name: def.name.clone(),
            task_type: def.task_type,
            action,
            variables,
            cancel,
        };
        match self.work.launch(request).await {
            Ok(stream) => {
                info!(order_id = %task.order_id(), execution_id = %execution_id, run = run_number, "task launched");
                self.forward(task.order_id().clone(), execution_id, stream);
                true
            }
            Err(e) => {
                warn!(order_id = %task.order_id(), error = %e, "launch failed");
                self.finish(task, Outcome::Failed(e.to_string()));
                false
            }
        }
    }

    fn forward(&self, order_id: TaskOrderId, execution_id: ExecutionId, mut stream: StatusStream) {
        let Some(pool) = self.me.upgrade() else {
            return;
        };
        self.spawner.spawn(async move {
            while let Some(update) = stream.recv().await {
                let last = update.status.is_terminal() || update.status == WorkerStatus::WorkerBusy;
                pool.handle_status(update);
                if last {
                    return;
                }
            }
            pool.stream_closed(&order_id, &execution_id);
        });
    }

    /// Apply a worker status update. Updates for other executions are ignored.
    pub fn handle_status(&self, update: WorkerStatusUpdate) {
        let Some(task) = self.store.get(&update.order_id) else {
            warn!(order_id = %update.order_id, "status update for unknown task");
            return;
        };
        let current = task.with_runtime(|rt| {
            let matches = rt.current().execution_id == update.execution_id;
            if matches && !update.worker.is_empty() {
                rt.current_mut().worker.clone_from(&update.worker);
            }
            matches
        });
        if !current {
            debug!(order_id = %update.order_id, execution_id = %update.execution_id, "stale status update");
            return;
        }

        match update.status {
            WorkerStatus::Received | WorkerStatus::Starting | WorkerStatus::Waiting | WorkerStatus::Idle => {
                debug!(order_id = %update.order_id, status = %update.status, "worker status");
            }
            WorkerStatus::Executing => self.on_executing(&task),
            WorkerStatus::WorkerBusy => self.on_worker_busy(&task),
            WorkerStatus::Ended => {
                let ok = ended_ok(
                    task.definition().task_type,
                    self.config.max_ok_return_code,
                    update.return_code,
                    update.status_code,
                );
                self.finish(
                    &task,
                    Outcome::Ended {
                        ok,
                        rc: update.return_code,
                        sc: update.status_code,
                    },
                );
            }
            WorkerStatus::Failed => {
                let cancelled = task.with_runtime(|rt| rt.cancel.as_ref().is_some_and(CancellationToken::is_cancelled));
                let reason = if cancelled {
                    "cancelled".to_string()
                } else {
                    update.message.unwrap_or_else(|| "worker failure".to_string())
                };
                self.finish(&task, Outcome::Failed(reason));
            }
        }
    }

    fn on_executing(&self, task: &ActiveTask) {
        let started = task.with_runtime(|rt| {
            if rt.state != TaskState::Starting {
                return None;
            }
            rt.transition(TaskState::Executing);
            let exec = rt.current();
            Some((exec.execution_id.to_string(), rt.run_number, exec.worker.clone()))
        });
        if let Some((execution_id, run, worker)) = started {
            info!(order_id = %task.order_id(), run, worker = %worker, "task executing");
            self.journal_execution(task, execution_id, JournalEvent::Starting { run, worker });
        }
    }

    fn on_worker_busy(&self, task: &ActiveTask) {
        let flags = task.with_runtime(|rt| {
            if rt.state != TaskState::Starting {
                return None;
            }
            rt.transition(TaskState::Eligible);
            rt.run_number = rt.run_number.saturating_sub(1);
            rt.cancel = None;
            rt.waiting = "worker busy".into();
            let exec = rt.current_mut();
            exec.start = None;
            exec.worker.clear();
            Some(std::mem::take(&mut rt.flags_held))
        });
        debug!(order_id = %task.order_id(), "worker busy, task back to eligible");
        if flags == Some(true) {
            self.release_flags(task);
        }
    }

    fn stream_closed(&self, order_id: &TaskOrderId, execution_id: &ExecutionId) {
        let Some(task) = self.store.get(order_id) else {
            return;
        };
        let running = task.with_runtime(|rt| rt.state.is_running() && rt.current().execution_id == *execution_id);
        if running {
            warn!(order_id = %order_id, "status stream closed before the execution ended");
            self.finish(&task, Outcome::Failed("worker stream closed".into()));
        }
    }

    fn finish(&self, task: &ActiveTask, outcome: Outcome) {
        let ok = matches!(outcome, Outcome::Ended { ok: true, .. });
        let done = task.with_runtime(|rt| {
            if !rt.state.is_running() {
                return None;
            }
            rt.transition(if ok { TaskState::Ended } else { TaskState::Failed });
            rt.cancel = None;
            let flags = std::mem::take(&mut rt.flags_held);
            let exec = rt.current_mut();
            exec.end = Some(now_utc());
            match &outcome {
                Outcome::Ended { rc, .. } => exec.return_code = Some(*rc),
                Outcome::Failed(reason) => exec.reason = Some(reason.clone()),
            }
            Some((exec.execution_id.to_string(), flags))
        });
        let Some((execution_id, flags)) = done else {
            debug!(order_id = %task.order_id(), "finish ignored, task not running");
            return;
        };

        let event = match outcome {
            Outcome::Ended { ok: true, rc, sc } => JournalEvent::EndedOk { rc, sc },
            Outcome::Ended { ok: false, rc, sc } => JournalEvent::EndedNotOk { rc, sc },
            Outcome::Failed(reason) => JournalEvent::Failed { reason },
        };
        info!(order_id = %task.order_id(), ok, "{event}");
        self.journal_execution(task, execution_id.clone(), event);
        if flags {
            self.release_flags(task);
        }
        self.post_process(task, execution_id, ok);
    }

    fn post_process(&self, task: &ActiveTask, execution_id: String, ok: bool) {
        let def = task.definition();
        if ok && !def.out_tickets.is_empty() {
            let tickets = def
                .out_tickets
                .iter()
                .map(|t| TicketActionItem {
                    name: t.name.clone(),
                    odate: calc_real_odate(task.odate(), t.odate, &def.schedule)
                        .map(String::from)
                        .unwrap_or_default(),
                    action: t.action,
                })
                .collect();
            let msg = EventMessage::TicketAction(TicketActionMsg { tickets });
            if let Err(e) = self.dispatcher.push_event(None, RouteName::TicketAction, msg) {
                warn!(order_id = %task.order_id(), error = %e, "out-ticket actions not delivered");
            }
        }
        self.journal_execution(task, execution_id, JournalEvent::PostProcessing);

        if ok {
            let next = task.with_runtime(|rt| {
                if rt.state != TaskState::Ended || !task.prepare_next_cycle(rt) {
                    return None;
                }
                rt.new_execution();
                rt.transition(TaskState::Waiting);
                rt.tickets.clear();
                rt.next_run
            });
            if let Some(next) = next {
                debug!(order_id = %task.order_id(), next_run = %next, "next cycle prepared");
            }
        }
    }

    fn release_flags(&self, task: &ActiveTask) {
        let names = task.definition().flags.iter().map(|f| f.name.clone()).collect();
        match self.dispatcher.request(EventMessage::FlagRelease(FlagReleaseMsg { names })) {
            Ok(EventResponse::Flags { success: true, .. }) => {}
            Ok(EventResponse::Flags { conflicts, .. }) => {
                warn!(order_id = %task.order_id(), conflicts = ?conflicts, "some flags were not released");
            }
            Ok(_) => warn!(order_id = %task.order_id(), "unexpected flag release response"),
            Err(e) => warn!(order_id = %task.order_id(), error = %e, "flag release failed"),
        }
    }

    fn modify(
        &self,
        id: &TaskOrderId,
        event: JournalEvent,
        f: impl FnOnce(&mut TaskRuntime) -> Result<(), PoolError>,
    ) -> Result<Arc<ActiveTask>, PoolError> {
        let task = self.task(id)?;
        task.with_runtime(f)?;
        self.journal(&task, event);
        Ok(task)
    }

    /// Set the held modifier.
    pub fn hold(&self, id: &TaskOrderId, user: &str) -> Result<(), PoolError> {
        self.modify(id, JournalEvent::Held { user: user.into() }, |rt| {
            if rt.held {
                return Err(PoolError::InvalidStatus("task already held".into()));
            }
            rt.held = true;
            Ok(())
        })
        .map(|_| ())
    }

    /// Clear the held modifier.
    pub fn free(&self, id: &TaskOrderId, user: &str) -> Result<(), PoolError> {
        self.modify(id, JournalEvent::Freed { user: user.into() }, |rt| {
            if !rt.held {
                return Err(PoolError::InvalidStatus("task is not held".into()));
            }
            rt.held = false;
            Ok(())
        })
        .map(|_| ())
    }

    /// Confirm a task waiting for confirmation.
    pub fn confirm(&self, id: &TaskOrderId, user: &str) -> Result<(), PoolError> {
        self.modify(id, JournalEvent::Confirmed { user: user.into() }, |rt| {
            if rt.confirmed {
                return Err(PoolError::InvalidStatus("task does not wait for confirmation".into()));
            }
            rt.confirmed = true;
            Ok(())
        })
        .map(|_| ())
    }

    /// Put an ended task back to `Waiting` with a fresh execution.
    pub fn rerun(&self, id: &TaskOrderId, user: &str) -> Result<(), PoolError> {
        let task = self.task(id)?;
        task.with_runtime(|rt| {
            if !rt.state.is_terminal() {
                return Err(PoolError::InvalidStatus(format!("task cannot be rerun in state {}", rt.state)));
            }
            rt.new_execution();
            rt.transition(TaskState::Waiting);
            rt.tickets.clear();
            rt.next_run = None;
            rt.next_run_at = None;
            rt.enforced = false;
            rt.waiting.clear();
            Ok(())
        })?;
        self.journal(&task, JournalEvent::Rerun { user: user.into() });
        Ok(())
    }

    /// Mark a failed task as ended OK.
    pub fn set_ok(&self, id: &TaskOrderId, user: &str) -> Result<(), PoolError> {
        self.modify(id, JournalEvent::SetOk { user: user.into() }, |rt| {
            if rt.state != TaskState::Failed {
                return Err(PoolError::InvalidStatus(format!("task cannot be set OK in state {}", rt.state)));
            }
            rt.transition(TaskState::Ended);
            Ok(())
        })
        .map(|_| ())
    }

    /// Skip the time window and ticket evaluation for the next cycle. An
    /// unconfirmed task still waits for confirmation.
    pub fn enforce(&self, id: &TaskOrderId, user: &str) -> Result<(), PoolError> {
        self.modify(id, JournalEvent::Enforced { user: user.into() }, |rt| {
            match rt.state {
                TaskState::Waiting if rt.confirmed => {
                    rt.transition(TaskState::Eligible);
                    rt.waiting.clear();
                }
                TaskState::Waiting => rt.enforced = true,
                TaskState::Eligible => {}
                other => return Err(PoolError::InvalidStatus(format!("task cannot be enforced in state {other}"))),
            }
            Ok(())
        })
        .map(|_| ())
    }

    /// Cancel the running execution. The task fails once the worker
    /// acknowledges.
    pub fn cancel(&self, id: &TaskOrderId, user: &str) -> Result<(), PoolError> {
        self.modify(id, JournalEvent::Cancelled { user: user.into() }, |rt| {
            match (&rt.cancel, rt.state.is_running()) {
                (Some(token), true) => {
                    token.cancel();
                    Ok(())
                }
                _ => Err(PoolError::InvalidStatus("task is not executing".into())),
            }
        })
        .map(|_| ())
    }

    /// Remove terminal entries past their retention. Returns the number removed.
    pub fn cleanup(&self, today: &Odate) -> usize {
        let default_days = self.config.retention_days;
        let removed = self.store.remove_where(|task| {
            let days = task.definition().retention_days.unwrap_or(default_days);
            task.state().is_terminal() && task.odate().add_days(i64::from(days)).is_before(today)
        });
        info!(removed, odate = %today, "pool cleanup finished");
        removed
    }

    /// Entries whose name matches the wildcard, sorted by order id.
    pub fn list(&self, filter: &str) -> Result<Vec<TaskInfo>, PoolError> {
        let expr = build_expr(filter).map_err(|e| PoolError::Validation(e.to_string()))?;
        let mut rows: Vec<TaskInfo> = self
            .store
            .all()
            .iter()
            .filter(|task| expr.is_match(&task.definition().name))
            .map(|task| TaskInfo::new(task, &task.snapshot()))
            .collect();
        rows.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        Ok(rows)
    }

    /// Detail of one entry with live ticket fulfillment.
    pub fn detail(&self, id: &TaskOrderId) -> Result<TaskDetail, PoolError> {
        let task = self.task(id)?;
        let rt = task.snapshot();
        let resolved = task.resolve_tickets();
        let tickets = if resolved.is_empty() {
            resolved
        } else {
            self.check_tickets(resolved.clone()).unwrap_or_else(|e| {
                warn!(order_id = %id, error = %e, "live ticket check failed");
                resolved
            })
        };
        let exec = rt.current().clone();
        Ok(TaskDetail {
            info: TaskInfo::new(&task, &rt),
            description: task.definition().description.clone(),
            execution_id: exec.execution_id,
            worker: exec.worker,
            start: exec.start,
            end: exec.end,
            return_code: exec.return_code,
            reason: exec.reason,
            next_run: rt.next_run,
            next_run_at: rt.next_run_at,
            tickets,
        })
    }
}

impl EventParticipant for ActiveTaskPool {
    fn process(&self, route: RouteName, msg: &DispatchedMessage) -> Result<EventResponse, DispatchError> {
        match (route, &msg.message) {
            (RouteName::Tick, EventMessage::Tick(tick)) => {
                self.process_time_event(tick.time);
                Ok(EventResponse::Ack)
            }
            (RouteName::Tick, _) => Err(DispatchError::UnrecognizedMessageFormat),
            (other, _) => Err(DispatchError::InvalidRouteName(other)),
        }
    }
}

/// Check the `from`/`to` window of a schedule. `to` is exclusive.
fn time_window(schedule: &SchedulingData, now: &NaiveDateTime) -> Result<(), String> {
    if let Some(from) = schedule.from {
        if *now < from.on(now.date()) {
            return Err(format!("waiting for time window, from {from}"));
        }
    }
    if let Some(to) = schedule.to {
        if *now >= to.on(now.date()) {
            return Err(format!("time window closed at {to}"));
        }
    }
    Ok(())
}

fn relation_fulfilled(relation: TicketRelation, tickets: &[CheckedTicket]) -> bool {
    match relation {
        TicketRelation::And => tickets.iter().all(|t| t.fulfilled),
        TicketRelation::Or => tickets.iter().any(|t| t.fulfilled),
    }
}
