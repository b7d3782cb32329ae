//! Sharded storage of active tasks with snapshot persistence.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::task::{ActiveTask, TaskExecution, TaskRuntime, TaskState};
use crate::core::collection::DataCollection;
use crate::core::definition::TaskDefinition;
use crate::core::events::CheckedTicket;
use crate::core::PoolError;
use crate::util::{HourMinTime, Odate, TaskOrderId};

/// Persisted form of an active task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTaskModel {
    /// Order id.
    pub order_id: TaskOrderId,
    /// Order date.
    pub odate: Odate,
    /// Definition snapshot taken at order time.
    pub definition: TaskDefinition,
    /// Primary state.
    pub state: TaskState,
    /// Held modifier.
    pub held: bool,
    /// Confirmed modifier.
    pub confirmed: bool,
    /// Started runs.
    pub run_number: u32,
    /// Executions.
    pub executions: Vec<TaskExecution>,
    /// Last ticket evaluation.
    #[serde(default)]
    pub tickets: Vec<CheckedTicket>,
    /// Next cyclic run.
    #[serde(default)]
    pub next_run: Option<HourMinTime>,
    /// Local date and time of the next cyclic run.
    #[serde(default)]
    pub next_run_at: Option<NaiveDateTime>,
    /// Waiting reason.
    #[serde(default)]
    pub waiting: String,
}

impl ActiveTaskModel {
    /// Capture an entry.
    pub fn from_task(task: &ActiveTask) -> Self {
        let rt = task.snapshot();
        Self {
            order_id: task.order_id().clone(),
            odate: task.odate().clone(),
            definition: task.definition().as_ref().clone(),
            state: rt.state,
            held: rt.held,
            confirmed: rt.confirmed,
            run_number: rt.run_number,
            executions: rt.executions,
            tickets: rt.tickets,
            next_run: rt.next_run,
            next_run_at: rt.next_run_at,
            waiting: rt.waiting,
        }
    }

    /// Rebuild an entry. Work that was out on a worker cannot be reattached
    /// and is marked failed.
    pub fn into_task(self) -> ActiveTask {
        let mut runtime = TaskRuntime {
            state: self.state,
            held: self.held,
            confirmed: self.confirmed,
            enforced: false,
            run_number: self.run_number,
            executions: self.executions,
            tickets: self.tickets,
            next_run: self.next_run,
            next_run_at: self.next_run_at,
            waiting: self.waiting,
            cancel: None,
            flags_held: false,
        };
        match runtime.state {
            TaskState::Eligible => runtime.transition(TaskState::Waiting),
            TaskState::Starting | TaskState::Executing => {
                runtime.transition(TaskState::Failed);
                if let Some(exec) = runtime.executions.last_mut() {
                    exec.reason = Some("interrupted by restart".into());
                }
            }
            _ => {}
        }
        ActiveTask::from_parts(self.order_id, self.odate, Arc::new(self.definition), runtime)
    }
}

type Shard = RwLock<HashMap<TaskOrderId, Arc<ActiveTask>>>;

/// Active tasks spread over independently locked shards.
pub struct TaskStore {
    shards: Vec<Shard>,
    collection: Option<Arc<dyn DataCollection>>,
}

impl TaskStore {
    /// Store without persistence.
    pub fn in_memory(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect(),
            collection: None,
        }
    }

    /// Store restored from a collection. Corrupt records are skipped.
    pub fn restore(shards: usize, collection: Arc<dyn DataCollection>) -> Result<Self, PoolError> {
        let mut store = Self::in_memory(shards);
        let docs = collection.all().map_err(|e| PoolError::Backend(e.to_string()))?;
        let mut restored = 0_usize;
        for (key, doc) in docs {
            match serde_json::from_value::<ActiveTaskModel>(doc) {
                Ok(model) => {
                    let task = Arc::new(model.into_task());
                    store.shard(task.order_id()).write().insert(task.order_id().clone(), task);
                    restored += 1;
                }
                Err(e) => warn!(key = %key, error = %e, "skipping corrupt active task record"),
            }
        }
        info!(tasks = restored, "active pool restored");
        store.collection = Some(collection);
        Ok(store)
    }

    fn shard(&self, id: &TaskOrderId) -> &Shard {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Insert; fails if the id is already present.
    pub fn insert(&self, task: Arc<ActiveTask>) -> Result<(), PoolError> {
        let mut shard = self.shard(task.order_id()).write();
        if shard.contains_key(task.order_id()) {
            return Err(PoolError::Validation(format!("duplicate order id: {}", task.order_id())));
        }
        shard.insert(task.order_id().clone(), task);
        Ok(())
    }

    /// Entry by id.
    pub fn get(&self, id: &TaskOrderId) -> Option<Arc<ActiveTask>> {
        self.shard(id).read().get(id).cloned()
    }

    /// Remove an entry.
    pub fn remove(&self, id: &TaskOrderId) -> Option<Arc<ActiveTask>> {
        self.shard(id).write().remove(id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Snapshot of all entries.
    pub fn all(&self) -> Vec<Arc<ActiveTask>> {
        self.shards
            .iter()
            .flat_map(|s| s.read().values().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Remove entries matching the predicate, shard by shard.
    pub fn remove_where(&self, mut pred: impl FnMut(&ActiveTask) -> bool) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.write();
            let before = shard.len();
            shard.retain(|_, task| !pred(task));
            removed += before - shard.len();
        }
        removed
    }

    /// Write a snapshot of every entry to the collection.
    pub fn sync(&self) -> Result<(), PoolError> {
        let Some(collection) = &self.collection else {
            return Ok(());
        };
        let started = Instant::now();
        let docs = self
            .all()
            .iter()
            .map(|task| {
                let model = ActiveTaskModel::from_task(task);
                serde_json::to_value(&model)
                    .map(|doc| (model.order_id.to_string(), doc))
                    .map_err(|e| PoolError::Backend(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let count = docs.len();
        collection
            .replace_all(docs)
            .map_err(|e| PoolError::Backend(e.to_string()))?;
        debug!(tasks = count, elapsed = ?started.elapsed(), "active pool synced");
        Ok(())
    }

    /// Spawn the periodic sync loop. A zero interval only syncs on shutdown.
    pub fn watch(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            if interval.is_zero() {
                shutdown.cancelled().await;
            } else {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = store.sync() {
                                warn!(error = %e, "active pool sync failed, retrying next tick");
                            }
                        }
                        () = shutdown.cancelled() => break,
                    }
                }
            }
            if let Err(e) = store.sync() {
                warn!(error = %e, "final active pool sync failed");
            }
            info!("active pool watch stopped");
        })
    }
}
