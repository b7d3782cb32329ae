//! Per-task audit trail.
//!
//! Entries are appended per order id. [`CollectionJournal`] keeps recent
//! entries in memory and moves entries older than the sync interval into a
//! collection; [`InMemoryJournal`] is a bounded variant used in tests and
//! ephemeral setups.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::collection::{CollectionExt, DataCollection};
use crate::core::events::{DispatchedMessage, EventMessage, EventParticipant, EventResponse, RouteName};
use crate::core::{CollectionError, DispatchError};
use crate::util::{now_utc, TaskOrderId};

/// Journal events with their catalogue text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEvent {
    /// Task ordered by a user or the daily procedure.
    Ordered {
        /// Acting user.
        user: String,
        /// Order date.
        odate: String,
    },
    /// Task forced into the pool.
    Forced {
        /// Acting user.
        user: String,
        /// Order date.
        odate: String,
    },
    /// Task held.
    Held {
        /// Acting user.
        user: String,
    },
    /// Task freed.
    Freed {
        /// Acting user.
        user: String,
    },
    /// Task confirmed.
    Confirmed {
        /// Acting user.
        user: String,
    },
    /// Task rerun.
    Rerun {
        /// Acting user.
        user: String,
    },
    /// Task set to ended OK.
    SetOk {
        /// Acting user.
        user: String,
    },
    /// Task enforced.
    Enforced {
        /// Acting user.
        user: String,
    },
    /// Cancellation requested.
    Cancelled {
        /// Acting user.
        user: String,
    },
    /// Time window and tickets satisfied.
    PreconditionsOk,
    /// Execution started.
    Starting {
        /// Run number.
        run: u32,
        /// Worker name.
        worker: String,
    },
    /// Execution ended within the accepted return code.
    EndedOk {
        /// Return code.
        rc: i32,
        /// Status code.
        sc: i32,
    },
    /// Execution ended above the accepted return code.
    EndedNotOk {
        /// Return code.
        rc: i32,
        /// Status code.
        sc: i32,
    },
    /// Execution failed.
    Failed {
        /// Failure reason.
        reason: String,
    },
    /// Post-processing finished.
    PostProcessing,
}

impl fmt::Display for JournalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordered { user, odate } => write!(f, "TASK ORDERED, user:{user} ODATE:{odate}"),
            Self::Forced { user, odate } => write!(f, "TASK FORCED, user:{user} ODATE:{odate}"),
            Self::Held { user } => write!(f, "TASK HELD, user:{user}"),
            Self::Freed { user } => write!(f, "TASK FREED, user:{user}"),
            Self::Confirmed { user } => write!(f, "TASK CONFIRMED, user:{user}"),
            Self::Rerun { user } => write!(f, "TASK RERUN, user:{user}"),
            Self::SetOk { user } => write!(f, "TASK SETOK, user:{user}"),
            Self::Enforced { user } => write!(f, "TASK ENFORCED, user:{user}"),
            Self::Cancelled { user } => write!(f, "TASK CANCELLED, user:{user}"),
            Self::PreconditionsOk => f.write_str("TASK PRECONDITIONS OK"),
            Self::Starting { run, worker } => write!(f, "TASK STARTING, RN:{run} worker:{worker}"),
            Self::EndedOk { rc, sc } => write!(f, "ENDED OK, RC:{rc}, STATUS:{sc}"),
            Self::EndedNotOk { rc, sc } => write!(f, "ENDED NOT OK, RC:{rc}, STATUS:{sc}"),
            Self::Failed { reason } => write!(f, "TASK FAILED, reason:{reason}"),
            Self::PostProcessing => f.write_str("TASK POST PROCESSING ENDED"),
        }
    }
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Event time.
    pub time: DateTime<Utc>,
    /// Execution the entry belongs to.
    pub execution_id: String,
    /// Entry text.
    pub message: String,
}

/// Append-only audit trail keyed by order id.
pub trait TaskJournal: Send + Sync {
    /// Append an entry.
    fn write_log(&self, order_id: &TaskOrderId, entry: LogEntry);
    /// All entries for an order id in time order.
    fn read_log(&self, order_id: &TaskOrderId) -> Vec<LogEntry>;
}

/// Bounded in-memory journal. The oldest entries of an order id are dropped
/// once it holds `max_entries`.
pub struct InMemoryJournal {
    entries: Mutex<HashMap<TaskOrderId, VecDeque<LogEntry>>>,
    max_entries: usize,
}

impl InMemoryJournal {
    /// Journal keeping at most `max_entries` per order id.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }
}

impl TaskJournal for InMemoryJournal {
    fn write_log(&self, order_id: &TaskOrderId, entry: LogEntry) {
        let mut entries = self.entries.lock();
        let log = entries.entry(order_id.clone()).or_default();
        if log.len() >= self.max_entries {
            log.pop_front();
        }
        log.push_back(entry);
    }

    fn read_log(&self, order_id: &TaskOrderId) -> Vec<LogEntry> {
        self.entries
            .lock()
            .get(order_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Journal flushing aged entries to a collection, one document per order id.
pub struct CollectionJournal {
    pending: Mutex<HashMap<TaskOrderId, Vec<LogEntry>>>,
    collection: Arc<dyn DataCollection>,
    max_pending: usize,
}

impl CollectionJournal {
    /// Journal over a collection.
    pub fn new(collection: Arc<dyn DataCollection>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            collection,
            max_pending: usize::MAX,
        }
    }

    /// Bound the unflushed entries per order id; the oldest are dropped.
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    /// Move entries older than `age` at `now` into the collection. Entries
    /// that fail to persist are put back and retried on the next sync.
    pub fn sync(&self, now: DateTime<Utc>, age: Duration) -> Result<usize, CollectionError> {
        let cutoff = now - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());
        let aged: Vec<(TaskOrderId, Vec<LogEntry>)> = {
            let mut pending = self.pending.lock();
            let mut aged = Vec::new();
            for (id, log) in pending.iter_mut() {
                let split = log.partition_point(|e| e.time <= cutoff);
                if split > 0 {
                    aged.push((id.clone(), log.drain(..split).collect()));
                }
            }
            pending.retain(|_, log| !log.is_empty());
            aged
        };

        let mut written = 0;
        let mut failure = None;
        for (id, entries) in aged {
            match self.append(&id, &entries) {
                Ok(()) => written += entries.len(),
                Err(e) => {
                    let mut pending = self.pending.lock();
                    let log = pending.entry(id).or_default();
                    let mut restored = entries;
                    restored.append(log);
                    *log = restored;
                    failure = Some(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        if written > 0 {
            debug!(entries = written, "journal synced");
        }
        Ok(written)
    }

    fn append(&self, id: &TaskOrderId, entries: &[LogEntry]) -> Result<(), CollectionError> {
        let mut stored = self.stored(id)?;
        stored.extend_from_slice(entries);
        self.collection.put_as(id.as_str(), &stored)
    }

    fn stored(&self, id: &TaskOrderId) -> Result<Vec<LogEntry>, CollectionError> {
        match self.collection.get_as::<Vec<LogEntry>>(id.as_str()) {
            Ok(entries) => Ok(entries),
            Err(CollectionError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Spawn the periodic flush. On shutdown every pending entry is flushed.
    pub fn watch(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let journal = Arc::clone(self);
        tokio::spawn(async move {
            if !interval.is_zero() {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = journal.sync(now_utc(), interval) {
                                warn!(error = %e, "journal sync failed, retrying next tick");
                            }
                        }
                        () = shutdown.cancelled() => break,
                    }
                }
            } else {
                shutdown.cancelled().await;
            }
            if let Err(e) = journal.sync(now_utc(), Duration::ZERO) {
                warn!(error = %e, "final journal sync failed");
            }
            info!("journal watch stopped");
        })
    }
}

impl TaskJournal for CollectionJournal {
    fn write_log(&self, order_id: &TaskOrderId, entry: LogEntry) {
        let mut pending = self.pending.lock();
        let log = pending.entry(order_id.clone()).or_default();
        if log.len() >= self.max_pending {
            warn!(order_id = %order_id, "journal backlog full, dropping oldest entry");
            log.remove(0);
        }
        log.push(entry);
    }

    fn read_log(&self, order_id: &TaskOrderId) -> Vec<LogEntry> {
        let mut entries = self.stored(order_id).unwrap_or_else(|e| {
            warn!(order_id = %order_id, error = %e, "unable to read stored journal");
            Vec::new()
        });
        if let Some(pending) = self.pending.lock().get(order_id) {
            entries.extend_from_slice(pending);
        }
        entries.sort_by_key(|e| e.time);
        entries
    }
}

/// Subscribes a journal to the journal route.
pub struct JournalParticipant {
    journal: Arc<dyn TaskJournal>,
}

impl JournalParticipant {
    /// Wrap a journal.
    pub fn new(journal: Arc<dyn TaskJournal>) -> Self {
        Self { journal }
    }
}

impl EventParticipant for JournalParticipant {
    fn process(&self, route: RouteName, msg: &DispatchedMessage) -> Result<EventResponse, DispatchError> {
        match (&msg.message, route) {
            (EventMessage::Journal(entry), RouteName::Journal) => {
                self.journal.write_log(
                    &entry.order_id,
                    LogEntry {
                        time: entry.time,
                        execution_id: entry.execution_id.clone(),
                        message: entry.message.clone(),
                    },
                );
                Ok(EventResponse::Ack)
            }
            (EventMessage::Journal(_), _) => Err(DispatchError::UnrecognizedMessageFormat),
            _ => Err(DispatchError::InvalidRouteName(route)),
        }
    }
}
