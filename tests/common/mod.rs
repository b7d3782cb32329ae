//! Shared wiring for the pool integration tests.
//!
//! Builds the same component graph as the overseer builder, but over
//! in-memory stores and a [`LocalWorkDispatcher`] whose capacity the test
//! picks, so each scenario can drive cycles with an explicit clock.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use overseer::config::PoolConfig;
use overseer::core::definition::{DefinitionProvider, TaskDefinition, TaskSelector};
use overseer::core::events::{EventDispatcher, EventParticipant, RouteName};
use overseer::core::journal::{InMemoryJournal, JournalParticipant, TaskJournal};
use overseer::core::pool::{ActiveTaskPool, SequenceGenerator, TaskPoolManager, TaskState, TaskStore};
use overseer::core::resources::ResourceManager;
use overseer::core::WorkDispatcher;
use overseer::infra::{default_converters, InMemoryDefinitionProvider, LocalWorkDispatcher};
use overseer::runtime::TokioSpawner;
use overseer::util::TaskOrderId;

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub dispatcher: Arc<EventDispatcher>,
    pub resources: Arc<ResourceManager>,
    pub journal: Arc<InMemoryJournal>,
    pub work: Arc<LocalWorkDispatcher>,
    pub store: Arc<TaskStore>,
    pub pool: Arc<ActiveTaskPool>,
    pub definitions: Arc<InMemoryDefinitionProvider>,
    pub manager: Arc<TaskPoolManager>,
}

impl Harness {
    /// Harness with default pool settings and four worker slots.
    pub fn new() -> Self {
        Self::with(PoolConfig::default(), 4)
    }

    /// Harness with a custom pool configuration and worker capacity.
    pub fn with(config: PoolConfig, capacity: usize) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        let resources = Arc::new(ResourceManager::in_memory());
        for route in [
            RouteName::TicketCheck,
            RouteName::TicketAction,
            RouteName::FlagAcquire,
            RouteName::FlagRelease,
        ] {
            dispatcher.subscribe(route, Arc::clone(&resources) as Arc<dyn EventParticipant>);
        }
        let journal = Arc::new(InMemoryJournal::new(100));
        dispatcher.subscribe(
            RouteName::Journal,
            Arc::new(JournalParticipant::new(Arc::clone(&journal) as Arc<dyn TaskJournal>)),
        );

        let store = Arc::new(TaskStore::in_memory(config.shards));
        let work = Arc::new(LocalWorkDispatcher::new("local", capacity));
        let pool = ActiveTaskPool::new(
            config,
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            Arc::clone(&work) as Arc<dyn WorkDispatcher>,
            default_converters(),
            TokioSpawner::current().expect("tests run inside a tokio runtime"),
        );
        let definitions = Arc::new(InMemoryDefinitionProvider::new());
        let manager = Arc::new(TaskPoolManager::new(
            Arc::clone(&pool),
            Arc::clone(&definitions) as Arc<dyn DefinitionProvider>,
            Arc::new(SequenceGenerator::in_memory(0)),
        ));

        Self {
            dispatcher,
            resources,
            journal,
            work,
            store,
            pool,
            definitions,
            manager,
        }
    }

    /// Register a definition and order it for the current odate.
    pub fn order(&self, def: TaskDefinition) -> TaskOrderId {
        let selector = TaskSelector::new(def.group.clone(), def.name.clone());
        self.definitions.add(def).expect("valid definition");
        self.manager.order(&selector, None, "admin").expect("task ordered")
    }

    /// Journal messages of a task.
    pub fn messages(&self, id: &TaskOrderId) -> Vec<String> {
        self.journal.read_log(id).into_iter().map(|e| e.message).collect()
    }

    pub fn state(&self, id: &TaskOrderId) -> TaskState {
        self.pool.task(id).expect("task in pool").state()
    }

    pub fn waiting(&self, id: &TaskOrderId) -> String {
        self.pool.task(id).expect("task in pool").snapshot().waiting
    }

    /// Poll until the task reaches `state`.
    pub async fn wait_state(&self, id: &TaskOrderId, state: TaskState) {
        wait_until(&format!("{id} to reach {state}"), || self.state(id) == state).await;
    }

    /// Poll until the journal of a task contains `message`.
    pub async fn wait_message(&self, id: &TaskOrderId, message: &str) {
        wait_until(&format!("journal entry {message:?} for {id}"), || {
            self.messages(id).iter().any(|m| m == message)
        })
        .await;
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Poll a condition every 10ms for up to five seconds.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// A wall-clock time on the given date.
pub fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, minute, 0).expect("valid time")
}
