//! Wiring of every component from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{OverseerConfig, StoreKind};
use crate::core::collection::CollectionProvider;
use crate::core::definition::DefinitionProvider;
use crate::core::events::{EventDispatcher, EventParticipant, RouteName};
use crate::core::journal::{CollectionJournal, JournalParticipant, TaskJournal};
use crate::core::pool::{ActiveTaskPool, SequenceGenerator, TaskPoolManager, TaskStore};
use crate::core::resources::{CollectionReadWriter, FlagState, ResourceManager, ResourceStore, TicketResource};
use crate::core::{AppResult, ConverterRegistry, DailyExecutor, WorkDispatcher};
use crate::infra::collection::{FileCollectionProvider, InMemoryCollectionProvider};
use crate::infra::work::{default_converters, LocalWorkDispatcher};
use crate::runtime::{Ticker, TokioSpawner};
use crate::util::Odate;

/// Builds an [`Overseer`] from configuration and injected collaborators.
pub struct OverseerBuilder {
    config: OverseerConfig,
    definitions: Option<Arc<dyn DefinitionProvider>>,
    work: Option<Arc<dyn WorkDispatcher>>,
    converters: Option<ConverterRegistry>,
    collections: Option<Arc<dyn CollectionProvider>>,
}

impl OverseerBuilder {
    /// Builder over a configuration.
    pub fn new(config: OverseerConfig) -> Self {
        Self {
            config,
            definitions: None,
            work: None,
            converters: None,
            collections: None,
        }
    }

    /// Definition source. Required.
    #[must_use]
    pub fn with_definitions(mut self, definitions: Arc<dyn DefinitionProvider>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    /// Worker layer. Defaults to a [`LocalWorkDispatcher`].
    #[must_use]
    pub fn with_work_dispatcher(mut self, work: Arc<dyn WorkDispatcher>) -> Self {
        self.work = Some(work);
        self
    }

    /// Action converters. Defaults to [`default_converters`].
    #[must_use]
    pub fn with_converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = Some(converters);
        self
    }

    /// Collection source. Defaults to the backend selected in the configuration.
    #[must_use]
    pub fn with_collections(mut self, collections: Arc<dyn CollectionProvider>) -> Self {
        self.collections = Some(collections);
        self
    }

    fn collections(&self) -> AppResult<Arc<dyn CollectionProvider>> {
        if let Some(c) = &self.collections {
            return Ok(Arc::clone(c));
        }
        match (self.config.store.kind, &self.config.store.path) {
            (StoreKind::InMemory, _) => Ok(Arc::new(InMemoryCollectionProvider::new())),
            (StoreKind::File, Some(path)) => {
                std::fs::create_dir_all(path)
                    .with_context(|| format!("creating store directory {}", path.display()))?;
                Ok(Arc::new(FileCollectionProvider::new(path)))
            }
            (StoreKind::File, None) => anyhow::bail!("store.path is required for the file backend"),
        }
    }

    /// Load persisted state and wire the components. Must run inside a
    /// tokio runtime.
    pub fn build(self) -> AppResult<Overseer> {
        self.config.validate().map_err(anyhow::Error::msg).context("invalid configuration")?;
        let definitions = self
            .definitions
            .clone()
            .context("a definition provider is required")?;
        let collections = self.collections()?;
        let cfg = &self.config;

        let ticket_col = collections.collection(&cfg.resources.tickets.collection)?;
        let tickets = ResourceStore::with_persistence(
            cfg.resources.tickets.collection.clone(),
            Arc::new(CollectionReadWriter::<TicketResource>::new(ticket_col)),
        )
        .context("loading tickets")?;
        let flag_col = collections.collection(&cfg.resources.flags.collection)?;
        let flags = ResourceStore::with_persistence(
            cfg.resources.flags.collection.clone(),
            Arc::new(CollectionReadWriter::<FlagState>::new(flag_col)),
        )
        .context("loading flags")?;
        let resources = Arc::new(ResourceManager::new(tickets, flags));

        let journal = Arc::new(
            CollectionJournal::new(collections.collection(&cfg.journal.collection)?)
                .with_max_pending(cfg.journal.max_entries),
        );

        let dispatcher = Arc::new(EventDispatcher::new());
        for route in [
            RouteName::TicketCheck,
            RouteName::TicketAction,
            RouteName::FlagAcquire,
            RouteName::FlagRelease,
        ] {
            dispatcher.subscribe(route, Arc::clone(&resources) as Arc<dyn EventParticipant>);
        }
        let journal_dyn: Arc<dyn TaskJournal> = Arc::clone(&journal) as Arc<dyn TaskJournal>;
        dispatcher.subscribe(RouteName::Journal, Arc::new(JournalParticipant::new(journal_dyn)));

        let sequence = SequenceGenerator::load(collections.collection(&cfg.pool.sequence_collection)?)
            .context("loading order id sequence")?;
        let store = TaskStore::restore(cfg.pool.shards, collections.collection(&cfg.pool.collection)?)
            .context("restoring active pool")?;
        let spawner = TokioSpawner::current().context("the overseer must be built inside a tokio runtime")?;
        let work = self
            .work
            .clone()
            .unwrap_or_else(|| Arc::new(LocalWorkDispatcher::with_default_capacity("local")) as Arc<dyn WorkDispatcher>);
        let converters = self.converters.clone().unwrap_or_else(default_converters);

        let pool = ActiveTaskPool::new(
            cfg.pool.clone(),
            Arc::new(store),
            Arc::clone(&dispatcher),
            work,
            converters,
            spawner,
        );
        let manager = Arc::new(TaskPoolManager::new(Arc::clone(&pool), definitions, Arc::new(sequence)));
        let daily = Arc::new(DailyExecutor::new(
            Arc::clone(&manager),
            cfg.pool.new_day_proc,
            Odate::today(),
        ));

        // The daily procedure runs first so freshly ordered tasks join the same cycle.
        dispatcher.subscribe(RouteName::Tick, Arc::clone(&daily) as Arc<dyn EventParticipant>);
        dispatcher.subscribe(RouteName::Tick, Arc::clone(&pool) as Arc<dyn EventParticipant>);

        info!(tasks = pool.store().len(), odate = %pool.current_odate(), "overseer built");
        Ok(Overseer {
            config: self.config,
            dispatcher,
            resources,
            journal,
            pool,
            manager,
            daily,
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        })
    }
}

/// All scheduler components and their background loops.
pub struct Overseer {
    config: OverseerConfig,
    dispatcher: Arc<EventDispatcher>,
    resources: Arc<ResourceManager>,
    journal: Arc<CollectionJournal>,
    pool: Arc<ActiveTaskPool>,
    manager: Arc<TaskPoolManager>,
    daily: Arc<DailyExecutor>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Overseer {
    /// Event dispatcher.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Ticket and flag manager.
    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    /// Task journal.
    pub fn journal(&self) -> &Arc<CollectionJournal> {
        &self.journal
    }

    /// Active task pool.
    pub fn pool(&self) -> &Arc<ActiveTaskPool> {
        &self.pool
    }

    /// Task pool manager.
    pub fn manager(&self) -> &Arc<TaskPoolManager> {
        &self.manager
    }

    /// Daily executor.
    pub fn daily(&self) -> &Arc<DailyExecutor> {
        &self.daily
    }

    /// Spawn the sync loops and the ticker, then run the daily procedure if
    /// it is forced at startup.
    pub fn start(&self) {
        let cfg = &self.config;
        let secs = Duration::from_secs;
        let mut handles = self.handles.lock();
        handles.extend(self.resources.watch(
            secs(cfg.resources.tickets.sync_interval_secs),
            secs(cfg.resources.flags.sync_interval_secs),
            &self.shutdown,
        ));
        handles.push(self.pool.store().watch(secs(cfg.pool.sync_interval_secs), self.shutdown.clone()));
        handles.push(self.journal.watch(secs(cfg.journal.sync_interval_secs), self.shutdown.clone()));
        handles.push(
            Ticker::new(Arc::clone(&self.dispatcher), secs(cfg.time_interval_secs)).spawn(self.shutdown.clone()),
        );
        drop(handles);

        if cfg.pool.force_new_day_proc {
            let (deleted, ordered) = self.daily.daily_procedure(Odate::today());
            info!(deleted, ordered, "forced daily procedure at startup");
        }
        info!("overseer started");
    }

    /// Stop every loop, flush state and drop the dispatcher subscriptions.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background loop ended abnormally");
            }
        }
        self.dispatcher.unsubscribe_all();
        info!("overseer stopped");
    }
}
