//! Tests for tokio spawner utilities, the ticker and the service API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use overseer::builders::OverseerBuilder;
use overseer::config::OverseerConfig;
use overseer::core::definition::TaskDefinition;
use overseer::core::events::{DispatchedMessage, EventDispatcher, EventParticipant, EventResponse, RouteName};
use overseer::core::pool::PoolMode;
use overseer::core::resources::{FlagPolicy, ResourceManager};
use overseer::core::{DispatchError, PoolError, Spawn};
use overseer::infra::InMemoryDefinitionProvider;
use overseer::runtime::api;
use overseer::runtime::{ActionResponse, TaskActionKind, Ticker, TokioSpawner};
use overseer::util::now_local;
use tokio_util::sync::CancellationToken;

struct TickCounter(AtomicUsize);

impl EventParticipant for TickCounter {
    fn process(&self, _route: RouteName, _msg: &DispatchedMessage) -> Result<EventResponse, DispatchError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(EventResponse::Ack)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn_many() {
    let spawner = TokioSpawner::current().expect("inside runtime");

    let receivers: Vec<_> = (0..8)
        .map(|i| {
            let (tx, rx) = tokio::sync::oneshot::channel();
            spawner.spawn(async move {
                tx.send(i * 2).unwrap();
            });
            rx
        })
        .collect();

    let results: Vec<i32> = futures::future::join_all(receivers)
        .await
        .into_iter()
        .map(|r| r.expect("oneshot result"))
        .collect();
    assert_eq!(results, (0..8).map(|i| i * 2).collect::<Vec<_>>());
}

#[test]
fn test_tokio_spawner_current_outside_runtime() {
    assert!(TokioSpawner::current().is_err());
}

#[test]
fn test_ticker_tick_reaches_participants() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let counter = Arc::new(TickCounter(AtomicUsize::new(0)));
    dispatcher.subscribe(RouteName::Tick, counter.clone());

    let ticker = Ticker::new(Arc::clone(&dispatcher), Duration::ZERO);
    ticker.tick(now_local());
    ticker.tick(now_local());
    assert_eq!(counter.0.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ticker_loop_stops_on_shutdown() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let counter = Arc::new(TickCounter(AtomicUsize::new(0)));
    dispatcher.subscribe(RouteName::Tick, counter.clone());

    let shutdown = CancellationToken::new();
    let handle = Ticker::new(Arc::clone(&dispatcher), Duration::from_millis(10)).spawn(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    handle.await.unwrap();

    let ticks = counter.0.load(Ordering::SeqCst);
    assert!(ticks >= 2, "only {ticks} ticks");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(counter.0.load(Ordering::SeqCst), ticks);
}

#[test]
fn test_action_response_from_result() {
    let ok: ActionResponse = Ok::<_, PoolError>("Task A0001 held".to_string()).into();
    assert!(ok.success);
    assert_eq!(ok.message, "Task A0001 held");

    let failed: ActionResponse = Err::<String, _>(PoolError::InvalidStatus("task already held".into())).into();
    assert!(!failed.success);
    assert_eq!(failed.message, "invalid status: task already held");
    assert_eq!(serde_json::to_value(&failed).unwrap()["success"], false);
}

#[test]
fn test_resource_api() {
    let rm = ResourceManager::in_memory();
    assert!(api::add_ticket(&rm, "T1", "20200909").success);
    let dup = api::add_ticket(&rm, "T1", "20200909");
    assert!(!dup.success);
    assert_eq!(dup.message, "ticket with given name and odate already exists");
    assert_eq!(api::list_tickets(&rm, "T", "").len(), 1);
    assert!(api::delete_ticket(&rm, "T1", "20200909").success);
    assert!(!api::delete_ticket(&rm, "T1", "20200909").success);

    assert!(api::set_flag(&rm, "F1", FlagPolicy::Shared).success);
    assert!(!api::set_flag(&rm, "F1", FlagPolicy::Exclusive).success);
    assert_eq!(api::list_flags(&rm, "F")[0].count, 1);
    assert!(api::unset_flag(&rm, "F1").success);
    assert!(api::list_flags(&rm, "").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_task_api() {
    let mut confirm = TaskDefinition::new("BATCH", "CONFIRM_ME");
    confirm.confirm = true;
    let defs = InMemoryDefinitionProvider::from_definitions([TaskDefinition::new("BATCH", "LOAD"), confirm]).unwrap();
    let overseer = OverseerBuilder::new(OverseerConfig::default())
        .with_definitions(Arc::new(defs))
        .build()
        .unwrap();
    let manager = overseer.manager();

    let ordered = api::order_group(manager, "BATCH", None, "admin");
    assert!(ordered.success);
    assert_eq!(ordered.order_ids.len(), 2);
    assert_eq!(ordered.message, "2 task(s) ordered");

    let bad = api::order_task(manager, "BATCH", "LOAD", Some("2020-09-09"), false, "admin");
    assert!(!bad.success);
    let missing = api::order_task(manager, "BATCH", "NOPE", None, false, "admin");
    assert!(!missing.success);
    let forced = api::order_task(manager, "BATCH", "LOAD", Some("20000101"), true, "admin");
    assert!(forced.success, "{}", forced.message);

    let listing = api::list_tasks(overseer.pool(), "CONFIRM*").unwrap();
    assert_eq!(listing.mode, PoolMode::Active);
    assert_eq!(listing.tasks.len(), 1);
    let confirm_id = listing.tasks[0].order_id.clone();
    assert!(!listing.tasks[0].confirmed);

    let held = api::task_action(manager, TaskActionKind::Hold, confirm_id.as_str(), "admin");
    assert!(held.success);
    assert_eq!(held.message, format!("Task {confirm_id} held"));
    assert!(!api::task_action(manager, TaskActionKind::Hold, confirm_id.as_str(), "admin").success);
    assert!(api::task_action(manager, TaskActionKind::Free, confirm_id.as_str(), "admin").success);
    assert!(api::task_action(manager, TaskActionKind::Confirm, confirm_id.as_str(), "admin").success);
    assert!(!api::task_action(manager, TaskActionKind::Confirm, confirm_id.as_str(), "admin").success);

    let unknown = api::task_action(manager, TaskActionKind::Hold, "ZZZZZ", "admin");
    assert_eq!(unknown.message, "unable to find task with id: ZZZZZ");
    let malformed = api::task_action(manager, TaskActionKind::Hold, "bad id", "admin");
    assert!(malformed.message.starts_with("validation error"));

    assert!(api::list_tasks(overseer.pool(), "").unwrap().tasks.len() >= 3);
    overseer.shutdown().await;
}
