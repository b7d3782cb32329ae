//! Tests for the overseer builder

use std::sync::Arc;
use std::time::Duration;

use overseer::builders::OverseerBuilder;
use overseer::config::{OverseerConfig, StoreConfig, StoreKind};
use overseer::core::definition::{TaskDefinition, TaskSelector};
use overseer::core::events::RouteName;
use overseer::core::journal::TaskJournal;
use overseer::core::pool::TaskState;
use overseer::infra::InMemoryDefinitionProvider;
use overseer::util::{now_local, TaskOrderId};

fn definitions() -> Arc<InMemoryDefinitionProvider> {
    Arc::new(InMemoryDefinitionProvider::from_definitions([TaskDefinition::new("BATCH", "LOAD")]).unwrap())
}

fn file_config(path: &std::path::Path) -> OverseerConfig {
    OverseerConfig {
        store: StoreConfig {
            kind: StoreKind::File,
            path: Some(path.to_path_buf()),
        },
        ..OverseerConfig::default()
    }
}

async fn wait_for(state: TaskState, check: impl Fn() -> TaskState) {
    for _ in 0..200 {
        if check() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {state}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_builder_requires_definitions() {
    let result = OverseerBuilder::new(OverseerConfig::default()).build();
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_builder_rejects_invalid_config() {
    let mut cfg = OverseerConfig::default();
    cfg.time_interval_secs = 0;
    let result = OverseerBuilder::new(cfg).with_definitions(definitions()).build();
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_builder_rejects_shared_resource_collection() {
    let mut cfg = OverseerConfig::default();
    cfg.resources.tickets.collection = "resources".into();
    cfg.resources.flags.collection = "resources".into();
    let err = OverseerBuilder::new(cfg)
        .with_definitions(definitions())
        .build()
        .err()
        .expect("shared collection rejected");
    assert!(format!("{err:#}").contains("both use collection 'resources'"), "{err:#}");
}

#[test]
fn test_builder_outside_runtime_fails() {
    let result = OverseerBuilder::new(OverseerConfig::default())
        .with_definitions(definitions())
        .build();
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_build_wires_routes() {
    let overseer = OverseerBuilder::new(OverseerConfig::default())
        .with_definitions(definitions())
        .build()
        .unwrap();
    let dispatcher = overseer.dispatcher();
    assert_eq!(dispatcher.subscribers(RouteName::Tick), 2);
    assert_eq!(dispatcher.subscribers(RouteName::TicketCheck), 1);
    assert_eq!(dispatcher.subscribers(RouteName::FlagAcquire), 1);
    assert_eq!(dispatcher.subscribers(RouteName::Journal), 1);
    assert!(overseer.pool().store().is_empty());

    overseer.start();
    overseer.shutdown().await;
    assert_eq!(overseer.dispatcher().subscribers(RouteName::Tick), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let id: TaskOrderId;
    {
        let overseer = OverseerBuilder::new(file_config(dir.path()))
            .with_definitions(definitions())
            .build()
            .unwrap();
        overseer.start();

        id = overseer
            .manager()
            .order(&TaskSelector::new("BATCH", "LOAD"), None, "admin")
            .unwrap();
        overseer.resources().add_ticket("KEEP", "").unwrap();
        overseer.pool().run_cycle(now_local()).await;
        let pool = Arc::clone(overseer.pool());
        let watched = id.clone();
        wait_for(TaskState::Ended, || pool.task(&watched).unwrap().state()).await;
        for _ in 0..200 {
            let log = overseer.journal().read_log(&id);
            if log.iter().any(|e| e.message == "TASK POST PROCESSING ENDED") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        overseer.shutdown().await;
    }

    let overseer = OverseerBuilder::new(file_config(dir.path()))
        .with_definitions(definitions())
        .build()
        .unwrap();
    assert!(overseer.resources().check_ticket("KEEP", ""));
    assert_eq!(overseer.pool().task(&id).unwrap().state(), TaskState::Ended);

    let messages: Vec<String> = overseer.journal().read_log(&id).into_iter().map(|e| e.message).collect();
    let expected = format!("TASK ORDERED, user:admin ODATE:{}", overseer.pool().current_odate());
    assert_eq!(messages.first(), Some(&expected));
    assert!(messages.iter().any(|m| m.starts_with("ENDED OK")));

    let next = overseer
        .manager()
        .order(&TaskSelector::new("BATCH", "LOAD"), None, "admin")
        .unwrap();
    assert_ne!(next, id, "order ids keep advancing across restarts");
}
