//! Tests for the task journal

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use overseer::core::collection::DataCollection;
use overseer::core::events::{EventDispatcher, EventMessage, JournalMsg, RouteName};
use overseer::core::journal::{CollectionJournal, InMemoryJournal, JournalEvent, JournalParticipant, LogEntry, TaskJournal};
use overseer::infra::{FileCollection, InMemoryCollection};
use overseer::util::TaskOrderId;
use tokio_util::sync::CancellationToken;

fn entry(message: &str) -> LogEntry {
    LogEntry {
        time: Utc::now(),
        execution_id: "exec".into(),
        message: message.into(),
    }
}

#[test]
fn test_journal_catalogue() {
    let ordered = JournalEvent::Ordered {
        user: "admin".into(),
        odate: "20200909".into(),
    };
    assert_eq!(ordered.to_string(), "TASK ORDERED, user:admin ODATE:20200909");
    assert_eq!(
        JournalEvent::Starting {
            run: 2,
            worker: "local".into()
        }
        .to_string(),
        "TASK STARTING, RN:2 worker:local"
    );
    assert_eq!(
        JournalEvent::EndedNotOk { rc: 8, sc: 0 }.to_string(),
        "ENDED NOT OK, RC:8, STATUS:0"
    );
    assert_eq!(
        JournalEvent::Failed {
            reason: "cancelled".into()
        }
        .to_string(),
        "TASK FAILED, reason:cancelled"
    );
    assert_eq!(JournalEvent::PostProcessing.to_string(), "TASK POST PROCESSING ENDED");
}

#[test]
fn test_participant_writes_journal_route() {
    let journal = Arc::new(InMemoryJournal::new(10));
    let dispatcher = EventDispatcher::new();
    dispatcher.subscribe(
        RouteName::Journal,
        Arc::new(JournalParticipant::new(journal.clone() as Arc<dyn TaskJournal>)),
    );

    let id = TaskOrderId::from("A0001");
    let msg = EventMessage::Journal(JournalMsg {
        order_id: id.clone(),
        execution_id: "exec".into(),
        time: Utc::now(),
        message: JournalEvent::PreconditionsOk.to_string(),
    });
    dispatcher.push_event(None, RouteName::Journal, msg).unwrap();

    let log = journal.read_log(&id);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].message, "TASK PRECONDITIONS OK");
    assert!(journal.read_log(&TaskOrderId::from("B0001")).is_empty());
}

#[test]
fn test_collection_journal_bounds_backlog() {
    let col: Arc<dyn DataCollection> = Arc::new(InMemoryCollection::new("journal"));
    let journal = CollectionJournal::new(col).with_max_pending(3);
    let id = TaskOrderId::from("A0001");
    for i in 0..5 {
        journal.write_log(&id, entry(&format!("m{i}")));
    }
    let messages: Vec<String> = journal.read_log(&id).into_iter().map(|e| e.message).collect();
    assert_eq!(messages, ["m2", "m3", "m4"]);
}

#[test]
fn test_collection_journal_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = TaskOrderId::from("A0001");
    {
        let col: Arc<dyn DataCollection> = Arc::new(FileCollection::open(dir.path(), "journal").unwrap());
        let journal = CollectionJournal::new(col);
        journal.write_log(&id, entry("first"));
        journal.write_log(&id, entry("second"));
        assert_eq!(journal.sync(Utc::now(), Duration::ZERO).unwrap(), 2);
        journal.write_log(&id, entry("third"));
        assert_eq!(journal.sync(Utc::now(), Duration::ZERO).unwrap(), 1);
    }

    let col: Arc<dyn DataCollection> = Arc::new(FileCollection::open(dir.path(), "journal").unwrap());
    let journal = CollectionJournal::new(col);
    let messages: Vec<String> = journal.read_log(&id).into_iter().map(|e| e.message).collect();
    assert_eq!(messages, ["first", "second", "third"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_flushes_on_shutdown() {
    let col: Arc<dyn DataCollection> = Arc::new(InMemoryCollection::new("journal"));
    let journal = Arc::new(CollectionJournal::new(col.clone()));
    let id = TaskOrderId::from("A0001");
    journal.write_log(&id, entry("pending"));

    let shutdown = CancellationToken::new();
    let handle = journal.watch(Duration::from_secs(3600), shutdown.clone());
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(col.count().unwrap(), 1);
}
