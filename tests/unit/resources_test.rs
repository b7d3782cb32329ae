//! Tests for the ticket and flag resource manager

use std::collections::HashMap;
use std::sync::Arc;

use overseer::core::collection::DataCollection;
use overseer::core::events::{
    EventDispatcher, EventMessage, EventResponse, FlagAcquireMsg, FlagReleaseMsg, FlagRequest, RouteName,
    TicketAction, TicketActionItem, TicketActionMsg,
};
use overseer::core::resources::{
    CollectionReadWriter, FlagPolicy, FlagState, ResourceManager, ResourceStore, TicketResource,
};
use overseer::core::ResourceError;
use overseer::infra::FileCollection;
use rand::Rng;

#[test]
fn test_ticket_lifecycle() {
    let rm = ResourceManager::in_memory();
    assert!(rm.add_ticket("RCOND_A_01", "").is_ok());
    assert!(rm.add_ticket("RCOND_A_01", "20200909").is_ok());
    assert_eq!(
        rm.add_ticket("RCOND_A_01", "20200909"),
        Err(ResourceError::DuplicateResource)
    );
    assert!(rm.check_ticket("RCOND_A_01", ""));
    assert!(!rm.check_ticket("RCOND_A_01", "20200910"));
}

#[test]
fn test_ticket_delete_is_not_repeatable() {
    let rm = ResourceManager::in_memory();
    assert_eq!(rm.delete_ticket("ABSENT", ""), Err(ResourceError::NotFound));

    rm.add_ticket("T1", "20200909").unwrap();
    assert!(rm.delete_ticket("T1", "20200909").is_ok());
    assert_eq!(rm.delete_ticket("T1", "20200909"), Err(ResourceError::NotFound));
    assert!(!rm.check_ticket("T1", "20200909"));
}

#[test]
fn test_ticket_validation() {
    let rm = ResourceManager::in_memory();
    assert!(matches!(rm.add_ticket("", ""), Err(ResourceError::Validation(_))));
    assert!(matches!(rm.add_ticket("BAD NAME", ""), Err(ResourceError::Validation(_))));
    assert!(matches!(rm.add_ticket(&"X".repeat(33), ""), Err(ResourceError::Validation(_))));
    assert!(matches!(rm.add_ticket("T1", "2020-09-09"), Err(ResourceError::Validation(_))));
    assert!(rm.add_ticket(&"X".repeat(32), "").is_ok());
}

#[test]
fn test_ticket_prefix_listing() {
    let rm = ResourceManager::in_memory();
    for odate in ["", "200909", "201009"] {
        rm.add_ticket("TESTL_01", odate).unwrap();
    }
    rm.add_ticket("TESTL_02", "201009").unwrap();
    rm.add_ticket("OTHER", "201009").unwrap();

    assert_eq!(rm.list_tickets("TESTL_01", "20").len(), 2);
    assert_eq!(rm.list_tickets("TESTL", "").len(), 4);
    assert_eq!(rm.list_tickets("", "").len(), 5);

    let listed = rm.list_tickets("TESTL_0", "2010");
    assert_eq!(
        listed,
        vec![
            TicketResource {
                name: "TESTL_01".into(),
                odate: "201009".into()
            },
            TicketResource {
                name: "TESTL_02".into(),
                odate: "201009".into()
            },
        ]
    );
}

#[test]
fn test_flag_conflict() {
    let rm = ResourceManager::in_memory();
    assert!(rm.set_flag("F1", FlagPolicy::Exclusive).is_ok());
    assert_eq!(rm.set_flag("F1", FlagPolicy::Exclusive), Err(ResourceError::FlagExclusiveInUse));
    assert_eq!(
        rm.set_flag("F1", FlagPolicy::Shared),
        Err(ResourceError::FlagSharedBlockedByExclusive)
    );
    assert!(rm.unset_flag("F1").is_ok());
    assert!(rm.set_flag("F1", FlagPolicy::Shared).is_ok());
    assert_eq!(
        rm.set_flag("F1", FlagPolicy::Exclusive),
        Err(ResourceError::FlagExclusiveBlockedByShared)
    );
}

#[test]
fn test_exclusive_count_stays_at_one() {
    let rm = ResourceManager::in_memory();
    rm.set_flag("EXL", FlagPolicy::Exclusive).unwrap();
    for _ in 0..3 {
        assert!(rm.set_flag("EXL", FlagPolicy::Exclusive).is_err());
        assert!(rm.set_flag("EXL", FlagPolicy::Shared).is_err());
    }
    let flags = rm.list_flags("EXL");
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].policy, FlagPolicy::Exclusive);
    assert_eq!(flags[0].count, 1);
}

#[test]
fn test_flag_count_symmetry() {
    let rm = ResourceManager::in_memory();
    let mut rng = rand::rng();
    for round in 0..20 {
        let name = format!("SHR_{round}");
        let sets: u32 = rng.random_range(1..=10);
        let unsets: u32 = rng.random_range(0..=sets);
        for _ in 0..sets {
            rm.set_flag(&name, FlagPolicy::Shared).unwrap();
        }
        for _ in 0..unsets {
            rm.unset_flag(&name).unwrap();
        }
        let listed = rm.list_flags(&name);
        if sets == unsets {
            assert!(listed.is_empty(), "{name} should be gone");
        } else {
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].count, sets - unsets);
        }
    }
}

#[test]
fn test_unset_and_destroy_absent_flag() {
    let rm = ResourceManager::in_memory();
    assert_eq!(rm.unset_flag("NONE"), Err(ResourceError::NotFound));
    assert_eq!(rm.destroy_flag("NONE"), Err(ResourceError::NotFound));

    rm.set_flag("S", FlagPolicy::Shared).unwrap();
    rm.set_flag("S", FlagPolicy::Shared).unwrap();
    assert!(rm.destroy_flag("S").is_ok());
    assert!(rm.list_flags("").is_empty());
}

#[test]
fn test_acquire_flags_is_all_or_nothing() {
    let rm = ResourceManager::in_memory();
    rm.set_flag("B", FlagPolicy::Exclusive).unwrap();
    let request = [
        FlagRequest {
            name: "A".into(),
            policy: FlagPolicy::Shared,
        },
        FlagRequest {
            name: "B".into(),
            policy: FlagPolicy::Shared,
        },
    ];
    let (ok, conflicts) = rm.acquire_flags(&request);
    assert!(!ok);
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts[0].starts_with("B:"));
    assert!(rm.list_flags("A").is_empty());

    rm.unset_flag("B").unwrap();
    assert_eq!(rm.acquire_flags(&request), (true, Vec::new()));
    let (ok, failed) = rm.release_flags(&["A".to_string(), "B".to_string(), "C".to_string()]);
    assert!(!ok);
    assert_eq!(failed.len(), 1);
    assert!(rm.list_flags("").is_empty());
}

#[test]
fn test_resource_routes_through_dispatcher() {
    let rm = Arc::new(ResourceManager::in_memory());
    let dispatcher = EventDispatcher::new();
    for route in [
        RouteName::TicketCheck,
        RouteName::TicketAction,
        RouteName::FlagAcquire,
        RouteName::FlagRelease,
    ] {
        dispatcher.subscribe(route, rm.clone());
    }

    let actions = TicketActionMsg {
        tickets: vec![
            TicketActionItem {
                name: "OUT_A".into(),
                odate: "20200909".into(),
                action: TicketAction::Add,
            },
            TicketActionItem {
                name: "MISSING".into(),
                odate: String::new(),
                action: TicketAction::Remove,
            },
        ],
    };
    dispatcher
        .push_event(None, RouteName::TicketAction, EventMessage::TicketAction(actions))
        .unwrap();
    assert!(rm.check_ticket("OUT_A", "20200909"));

    let acquire = FlagAcquireMsg {
        flags: vec![FlagRequest {
            name: "F".into(),
            policy: FlagPolicy::Exclusive,
        }],
    };
    let first = dispatcher.request(EventMessage::FlagAcquire(acquire.clone())).unwrap();
    assert_eq!(
        first,
        EventResponse::Flags {
            success: true,
            conflicts: vec![]
        }
    );
    match dispatcher.request(EventMessage::FlagAcquire(acquire)).unwrap() {
        EventResponse::Flags { success, conflicts } => {
            assert!(!success);
            assert_eq!(conflicts.len(), 1);
        }
        other => panic!("unexpected response {other:?}"),
    }
    let release = FlagReleaseMsg { names: vec!["F".into()] };
    assert!(matches!(
        dispatcher.request(EventMessage::FlagRelease(release)).unwrap(),
        EventResponse::Flags { success: true, .. }
    ));
}

#[test]
fn test_stores_persist_through_collections() {
    let dir = tempfile::tempdir().unwrap();
    let open = |path: &std::path::Path| {
        let tickets_col: Arc<dyn DataCollection> = Arc::new(FileCollection::open(path, "tickets").unwrap());
        let flags_col: Arc<dyn DataCollection> = Arc::new(FileCollection::open(path, "flags").unwrap());
        let tickets = ResourceStore::with_persistence(
            "tickets",
            Arc::new(CollectionReadWriter::<TicketResource>::new(tickets_col)),
        )
        .unwrap();
        let flags =
            ResourceStore::with_persistence("flags", Arc::new(CollectionReadWriter::<FlagState>::new(flags_col)))
                .unwrap();
        ResourceManager::new(tickets, flags)
    };

    let rm = open(dir.path());
    rm.add_ticket("PERSIST", "20200909").unwrap();
    rm.set_flag("SHARED", FlagPolicy::Shared).unwrap();
    rm.set_flag("SHARED", FlagPolicy::Shared).unwrap();
    rm.sync().unwrap();

    drop(rm);
    let reopened = open(dir.path());
    assert!(reopened.check_ticket("PERSIST", "20200909"));
    let flags = reopened.list_flags("");
    assert_eq!(flags.len(), 1);
    assert_eq!((flags[0].policy, flags[0].count), (FlagPolicy::Shared, 2));
}

#[test]
fn test_concurrent_ticket_adds_are_unique() {
    let rm = Arc::new(ResourceManager::in_memory());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let rm = Arc::clone(&rm);
            std::thread::spawn(move || (0..50).filter(|i| rm.add_ticket(&format!("C{i}"), "20200909").is_ok()).count())
        })
        .collect();
    let added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(added, 50);

    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    for t in rm.list_tickets("C", "") {
        *seen.entry((t.name, t.odate)).or_default() += 1;
    }
    assert_eq!(seen.len(), 50);
    assert!(seen.values().all(|n| *n == 1));
}
