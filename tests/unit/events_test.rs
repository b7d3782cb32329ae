//! Tests for the event dispatcher

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use overseer::core::events::{
    CheckedTicket, DispatchedMessage, EventDispatcher, EventMessage, EventParticipant, EventReceiver, EventResponse,
    RouteName, TickMsg, TicketCheckMsg,
};
use overseer::core::DispatchError;

struct Counter {
    calls: AtomicUsize,
    fail: bool,
}

impl Counter {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail,
        })
    }
}

impl EventParticipant for Counter {
    fn process(&self, route: RouteName, _msg: &DispatchedMessage) -> Result<EventResponse, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DispatchError::Participant(format!("{route} rejected")));
        }
        Ok(EventResponse::Ack)
    }
}

fn tick() -> EventMessage {
    let time = NaiveDate::from_ymd_opt(2020, 9, 9)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    EventMessage::Tick(TickMsg { time })
}

#[test]
fn test_route_names() {
    assert_eq!(tick().route(), RouteName::Tick);
    assert_eq!(RouteName::TicketCheck.to_string(), "COND_CHECK");
    assert_eq!(RouteName::Journal.to_string(), "TASK_JOURNAL");
}

#[test]
fn test_push_event_reaches_every_participant() {
    let dispatcher = EventDispatcher::new();
    let first = Counter::new(false);
    let second = Counter::new(false);
    dispatcher.subscribe(RouteName::Tick, first.clone());
    dispatcher.subscribe(RouteName::Tick, second.clone());

    dispatcher.push_event(None, RouteName::Tick, tick()).unwrap();
    dispatcher.push_event(None, RouteName::Tick, tick()).unwrap();
    assert_eq!(first.calls.load(Ordering::SeqCst), 2);
    assert_eq!(second.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_first_answer_wins() {
    let dispatcher = EventDispatcher::new();
    let failing = Counter::new(true);
    let ok = Counter::new(false);
    dispatcher.subscribe(RouteName::Tick, failing.clone());
    dispatcher.subscribe(RouteName::Tick, ok.clone());

    let err = dispatcher.request(tick()).unwrap_err();
    assert_eq!(err, DispatchError::Participant("TICKER_OUT rejected".into()));
    assert_eq!(ok.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_request_without_participant_still_answers() {
    let dispatcher = EventDispatcher::with_timeout(Duration::from_millis(50));
    let msg = EventMessage::TicketCheck(TicketCheckMsg {
        tickets: vec![CheckedTicket {
            name: "A".into(),
            odate: String::new(),
            fulfilled: false,
        }],
    });
    assert_eq!(
        dispatcher.request(msg).unwrap_err(),
        DispatchError::InvalidRouteName(RouteName::TicketCheck)
    );
}

#[test]
fn test_receiver_times_out_without_answer() {
    let receiver = EventReceiver::new();
    assert_eq!(
        receiver.wait_for_result(Duration::from_millis(10)),
        Err(DispatchError::NoResponse)
    );
}

#[test]
fn test_unsubscribe_all() {
    let dispatcher = EventDispatcher::new();
    let counter = Counter::new(false);
    dispatcher.subscribe(RouteName::Tick, counter.clone());
    dispatcher.subscribe(RouteName::Journal, counter.clone());
    dispatcher.unsubscribe_all();
    assert_eq!(dispatcher.subscribers(RouteName::Tick), 0);
    assert_eq!(dispatcher.subscribers(RouteName::Journal), 0);
    assert!(dispatcher.push_event(None, RouteName::Tick, tick()).is_err());
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_pushes() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let counter = Counter::new(false);
    dispatcher.subscribe(RouteName::Tick, counter.clone());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    dispatcher.request(tick()).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(counter.calls.load(Ordering::SeqCst), 400);
}
