//! Event dispatcher with closed per-route message variants.
//!
//! Components subscribe an [`EventParticipant`] to one or more routes. A
//! pushed message is delivered synchronously to every subscriber of its route
//! and the first participant result is forwarded to an optional
//! [`EventReceiver`], so request/response routes always produce an answer.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::resources::FlagPolicy;
use crate::core::DispatchError;
use crate::util::{MsgId, TaskOrderId};

/// Routes served by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteName {
    /// Periodic timer tick.
    Tick,
    /// Batched ticket existence check (request/response).
    TicketCheck,
    /// Batched ticket add/remove from post-processing.
    TicketAction,
    /// Acquire a set of flags (request/response).
    FlagAcquire,
    /// Release a set of flags (request/response).
    FlagRelease,
    /// Journal entry for a task.
    Journal,
}

impl fmt::Display for RouteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tick => "TICKER_OUT",
            Self::TicketCheck => "COND_CHECK",
            Self::TicketAction => "COND_IN",
            Self::FlagAcquire => "FLAG_ACQUIRE",
            Self::FlagRelease => "FLAG_RELEASE",
            Self::Journal => "TASK_JOURNAL",
        };
        f.write_str(name)
    }
}

/// Timer tick payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickMsg {
    /// Local wall-clock time of the tick.
    pub time: NaiveDateTime,
}

/// A ticket reference with its fulfillment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedTicket {
    /// Ticket name.
    pub name: String,
    /// Ticket odate, empty for date independent tickets.
    pub odate: String,
    /// Whether the ticket exists.
    pub fulfilled: bool,
}

/// Batch of tickets to check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TicketCheckMsg {
    /// Tickets to check; the response carries the same list annotated.
    pub tickets: Vec<CheckedTicket>,
}

/// Action applied to an out-ticket after a task ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketAction {
    /// Add the ticket.
    #[serde(rename = "ADD")]
    Add,
    /// Remove the ticket.
    #[serde(rename = "REM")]
    Remove,
}

/// One ticket action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketActionItem {
    /// Ticket name.
    pub name: String,
    /// Ticket odate.
    pub odate: String,
    /// Action to apply.
    pub action: TicketAction,
}

/// Batch of ticket actions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TicketActionMsg {
    /// Actions in application order.
    pub tickets: Vec<TicketActionItem>,
}

/// A flag requested by a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRequest {
    /// Flag name.
    pub name: String,
    /// Requested policy.
    pub policy: FlagPolicy,
}

/// Flags to acquire atomically.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlagAcquireMsg {
    /// Requested flags.
    pub flags: Vec<FlagRequest>,
}

/// Flags to release.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlagReleaseMsg {
    /// Flag names.
    pub names: Vec<String>,
}

/// Journal entry for a task instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalMsg {
    /// Task order id.
    pub order_id: TaskOrderId,
    /// Execution the entry belongs to.
    pub execution_id: String,
    /// Event time.
    pub time: DateTime<Utc>,
    /// Entry text.
    pub message: String,
}

/// Closed set of messages carried by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMessage {
    /// Timer tick.
    Tick(TickMsg),
    /// Ticket check request.
    TicketCheck(TicketCheckMsg),
    /// Ticket actions.
    TicketAction(TicketActionMsg),
    /// Flag acquisition request.
    FlagAcquire(FlagAcquireMsg),
    /// Flag release request.
    FlagRelease(FlagReleaseMsg),
    /// Journal entry.
    Journal(JournalMsg),
}

impl EventMessage {
    /// Route this variant belongs to.
    pub const fn route(&self) -> RouteName {
        match self {
            Self::Tick(_) => RouteName::Tick,
            Self::TicketCheck(_) => RouteName::TicketCheck,
            Self::TicketAction(_) => RouteName::TicketAction,
            Self::FlagAcquire(_) => RouteName::FlagAcquire,
            Self::FlagRelease(_) => RouteName::FlagRelease,
            Self::Journal(_) => RouteName::Journal,
        }
    }
}

/// Envelope delivered to participants.
#[derive(Debug, Clone)]
pub struct DispatchedMessage {
    /// Unique message id.
    pub msg_id: MsgId,
    /// Id of the message this one responds to.
    pub correlation_id: Option<MsgId>,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Payload.
    pub message: EventMessage,
}

impl DispatchedMessage {
    /// Wrap a message in a fresh envelope.
    pub fn new(message: EventMessage) -> Self {
        Self {
            msg_id: MsgId::new(),
            correlation_id: None,
            created: Utc::now(),
            message,
        }
    }
}

/// Participant answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventResponse {
    /// Message accepted, nothing to return.
    Ack,
    /// Annotated ticket batch.
    TicketCheck(TicketCheckMsg),
    /// Outcome of a flag acquire/release.
    Flags {
        /// True if every flag was processed.
        success: bool,
        /// Names that could not be processed, with reasons.
        conflicts: Vec<String>,
    },
}

/// A component receiving dispatched messages.
pub trait EventParticipant: Send + Sync {
    /// Handle a message on a route. Participants match the payload
    /// exhaustively and reject routes they do not serve.
    fn process(&self, route: RouteName, msg: &DispatchedMessage) -> Result<EventResponse, DispatchError>;
}

/// Reply channel for request/response routes.
pub struct EventReceiver {
    tx: Sender<Result<EventResponse, DispatchError>>,
    rx: Receiver<Result<EventResponse, DispatchError>>,
}

impl EventReceiver {
    /// Create a receiver holding at most one response.
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    fn deliver(&self, result: Result<EventResponse, DispatchError>) {
        // Only the first participant answers; later results are dropped.
        let _ = self.tx.try_send(result);
    }

    /// Wait for the response.
    pub fn wait_for_result(&self, timeout: Duration) -> Result<EventResponse, DispatchError> {
        self.rx.recv_timeout(timeout).map_err(|_| DispatchError::NoResponse)?
    }
}

impl Default for EventReceiver {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscribers = Vec<(SubscriptionId, Arc<dyn EventParticipant>)>;

/// Pub/sub dispatcher.
pub struct EventDispatcher {
    routes: RwLock<HashMap<RouteName, Subscribers>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl EventDispatcher {
    /// Default time a requester waits for a response.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a dispatcher with the default response timeout.
    pub fn new() -> Self {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// Create a dispatcher with a custom response timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Subscribe a participant to a route.
    pub fn subscribe(&self, route: RouteName, participant: Arc<dyn EventParticipant>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.routes.write().entry(route).or_default().push((id, participant));
        debug!(route = %route, "participant subscribed");
        id
    }

    /// Remove a subscription. Returns false if it was not found.
    pub fn unsubscribe(&self, route: RouteName, id: SubscriptionId) -> bool {
        let mut routes = self.routes.write();
        let Some(subs) = routes.get_mut(&route) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            routes.remove(&route);
        }
        removed
    }

    /// Drop every subscription.
    pub fn unsubscribe_all(&self) {
        self.routes.write().clear();
    }

    /// Number of participants on a route.
    pub fn subscribers(&self, route: RouteName) -> usize {
        self.routes.read().get(&route).map_or(0, Vec::len)
    }

    /// Deliver a message to all participants of `route`.
    ///
    /// The receiver, if any, always gets exactly one result: the first
    /// participant answer or the dispatch error.
    pub fn push_event(
        &self,
        receiver: Option<&EventReceiver>,
        route: RouteName,
        message: EventMessage,
    ) -> Result<(), DispatchError> {
        let fail = |err: DispatchError| {
            if let Some(rcv) = receiver {
                rcv.deliver(Err(err.clone()));
            }
            Err(err)
        };

        if message.route() != route {
            warn!(route = %route, "message does not belong to route");
            return fail(DispatchError::UnrecognizedMessageFormat);
        }

        // Snapshot subscribers so participants run without the routes lock.
        let subscribers: Subscribers = match self.routes.read().get(&route) {
            Some(subs) if !subs.is_empty() => subs.clone(),
            _ => return fail(DispatchError::InvalidRouteName(route)),
        };

        let dispatched = DispatchedMessage::new(message);
        debug!(route = %route, msg_id = %dispatched.msg_id, "dispatching");
        for (_, participant) in subscribers {
            let result = participant.process(route, &dispatched);
            if let Err(err) = &result {
                warn!(route = %route, error = %err, "participant returned error");
            }
            if let Some(rcv) = receiver {
                rcv.deliver(result);
            }
        }
        Ok(())
    }

    /// Push a message and wait for the response.
    pub fn request(&self, message: EventMessage) -> Result<EventResponse, DispatchError> {
        let receiver = EventReceiver::new();
        let route = message.route();
        // Errors are delivered to the receiver as well.
        let _ = self.push_event(Some(&receiver), route, message);
        receiver.wait_for_result(self.timeout)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
