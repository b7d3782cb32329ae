//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::events::RouteName;
use crate::util::TaskOrderId;

/// Errors produced by a resource store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Insert on a key that is already present.
    #[error("key already exists: {0}")]
    KeyExists(String),
    /// Update on a key that is absent.
    #[error("key not found: {0}")]
    KeyNotFound(String),
    /// Persistence backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors produced by the resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// Malformed name or odate.
    #[error("validation error: {0}")]
    Validation(String),
    /// Ticket with the same name and odate already exists.
    #[error("ticket with given name and odate already exists")]
    DuplicateResource,
    /// Ticket or flag does not exist.
    #[error("resource with given name does not exist")]
    NotFound,
    /// Exclusive set requested while the flag is held exclusively.
    #[error("exclusive flag already held")]
    FlagExclusiveInUse,
    /// Shared set requested while the flag is held exclusively.
    #[error("shared flag blocked by exclusive")]
    FlagSharedBlockedByExclusive,
    /// Exclusive set requested while the flag is shared.
    #[error("exclusive flag blocked by shared holders")]
    FlagExclusiveBlockedByShared,
    /// Persistence backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for ResourceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::KeyExists(_) => Self::DuplicateResource,
            StoreError::KeyNotFound(_) => Self::NotFound,
            StoreError::Backend(msg) => Self::Backend(msg),
        }
    }
}

/// Errors produced by the event dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Route has no participant or the participant does not serve it.
    #[error("invalid route name: {0}")]
    InvalidRouteName(RouteName),
    /// Message variant does not belong to the route.
    #[error("unrecognized message format")]
    UnrecognizedMessageFormat,
    /// No participant produced a response in time.
    #[error("no response received")]
    NoResponse,
    /// Participant failed while handling the message.
    #[error("participant error: {0}")]
    Participant(String),
}

/// Errors produced by the active task pool and its manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No task with the given order id.
    #[error("unable to find task with id: {0}")]
    UnableFindTask(TaskOrderId),
    /// Action is not allowed in the current task state.
    #[error("invalid status: {0}")]
    InvalidStatus(String),
    /// Malformed identifier or request.
    #[error("validation error: {0}")]
    Validation(String),
    /// Definition could not be resolved.
    #[error("definition error: {0}")]
    Definition(String),
    /// Ordering checks rejected the definition.
    #[error("task not submitted: {0}")]
    NotSubmitted(String),
    /// Dispatcher round-trip failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Persistence backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors produced while converting or launching work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkError {
    /// No converter is registered for the task type.
    #[error("no converter registered for task type: {0}")]
    NoConverter(String),
    /// Action payload could not be converted.
    #[error("conversion failed: {0}")]
    Conversion(String),
    /// Worker layer refused or failed to start the work.
    #[error("launch failed: {0}")]
    Launch(String),
}

/// Errors produced by persistent collections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// Document with the key does not exist.
    #[error("document not found: {0}")]
    NotFound(String),
    /// Document with the key already exists.
    #[error("document already exists: {0}")]
    AlreadyExists(String),
    /// Any other storage failure.
    #[error("collection backend error: {0}")]
    Backend(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
