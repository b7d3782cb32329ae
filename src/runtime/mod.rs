//! Tokio runtime adapters, the periodic ticker and the service-facing API.

pub mod api;
pub mod ticker;
pub mod tokio_spawner;

pub use api::{ActionResponse, TaskActionKind, TaskListResponse};
pub use ticker::Ticker;
pub use tokio_spawner::TokioSpawner;
