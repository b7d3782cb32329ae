//! Core scheduling components: resources, events, the active pool and the
//! daily procedure.

pub mod collection;
pub mod daily;
pub mod definition;
pub mod error;
pub mod events;
pub mod executor;
pub mod journal;
pub mod pool;
pub mod resources;

pub use daily::DailyExecutor;
pub use error::{AppResult, CollectionError, DispatchError, PoolError, ResourceError, StoreError, WorkError};
pub use executor::{ActionConverter, ConverterRegistry, Spawn, WorkDispatcher};
