//! Configuration models for the pool, resource stores, journal and storage.

pub mod overseer;
pub mod pool;

pub use overseer::{OverseerConfig, ENV_PREFIX};
pub use pool::{JournalConfig, PoolConfig, ResourcesConfig, StoreConfig, StoreKind, StoreSyncConfig};
