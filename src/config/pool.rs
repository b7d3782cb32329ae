//! Section structures for the active pool, resources, journal and storage.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::HourMinTime;

/// Upper bound for store sync intervals, in seconds.
pub const MAX_SYNC_INTERVAL_SECS: u64 = 60;

/// Active pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Highest return code still treated as success for OS tasks.
    pub max_ok_return_code: i32,
    /// Time of day the daily procedure fires.
    pub new_day_proc: HourMinTime,
    /// Run the daily procedure once at startup regardless of the trigger.
    pub force_new_day_proc: bool,
    /// Snapshot interval in seconds; 0 only syncs on shutdown.
    pub sync_interval_secs: u64,
    /// Days a terminal entry is kept past its order date.
    pub retention_days: u32,
    /// Collection holding the pool snapshot.
    pub collection: String,
    /// Collection holding the order id sequence.
    pub sequence_collection: String,
    /// Number of independently locked shards.
    pub shards: usize,
    /// Start in QUIESCE mode.
    pub start_quiesced: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_ok_return_code: 4,
            new_day_proc: HourMinTime::default(),
            force_new_day_proc: false,
            sync_interval_secs: 5,
            retention_days: 7,
            collection: "tasks".into(),
            sequence_collection: "sequence".into(),
            shards: 16,
            start_quiesced: false,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_ok_return_code < 0 {
            return Err("max_ok_return_code must not be negative".into());
        }
        if self.sync_interval_secs > MAX_SYNC_INTERVAL_SECS {
            return Err(format!("sync_interval_secs must be at most {MAX_SYNC_INTERVAL_SECS}"));
        }
        if self.shards == 0 {
            return Err("shards must be greater than 0".into());
        }
        if self.collection.is_empty() || self.sequence_collection.is_empty() {
            return Err("pool collection names must not be empty".into());
        }
        if self.collection == self.sequence_collection {
            return Err("collection and sequence_collection must differ".into());
        }
        Ok(())
    }
}

/// Persistence settings of one resource store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSyncConfig {
    /// Backing collection name.
    pub collection: String,
    /// Sync interval in seconds; 0 only syncs on shutdown.
    #[serde(default)]
    pub sync_interval_secs: u64,
}

impl StoreSyncConfig {
    fn named(collection: &str) -> Self {
        Self {
            collection: collection.into(),
            sync_interval_secs: 5,
        }
    }

    fn validate(&self, section: &str) -> Result<(), String> {
        if self.collection.is_empty() {
            return Err(format!("{section}.collection must not be empty"));
        }
        if self.sync_interval_secs > MAX_SYNC_INTERVAL_SECS {
            return Err(format!(
                "{section}.sync_interval_secs must be at most {MAX_SYNC_INTERVAL_SECS}"
            ));
        }
        Ok(())
    }
}

/// Ticket and flag store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Ticket store.
    pub tickets: StoreSyncConfig,
    /// Flag store.
    pub flags: StoreSyncConfig,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            tickets: StoreSyncConfig::named("tickets"),
            flags: StoreSyncConfig::named("flags"),
        }
    }
}

impl ResourcesConfig {
    /// Validate both stores.
    pub fn validate(&self) -> Result<(), String> {
        self.tickets.validate("resources.tickets")?;
        self.flags.validate("resources.flags")
    }
}

/// Journal configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Backing collection name.
    pub collection: String,
    /// Flush interval in seconds; entries older than this are flushed.
    pub sync_interval_secs: u64,
    /// Per-order bound of the in-memory journal.
    pub max_entries: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            collection: "journal".into(),
            sync_interval_secs: 10,
            max_entries: 500,
        }
    }
}

impl JournalConfig {
    /// Validate journal values.
    pub fn validate(&self) -> Result<(), String> {
        if self.collection.is_empty() {
            return Err("journal.collection must not be empty".into());
        }
        if self.max_entries == 0 {
            return Err("journal.max_entries must be greater than 0".into());
        }
        Ok(())
    }
}

/// Collection backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// In-memory collections, lost on restart.
    InMemory,
    /// One JSONL file per collection.
    File,
}

/// Persistent collection backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend kind.
    pub kind: StoreKind,
    /// Directory used by the file backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::InMemory,
            path: None,
        }
    }
}

impl StoreConfig {
    /// The file backend needs a directory.
    pub fn validate(&self) -> Result<(), String> {
        if self.kind == StoreKind::File && self.path.is_none() {
            return Err("store.path is required for the file backend".into());
        }
        Ok(())
    }
}
