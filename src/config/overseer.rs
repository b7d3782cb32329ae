//! Root configuration and environment overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::pool::{JournalConfig, PoolConfig, ResourcesConfig, StoreConfig, StoreKind};
use crate::core::AppResult;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "OVERSEER_";

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverseerConfig {
    /// Active pool section.
    pub pool: PoolConfig,
    /// Ticket and flag stores.
    pub resources: ResourcesConfig,
    /// Journal section.
    pub journal: JournalConfig,
    /// Ticker period in seconds.
    pub time_interval_secs: u64,
    /// Collection backend.
    pub store: StoreConfig,
}

impl Default for OverseerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            resources: ResourcesConfig::default(),
            journal: JournalConfig::default(),
            time_interval_secs: 1,
            store: StoreConfig::default(),
        }
    }
}

impl OverseerConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=60).contains(&self.time_interval_secs) {
            return Err("time_interval_secs must be between 1 and 60".into());
        }
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        self.resources.validate()?;
        self.journal.validate()?;
        self.store.validate()?;
        self.check_distinct_collections()
    }

    /// Stores replace their whole collection on sync, so no two of them may
    /// share one.
    fn check_distinct_collections(&self) -> Result<(), String> {
        let names = [
            ("pool.collection", &self.pool.collection),
            ("pool.sequence_collection", &self.pool.sequence_collection),
            ("resources.tickets.collection", &self.resources.tickets.collection),
            ("resources.flags.collection", &self.resources.flags.collection),
            ("journal.collection", &self.journal.collection),
        ];
        let mut seen: HashMap<&str, &str> = HashMap::with_capacity(names.len());
        for (section, name) in names {
            if let Some(other) = seen.insert(name.as_str(), section) {
                return Err(format!("{section} and {other} both use collection '{name}'"));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a JSON file, apply environment overrides and validate.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let mut cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing configuration {}", path.display()))?;
        cfg.apply_env_overrides();
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Apply `OVERSEER_*` variables, loading a `.env` file first if present.
    /// Unparsable values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str, slot: &mut T) {
            match raw.parse() {
                Ok(v) => *slot = v,
                Err(_) => warn!(key, value = raw, "ignoring invalid override"),
            }
        }

        if let Some(v) = lookup("MAX_OK_RETURN_CODE") {
            parse("MAX_OK_RETURN_CODE", &v, &mut self.pool.max_ok_return_code);
        }
        if let Some(v) = lookup("NEW_DAY_PROC") {
            parse("NEW_DAY_PROC", &v, &mut self.pool.new_day_proc);
        }
        if let Some(v) = lookup("FORCE_NEW_DAY_PROC") {
            parse("FORCE_NEW_DAY_PROC", &v, &mut self.pool.force_new_day_proc);
        }
        if let Some(v) = lookup("RETENTION_DAYS") {
            parse("RETENTION_DAYS", &v, &mut self.pool.retention_days);
        }
        if let Some(v) = lookup("TIME_INTERVAL_SECS") {
            parse("TIME_INTERVAL_SECS", &v, &mut self.time_interval_secs);
        }
        if let Some(v) = lookup("STORE_PATH") {
            self.store.kind = StoreKind::File;
            self.store.path = Some(PathBuf::from(v));
        }
    }
}
