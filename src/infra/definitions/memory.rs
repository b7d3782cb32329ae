//! In-memory definition provider, optionally loaded from a directory of JSON
//! files.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::RwLock;
use tracing::info;

use crate::core::definition::{DefinitionProvider, TaskDefinition, TaskModel, TaskSelector};
use crate::core::resources::build_expr;
use crate::core::{AppResult, PoolError};

type Groups = BTreeMap<String, BTreeMap<String, Arc<TaskDefinition>>>;

/// Definitions kept in memory, grouped and sorted by name.
#[derive(Debug, Default)]
pub struct InMemoryDefinitionProvider {
    groups: RwLock<Groups>,
}

impl InMemoryDefinitionProvider {
    /// Empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider holding the given definitions.
    pub fn from_definitions(defs: impl IntoIterator<Item = TaskDefinition>) -> Result<Self, PoolError> {
        let provider = Self::new();
        for def in defs {
            provider.add(def)?;
        }
        Ok(provider)
    }

    /// Load every `*.json` file of a directory; each file holds one
    /// definition or an array of them.
    pub fn load_dir(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref();
        let provider = Self::new();
        let entries = std::fs::read_dir(dir).with_context(|| format!("reading definitions in {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            let value: serde_json::Value =
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
            let defs: Vec<TaskDefinition> = if value.is_array() {
                serde_json::from_value(value)
            } else {
                serde_json::from_value(value).map(|d| vec![d])
            }
            .with_context(|| format!("decoding definitions in {}", path.display()))?;
            for def in defs {
                provider.add(def).with_context(|| format!("invalid definition in {}", path.display()))?;
            }
        }
        info!(dir = %dir.display(), groups = provider.groups.read().len(), "definitions loaded");
        Ok(provider)
    }

    /// Add or replace a definition after validating it.
    pub fn add(&self, def: TaskDefinition) -> Result<(), PoolError> {
        def.validate().map_err(PoolError::Definition)?;
        self.groups
            .write()
            .entry(def.group.clone())
            .or_default()
            .insert(def.name.clone(), Arc::new(def));
        Ok(())
    }

    /// Remove a definition. Returns false if it did not exist.
    pub fn remove(&self, group: &str, name: &str) -> bool {
        let mut groups = self.groups.write();
        let Some(tasks) = groups.get_mut(group) else {
            return false;
        };
        let removed = tasks.remove(name).is_some();
        if tasks.is_empty() {
            groups.remove(group);
        }
        removed
    }
}

impl DefinitionProvider for InMemoryDefinitionProvider {
    fn get_tasks(&self, selectors: &[TaskSelector]) -> Result<Vec<Arc<TaskDefinition>>, PoolError> {
        let groups = self.groups.read();
        selectors
            .iter()
            .map(|s| {
                groups
                    .get(&s.group)
                    .and_then(|tasks| tasks.get(&s.name))
                    .cloned()
                    .ok_or_else(|| PoolError::Definition(format!("task {}/{} not found", s.group, s.name)))
            })
            .collect()
    }

    fn get_groups(&self) -> Vec<String> {
        self.groups.read().keys().cloned().collect()
    }

    fn get_task_model_list(&self, group_selector: &str) -> Result<Vec<TaskModel>, PoolError> {
        let expr = build_expr(group_selector).map_err(|e| PoolError::Validation(e.to_string()))?;
        let groups = self.groups.read();
        Ok(groups
            .iter()
            .filter(|(group, _)| expr.is_match(group))
            .flat_map(|(_, tasks)| tasks.values())
            .map(|def| TaskModel {
                group: def.group.clone(),
                name: def.name.clone(),
                description: def.description.clone(),
            })
            .collect())
    }
}
