//! In-memory collection for development and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::core::collection::{CollectionProvider, DataCollection};
use crate::core::CollectionError;

/// Collection kept in a sorted in-memory map.
pub struct InMemoryCollection {
    name: String,
    docs: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryCollection {
    /// Create an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(BTreeMap::new()),
        }
    }
}

impl DataCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Value, CollectionError> {
        self.docs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CollectionError::NotFound(key.to_string()))
    }

    fn create(&self, key: &str, doc: Value) -> Result<(), CollectionError> {
        let mut docs = self.docs.write();
        if docs.contains_key(key) {
            return Err(CollectionError::AlreadyExists(key.to_string()));
        }
        docs.insert(key.to_string(), doc);
        Ok(())
    }

    fn update(&self, key: &str, doc: Value) -> Result<(), CollectionError> {
        let mut docs = self.docs.write();
        match docs.get_mut(key) {
            Some(slot) => {
                *slot = doc;
                Ok(())
            }
            None => Err(CollectionError::NotFound(key.to_string())),
        }
    }

    fn delete(&self, key: &str) -> Result<(), CollectionError> {
        self.docs
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| CollectionError::NotFound(key.to_string()))
    }

    fn all(&self) -> Result<Vec<(String, Value)>, CollectionError> {
        Ok(self
            .docs
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn replace_all(&self, docs: Vec<(String, Value)>) -> Result<(), CollectionError> {
        *self.docs.write() = docs.into_iter().collect();
        Ok(())
    }
}

/// Hands out shared in-memory collections by name.
#[derive(Default)]
pub struct InMemoryCollectionProvider {
    collections: Mutex<HashMap<String, Arc<InMemoryCollection>>>,
}

impl InMemoryCollectionProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollectionProvider for InMemoryCollectionProvider {
    fn collection(&self, name: &str) -> Result<Arc<dyn DataCollection>, CollectionError> {
        let mut collections = self.collections.lock();
        let col = collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryCollection::new(name)))
            .clone();
        Ok(col)
    }
}
