//! Generic lock guarded key/value store with write-behind persistence.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::collection::DataCollection;
use crate::core::StoreError;

/// Loads and writes the full content of a store.
pub trait ResourceReadWriter<T>: Send + Sync {
    /// Load the persisted content.
    fn load(&self) -> Result<HashMap<String, T>, StoreError>;
    /// Persist a snapshot.
    fn write(&self, items: &HashMap<String, T>) -> Result<(), StoreError>;
}

/// Read/writer that keeps one document per store key in a collection.
pub struct CollectionReadWriter<T> {
    collection: Arc<dyn DataCollection>,
    _item: PhantomData<fn() -> T>,
}

impl<T> CollectionReadWriter<T> {
    /// Wrap a collection.
    pub fn new(collection: Arc<dyn DataCollection>) -> Self {
        Self {
            collection,
            _item: PhantomData,
        }
    }
}

impl<T> ResourceReadWriter<T> for CollectionReadWriter<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<HashMap<String, T>, StoreError> {
        let docs = self
            .collection
            .all()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        docs.into_iter()
            .map(|(key, doc)| {
                serde_json::from_value(doc)
                    .map(|item| (key, item))
                    .map_err(|e| StoreError::Backend(e.to_string()))
            })
            .collect()
    }

    fn write(&self, items: &HashMap<String, T>) -> Result<(), StoreError> {
        let docs = items
            .iter()
            .map(|(key, item)| {
                serde_json::to_value(item)
                    .map(|doc| (key.clone(), doc))
                    .map_err(|e| StoreError::Backend(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.collection
            .replace_all(docs)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

/// In-memory map guarded by a single `RwLock`, optionally persisted.
///
/// Critical sections only touch the map. [`ResourceStore::sync`] copies the
/// map under the read lock and performs I/O after releasing it.
pub struct ResourceStore<T> {
    name: String,
    items: RwLock<HashMap<String, T>>,
    rw: Option<Arc<dyn ResourceReadWriter<T>>>,
}

impl<T> ResourceStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Store without persistence.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(HashMap::new()),
            rw: None,
        }
    }

    /// Store loading its initial content from `rw`. A load failure is fatal.
    pub fn with_persistence(name: impl Into<String>, rw: Arc<dyn ResourceReadWriter<T>>) -> Result<Self, StoreError> {
        let name = name.into();
        let items = rw.load()?;
        info!(store = %name, items = items.len(), "resource store loaded");
        Ok(Self {
            name,
            items: RwLock::new(items),
            rw: Some(rw),
        })
    }

    /// Store name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a new item; fails if the key is present.
    pub fn insert(&self, key: &str, item: T) -> Result<(), StoreError> {
        let mut items = self.items.write();
        if items.contains_key(key) {
            return Err(StoreError::KeyExists(key.to_string()));
        }
        items.insert(key.to_string(), item);
        Ok(())
    }

    /// Get a copy of an item.
    pub fn get(&self, key: &str) -> Option<T> {
        self.items.read().get(key).cloned()
    }

    /// True if the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.items.read().contains_key(key)
    }

    /// Replace an existing item; fails if the key is absent.
    pub fn update(&self, key: &str, item: T) -> Result<(), StoreError> {
        let mut items = self.items.write();
        match items.get_mut(key) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    /// Remove an item. Removing an absent key is a no-op.
    pub fn delete(&self, key: &str) -> Option<T> {
        self.items.write().remove(key)
    }

    /// Point-in-time copy of all values.
    pub fn all(&self) -> Vec<T> {
        self.items.read().values().cloned().collect()
    }

    /// Point-in-time copy of all entries.
    pub fn entries(&self) -> Vec<(String, T)> {
        self.items
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Run a compound check-and-mutate under the write lock.
    pub fn modify<R>(&self, f: impl FnOnce(&mut HashMap<String, T>) -> R) -> R {
        f(&mut self.items.write())
    }

    /// Write the current content to the backing store.
    pub fn sync(&self) -> Result<(), StoreError> {
        let Some(rw) = &self.rw else {
            return Ok(());
        };
        let started = Instant::now();
        let snapshot = self.items.read().clone();
        rw.write(&snapshot)?;
        debug!(store = %self.name, items = snapshot.len(), elapsed = ?started.elapsed(), "store synced");
        Ok(())
    }

    /// Spawn the periodic sync loop. A zero interval only syncs on shutdown.
    /// Failed syncs are retried on the next tick.
    pub fn watch(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            if interval.is_zero() {
                shutdown.cancelled().await;
            } else {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = store.sync() {
                                warn!(store = %store.name, error = %e, "store sync failed, retrying next tick");
                            }
                        }
                        () = shutdown.cancelled() => break,
                    }
                }
            }
            if let Err(e) = store.sync() {
                warn!(store = %store.name, error = %e, "final store sync failed");
            }
            info!(store = %store.name, "store watch stopped");
        })
    }
}
