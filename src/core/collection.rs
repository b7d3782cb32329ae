//! Persistent key/document collection contract.
//!
//! Resource stores, the active pool snapshot, the order sequence and the
//! journal persist through this narrow interface. Documents are JSON values
//! keyed by string; adapters live in `infra::collection`.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::core::CollectionError;

/// Key/document collection used for durability.
pub trait DataCollection: Send + Sync {
    /// Name of the collection.
    fn name(&self) -> &str;
    /// Fetch a document by key.
    fn get(&self, key: &str) -> Result<Value, CollectionError>;
    /// Create a document, failing if the key exists.
    fn create(&self, key: &str, doc: Value) -> Result<(), CollectionError>;
    /// Replace an existing document, failing if the key is absent.
    fn update(&self, key: &str, doc: Value) -> Result<(), CollectionError>;
    /// Remove a document, failing if the key is absent.
    fn delete(&self, key: &str) -> Result<(), CollectionError>;
    /// All documents as `(key, document)` pairs.
    fn all(&self) -> Result<Vec<(String, Value)>, CollectionError>;
    /// Replace the whole content of the collection.
    fn replace_all(&self, docs: Vec<(String, Value)>) -> Result<(), CollectionError>;

    /// Number of documents.
    fn count(&self) -> Result<usize, CollectionError> {
        self.all().map(|docs| docs.len())
    }

    /// Create or replace a document.
    fn upsert(&self, key: &str, doc: Value) -> Result<(), CollectionError> {
        match self.update(key, doc.clone()) {
            Err(CollectionError::NotFound(_)) => self.create(key, doc),
            other => other,
        }
    }
}

/// Typed helpers over [`DataCollection`].
pub trait CollectionExt {
    /// Fetch and deserialize a document.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, CollectionError>;
    /// Serialize and upsert a document.
    fn put_as<T: Serialize>(&self, key: &str, doc: &T) -> Result<(), CollectionError>;
}

impl<C: DataCollection + ?Sized> CollectionExt for C {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, CollectionError> {
        let value = self.get(key)?;
        serde_json::from_value(value).map_err(|e| CollectionError::Backend(e.to_string()))
    }

    fn put_as<T: Serialize>(&self, key: &str, doc: &T) -> Result<(), CollectionError> {
        let value = serde_json::to_value(doc).map_err(|e| CollectionError::Backend(e.to_string()))?;
        self.upsert(key, value)
    }
}

/// Provides collections by name.
pub trait CollectionProvider: Send + Sync {
    /// Open or create the named collection.
    fn collection(&self, name: &str) -> Result<std::sync::Arc<dyn DataCollection>, CollectionError>;
}
