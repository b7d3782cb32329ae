//! File-backed collection using JSON lines.
//!
//! The whole collection is mirrored in memory; creates append a line and
//! every other mutation rewrites the file.

use std::collections::{BTreeMap, HashMap};
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::collection::{CollectionProvider, DataCollection};
use crate::core::CollectionError;

#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    doc: Value,
}

/// Collection persisted to `<dir>/<name>.jsonl`.
pub struct FileCollection {
    name: String,
    path: PathBuf,
    docs: Mutex<BTreeMap<String, Value>>,
}

impl FileCollection {
    /// Open the collection, loading any existing content.
    pub fn open(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self, CollectionError> {
        let dir = dir.as_ref().to_path_buf();
        let name = name.into();
        create_dir_all(&dir).map_err(|e| CollectionError::Backend(e.to_string()))?;
        let path = dir.join(format!("{name}.jsonl"));
        let docs = Self::load_from_disk(&path)?;
        Ok(Self {
            name,
            path,
            docs: Mutex::new(docs),
        })
    }

    /// Location of the backing file.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<BTreeMap<String, Value>, CollectionError> {
        let mut docs = BTreeMap::new();
        if !path.exists() {
            return Ok(docs);
        }
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| CollectionError::Backend(e.to_string()))?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| CollectionError::Backend(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record =
                serde_json::from_str(&line).map_err(|e| CollectionError::Backend(e.to_string()))?;
            docs.insert(record.key, record.doc);
        }
        Ok(docs)
    }

    fn append_to_disk(&self, key: &str, doc: &Value) -> Result<(), CollectionError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| CollectionError::Backend(e.to_string()))?;
        let line = serde_json::to_string(&Record {
            key: key.to_string(),
            doc: doc.clone(),
        })
        .map_err(|e| CollectionError::Backend(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| CollectionError::Backend(e.to_string()))
    }

    fn rewrite_disk(&self, docs: &BTreeMap<String, Value>) -> Result<(), CollectionError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| CollectionError::Backend(e.to_string()))?;
        for (key, doc) in docs {
            let line = serde_json::to_string(&Record {
                key: key.clone(),
                doc: doc.clone(),
            })
            .map_err(|e| CollectionError::Backend(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| CollectionError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}

impl DataCollection for FileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Value, CollectionError> {
        self.docs
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| CollectionError::NotFound(key.to_string()))
    }

    fn create(&self, key: &str, doc: Value) -> Result<(), CollectionError> {
        let mut docs = self.docs.lock();
        if docs.contains_key(key) {
            return Err(CollectionError::AlreadyExists(key.to_string()));
        }
        self.append_to_disk(key, &doc)?;
        docs.insert(key.to_string(), doc);
        Ok(())
    }

    fn update(&self, key: &str, doc: Value) -> Result<(), CollectionError> {
        let mut docs = self.docs.lock();
        if !docs.contains_key(key) {
            return Err(CollectionError::NotFound(key.to_string()));
        }
        docs.insert(key.to_string(), doc);
        self.rewrite_disk(&docs)
    }

    fn delete(&self, key: &str) -> Result<(), CollectionError> {
        let mut docs = self.docs.lock();
        if docs.remove(key).is_none() {
            return Err(CollectionError::NotFound(key.to_string()));
        }
        self.rewrite_disk(&docs)
    }

    fn all(&self) -> Result<Vec<(String, Value)>, CollectionError> {
        Ok(self
            .docs
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn replace_all(&self, docs: Vec<(String, Value)>) -> Result<(), CollectionError> {
        let mut current = self.docs.lock();
        let next: BTreeMap<String, Value> = docs.into_iter().collect();
        self.rewrite_disk(&next)?;
        *current = next;
        Ok(())
    }
}

/// Opens file collections under a root directory, caching open handles.
pub struct FileCollectionProvider {
    root: PathBuf,
    open: Mutex<HashMap<String, Arc<FileCollection>>>,
}

impl FileCollectionProvider {
    /// Provider rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            open: Mutex::new(HashMap::new()),
        }
    }
}

impl CollectionProvider for FileCollectionProvider {
    fn collection(&self, name: &str) -> Result<Arc<dyn DataCollection>, CollectionError> {
        let mut open = self.open.lock();
        if let Some(col) = open.get(name) {
            return Ok(col.clone());
        }
        let col = Arc::new(FileCollection::open(&self.root, name)?);
        open.insert(name.to_string(), col.clone());
        Ok(col)
    }
}
