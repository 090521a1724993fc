use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::trace;

use crate::bohm::tools::error::{Result, ToolError};
use crate::bohm::tools::io::atomic_write;
use crate::bohm::tools::store::{Collection, DocumentStore, Filter};

const SERVICE: &str = "document store";

/// Store keeping each collection as a JSON array in `<root>/<collection>.json`.
///
/// Every call reads the collection file and every mutation rewrites it
/// atomically, so a crash never leaves a truncated collection behind.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    fn load(&self, collection: &str, operation: &'static str) -> Result<Collection> {
        let path = self.path(collection);
        if !path.exists() {
            return Ok(Collection::default());
        }
        let source = fs::read_to_string(&path)
            .map_err(|err| ToolError::external(SERVICE, operation, collection, err))?;
        let records: Vec<Value> = serde_json::from_str(&source)
            .map_err(|err| ToolError::external(SERVICE, operation, collection, err))?;
        Ok(Collection { records })
    }

    fn save(&self, collection: &str, operation: &'static str, data: &Collection) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&data.records)
            .map_err(|err| ToolError::external(SERVICE, operation, collection, err))?;
        atomic_write(&self.path(collection), &bytes)
            .map_err(|err| ToolError::external(SERVICE, operation, collection, err))?;
        trace!(collection, operation, records = data.records.len(), "collection saved");
        Ok(())
    }

    fn mutate<T>(
        &self,
        collection: &str,
        operation: &'static str,
        change: impl FnOnce(&mut Collection) -> (T, bool),
    ) -> Result<T> {
        let mut data = self.load(collection, operation)?;
        let (outcome, changed) = change(&mut data);
        if changed {
            self.save(collection, operation, &data)?;
        }
        Ok(outcome)
    }
}

impl DocumentStore for JsonDirStore {
    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        Ok(self.load(collection, "find_one")?.find_one(filter))
    }

    fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        Ok(self.load(collection, "find_many")?.find_many(filter))
    }

    fn insert_many(&mut self, collection: &str, documents: Vec<Value>) -> Result<()> {
        self.mutate(collection, "insert_many", |data| {
            let changed = !documents.is_empty();
            data.insert_many(documents);
            ((), changed)
        })
    }

    fn replace_one(&mut self, collection: &str, filter: &Filter, document: Value) -> Result<bool> {
        self.mutate(collection, "replace_one", |data| {
            let replaced = data.replace_one(filter, document);
            (replaced, replaced)
        })
    }

    fn update_one(&mut self, collection: &str, filter: &Filter, partial: &Value) -> Result<bool> {
        self.mutate(collection, "update_one", |data| {
            let updated = data.update(filter, partial, Some(1)) == 1;
            (updated, updated)
        })
    }

    fn update_many(&mut self, collection: &str, filter: &Filter, partial: &Value) -> Result<usize> {
        self.mutate(collection, "update_many", |data| {
            let updated = data.update(filter, partial, None);
            (updated, updated > 0)
        })
    }

    fn delete_one(&mut self, collection: &str, filter: &Filter) -> Result<bool> {
        self.mutate(collection, "delete_one", |data| {
            let deleted = data.delete(filter, Some(1)) == 1;
            (deleted, deleted)
        })
    }

    fn delete_many(&mut self, collection: &str, filter: &Filter) -> Result<usize> {
        self.mutate(collection, "delete_many", |data| {
            let deleted = data.delete(filter, None);
            (deleted, deleted > 0)
        })
    }
}
