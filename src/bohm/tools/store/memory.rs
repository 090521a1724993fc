use std::collections::BTreeMap;

use serde_json::Value;

use crate::bohm::tools::error::Result;
use crate::bohm::tools::store::{Collection, DocumentStore, Filter};

/// Volatile store keeping every collection in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    collections: BTreeMap<String, Collection>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of insert, replace, update and delete calls that changed data.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map_or(0, |collection| collection.records.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn collection_mut(&mut self, name: &str) -> &mut Collection {
        self.collections.entry(name.to_string()).or_default()
    }

    fn count_write(&mut self, changed: bool) {
        if changed {
            self.writes += 1;
        }
    }
}

impl DocumentStore for MemoryStore {
    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|collection| collection.find_one(filter)))
    }

    fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        Ok(self
            .collections
            .get(collection)
            .map(|collection| collection.find_many(filter))
            .unwrap_or_default())
    }

    fn insert_many(&mut self, collection: &str, documents: Vec<Value>) -> Result<()> {
        let changed = !documents.is_empty();
        self.collection_mut(collection).insert_many(documents);
        self.count_write(changed);
        Ok(())
    }

    fn replace_one(&mut self, collection: &str, filter: &Filter, document: Value) -> Result<bool> {
        let replaced = self.collection_mut(collection).replace_one(filter, document);
        self.count_write(replaced);
        Ok(replaced)
    }

    fn update_one(&mut self, collection: &str, filter: &Filter, partial: &Value) -> Result<bool> {
        let updated = self.collection_mut(collection).update(filter, partial, Some(1)) == 1;
        self.count_write(updated);
        Ok(updated)
    }

    fn update_many(&mut self, collection: &str, filter: &Filter, partial: &Value) -> Result<usize> {
        let updated = self.collection_mut(collection).update(filter, partial, None);
        self.count_write(updated > 0);
        Ok(updated)
    }

    fn delete_one(&mut self, collection: &str, filter: &Filter) -> Result<bool> {
        let deleted = self.collection_mut(collection).delete(filter, Some(1)) == 1;
        self.count_write(deleted);
        Ok(deleted)
    }

    fn delete_many(&mut self, collection: &str, filter: &Filter) -> Result<usize> {
        let deleted = self.collection_mut(collection).delete(filter, None);
        self.count_write(deleted > 0);
        Ok(deleted)
    }
}
