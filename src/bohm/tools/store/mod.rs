//! Document store abstraction.
//!
//! Records are JSON documents grouped into named collections. The engine only
//! relies on filter-based CRUD; [`Repository`] layers the typed,
//! project-scoped operations on top.

use serde_json::{Map, Value};

use crate::bohm::tools::error::Result;

pub mod json_dir;
pub mod memory;
pub mod repository;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;
pub use repository::Repository;

pub const PROJECTS: &str = "projects";
pub const ELEMENTS: &str = "elements";
pub const ELEMENT_SNAPSHOTS: &str = "elementSnapshots";
pub const CLASSIFICATIONS: &str = "classifications";
pub const MIGRATIONS: &str = "migrations";

/// Record selector over dotted field paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// Field equals the value. `Null` also matches a missing field.
    Eq(String, Value),
    /// Field equals one of the values.
    In(String, Vec<Value>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(path.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(
        path: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In(path.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::All => other,
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            filter => Self::And(vec![filter, other]),
        }
    }

    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Eq(path, expected) => match lookup(record, path) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            },
            Self::In(path, values) => {
                lookup(record, path).is_some_and(|actual| values.contains(actual))
            }
            Self::And(filters) => filters.iter().all(|filter| filter.matches(record)),
        }
    }
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |value, segment| value.get(segment))
}

/// Sets each top-level key of `partial` on `record`. Dotted keys address
/// nested fields, creating intermediate objects as needed.
pub fn apply_update(record: &mut Value, partial: &Value) {
    let Some(fields) = partial.as_object() else {
        return;
    };
    for (path, value) in fields {
        let mut target = &mut *record;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            let Value::Object(object) = target else {
                break;
            };
            if segments.peek().is_none() {
                object.insert(segment.to_string(), value.clone());
                break;
            }
            target = object
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }
}

/// Filter-based CRUD over JSON records.
///
/// Implementations surface their failures as `ExternalService` errors naming
/// the collection and operation.
pub trait DocumentStore {
    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>>;

    fn find_all(&self, collection: &str) -> Result<Vec<Value>> {
        self.find_many(collection, &Filter::All)
    }

    fn insert_one(&mut self, collection: &str, document: Value) -> Result<()> {
        self.insert_many(collection, vec![document])
    }

    fn insert_many(&mut self, collection: &str, documents: Vec<Value>) -> Result<()>;

    /// Replaces the first match. Returns whether a record matched.
    fn replace_one(&mut self, collection: &str, filter: &Filter, document: Value) -> Result<bool>;

    fn update_one(&mut self, collection: &str, filter: &Filter, partial: &Value) -> Result<bool>;

    fn update_many(&mut self, collection: &str, filter: &Filter, partial: &Value) -> Result<usize>;

    fn delete_one(&mut self, collection: &str, filter: &Filter) -> Result<bool>;

    fn delete_many(&mut self, collection: &str, filter: &Filter) -> Result<usize>;
}

/// The records of one collection with the CRUD semantics shared by the
/// bundled stores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub records: Vec<Value>,
}

impl Collection {
    pub fn find_one(&self, filter: &Filter) -> Option<Value> {
        self.records
            .iter()
            .find(|record| filter.matches(record))
            .cloned()
    }

    pub fn find_many(&self, filter: &Filter) -> Vec<Value> {
        self.records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect()
    }

    pub fn insert_many(&mut self, documents: Vec<Value>) {
        self.records.extend(documents);
    }

    pub fn replace_one(&mut self, filter: &Filter, document: Value) -> bool {
        match self.records.iter_mut().find(|record| filter.matches(record)) {
            Some(record) => {
                *record = document;
                true
            }
            None => false,
        }
    }

    pub fn update(&mut self, filter: &Filter, partial: &Value, limit: Option<usize>) -> usize {
        let mut updated = 0;
        for record in self.records.iter_mut() {
            if limit.is_some_and(|limit| updated >= limit) {
                break;
            }
            if filter.matches(record) {
                apply_update(record, partial);
                updated += 1;
            }
        }
        updated
    }

    pub fn delete(&mut self, filter: &Filter, limit: Option<usize>) -> usize {
        let mut deleted = 0;
        self.records.retain(|record| {
            let remove = limit.is_none_or(|limit| deleted < limit) && filter.matches(record);
            if remove {
                deleted += 1;
            }
            !remove
        });
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filters_match_nested_fields() {
        let record = json!({"guid": "G1", "classification": {"code": "Pr_20"}});
        assert!(Filter::eq("classification.code", "Pr_20").matches(&record));
        assert!(Filter::eq("projectCode", Value::Null).matches(&record));
        assert!(Filter::is_in("guid", ["G0", "G1"]).matches(&record));
        assert!(!Filter::eq("guid", "G1").and(Filter::eq("projectCode", "P")).matches(&record));
    }

    #[test]
    fn updates_set_dotted_keys() {
        let mut record = json!({"name": "a", "libraryPart": {"index": "1"}});
        apply_update(&mut record, &json!({"name": "b", "libraryPart.uniqueId": "U"}));
        assert_eq!(record, json!({"name": "b", "libraryPart": {"index": "1", "uniqueId": "U"}}));
    }

    #[test]
    fn limited_delete_removes_first_match_only() {
        let mut collection = Collection {
            records: vec![json!({"k": 1}), json!({"k": 1}), json!({"k": 2})],
        };
        assert_eq!(collection.delete(&Filter::eq("k", 1), Some(1)), 1);
        assert_eq!(collection.records.len(), 2);
        assert_eq!(collection.delete(&Filter::All, None), 2);
    }
}
