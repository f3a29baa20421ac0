//! In-memory implementation of DocumentStore for testing and development

use crate::core::document::StoredDoc;
use crate::core::error::StorageError;
use crate::core::filter::Predicate;
use crate::core::query::{SortDirection, SortKey};
use crate::storage::{Aggregation, CREATED_AT, DocumentStore, FindOptions, StorageResult, UPDATED_AT};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

const BACKEND: &str = "in-memory";

type Collections = HashMap<String, IndexMap<String, StoredDoc>>;

/// In-memory document store
///
/// Useful for testing and development. Uses RwLock for thread-safe access;
/// no lock is ever held across an await point.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    /// Collection name -> field groups that must be unique together
    unique_indexes: Arc<HashMap<String, Vec<Vec<String>>>>,
}

impl InMemoryDocumentStore {
    /// Create a new, empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce uniqueness of the combination of `fields` within `collection`
    ///
    /// Documents missing any of the fields are not constrained.
    pub fn with_unique_index<I, S>(mut self, collection: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut indexes = (*self.unique_indexes).clone();
        indexes
            .entry(collection.into())
            .or_default()
            .push(fields.into_iter().map(Into::into).collect());
        self.unique_indexes = Arc::new(indexes);
        self
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|e| StorageError::backend(BACKEND, format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|e| StorageError::backend(BACKEND, format!("Failed to acquire write lock: {}", e)))
    }

    fn check_unique(
        &self,
        collection: &str,
        docs: &IndexMap<String, StoredDoc>,
        candidate_id: &str,
        candidate: &StoredDoc,
    ) -> StorageResult<()> {
        let Some(indexes) = self.unique_indexes.get(collection) else {
            return Ok(());
        };

        for fields in indexes {
            let key: Option<Vec<&Value>> = fields
                .iter()
                .map(|f| candidate.get(f).filter(|v| !v.is_null()))
                .collect();
            let Some(key) = key else { continue };

            let clash = docs.iter().any(|(id, other)| {
                id != candidate_id
                    && fields
                        .iter()
                        .zip(&key)
                        .all(|(f, v)| other.get(f).is_some_and(|o| values_equal(o, v)))
            });

            if clash {
                return Err(StorageError::DuplicateKey {
                    collection: collection.to_string(),
                    message: format!("unique index on ({}) violated", fields.join(", ")),
                });
            }
        }
        Ok(())
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_one(&self, collection: &str, id: &str) -> StorageResult<Option<StoredDoc>> {
        let collections = self.read()?;
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<StoredDoc>> {
        let collections = self.read()?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&StoredDoc> = docs
            .values()
            .filter(|doc| matches(doc, &options.filter))
            .collect();

        if !options.sort.is_empty() {
            matched.sort_by(|a, b| compare_docs(a, b, &options.sort));
        }

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(matched.into_iter().skip(skip).take(limit).cloned().collect())
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> StorageResult<u64> {
        let collections = self.read()?;
        let count = collections
            .get(collection)
            .map(|docs| docs.values().filter(|doc| matches(doc, filter)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn aggregate(
        &self,
        collection: &str,
        filter: &Predicate,
        aggregation: &Aggregation,
    ) -> StorageResult<Option<f64>> {
        let collections = self.read()?;
        let Some(docs) = collections.get(collection) else {
            return Ok(None);
        };

        match aggregation {
            Aggregation::Average { field } => {
                let values: Vec<f64> = docs
                    .values()
                    .filter(|doc| matches(doc, filter))
                    .filter_map(|doc| lookup(doc, field).and_then(Value::as_f64))
                    .collect();
                if values.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
                }
            }
        }
    }

    async fn insert(&self, collection: &str, mut doc: StoredDoc) -> StorageResult<StoredDoc> {
        let id = match doc.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => Uuid::new_v4().to_string(),
            Some(other) => {
                return Err(StorageError::InvalidDocument(format!(
                    "id must be a string, got {}",
                    other
                )));
            }
        };
        doc.insert("id".to_string(), Value::String(id.clone()));

        let timestamp = now();
        doc.entry(CREATED_AT.to_string())
            .or_insert_with(|| timestamp.clone());
        doc.entry(UPDATED_AT.to_string()).or_insert(timestamp);

        let mut collections = self.write()?;
        let docs = collections.entry(collection.to_string()).or_default();

        if docs.contains_key(&id) {
            return Err(StorageError::DuplicateKey {
                collection: collection.to_string(),
                message: format!("id '{}' already exists", id),
            });
        }
        self.check_unique(collection, docs, &id, &doc)?;

        docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: &str, mut patch: StoredDoc) -> StorageResult<StoredDoc> {
        patch.remove("id");

        let mut collections = self.write()?;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        let mut merged = docs
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        for (key, value) in patch {
            merged.insert(key, value);
        }

        self.check_unique(collection, docs, id, &merged)?;
        docs.insert(id.to_string(), merged.clone());
        Ok(merged)
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool> {
        let mut collections = self.write()?;
        Ok(collections
            .get_mut(collection)
            .and_then(|docs| docs.shift_remove(id))
            .is_some())
    }
}

// ---------------------------------------------------------------------------
// Predicate evaluation
// ---------------------------------------------------------------------------

/// Resolve a dotted field path inside a document
fn lookup<'a>(doc: &'a StoredDoc, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn matches(doc: &StoredDoc, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::All => true,
        Predicate::Eq { field, value } => {
            lookup(doc, field).is_some_and(|stored| contains_or_equals(stored, value))
        }
        Predicate::In { field, values } => lookup(doc, field)
            .is_some_and(|stored| values.iter().any(|v| contains_or_equals(stored, v))),
        Predicate::Gte { field, value } => lookup(doc, field)
            .filter(|stored| !stored.is_null())
            .is_some_and(|stored| compare_values(stored, value) != Ordering::Less),
        Predicate::Search { text, fields } => {
            let terms: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
            !terms.is_empty()
                && terms.iter().all(|term| {
                    fields
                        .iter()
                        .filter_map(|f| lookup(doc, f))
                        .any(|v| text_contains(v, term))
                })
        }
        Predicate::And(parts) => parts.iter().all(|p| matches(doc, p)),
    }
}

/// Array fields match when any element equals the value
fn contains_or_equals(stored: &Value, value: &Value) -> bool {
    match stored {
        Value::Array(items) => items.iter().any(|item| values_equal(item, value)),
        other => values_equal(other, value),
    }
}

/// Equality that tolerates filter values arriving as strings
fn values_equal(stored: &Value, value: &Value) -> bool {
    if stored == value {
        return true;
    }
    match (scalar_text(stored), scalar_text(value)) {
        (Some(a), Some(b)) => {
            if a == b {
                return true;
            }
            match (a.parse::<f64>(), b.parse::<f64>()) {
                (Ok(x), Ok(y)) => x == y,
                _ => false,
            }
        }
        _ => false,
    }
}

/// Textual form of a scalar, or of the id of a populated document
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Object(map) => map.get("id").and_then(scalar_text),
        Value::Array(_) => None,
    }
}

fn text_contains(value: &Value, term: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(term),
        Value::Array(items) => items.iter().any(|v| text_contains(v, term)),
        Value::Object(map) => map.values().any(|v| text_contains(v, term)),
        _ => false,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values: null first, then numbers, strings, ...
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::String(y)) | (Value::String(y), Value::Number(x))
            if y.parse::<f64>().is_ok() =>
        {
            let ordering = x
                .as_f64()
                .unwrap_or(0.0)
                .partial_cmp(&y.parse::<f64>().unwrap_or(0.0))
                .unwrap_or(Ordering::Equal);
            if matches!(a, Value::Number(_)) {
                ordering
            } else {
                ordering.reverse()
            }
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_docs(a: &StoredDoc, b: &StoredDoc, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let left = lookup(a, &key.field).unwrap_or(&Value::Null);
        let right = lookup(b, &key.field).unwrap_or(&Value::Null);
        let ordering = match key.direction {
            SortDirection::Asc => compare_values(left, right),
            SortDirection::Desc => compare_values(right, left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
