//! MongoDB storage backend using the official MongoDB async driver.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag:
//! ```toml
//! [dependencies]
//! catalog-jsonapi = { version = "0.1", features = ["mongodb_backend"] }
//! ```
//!
//! # Storage model
//!
//! One collection per resource type, named after the type. The `id` key of a
//! [`StoredDoc`] is mapped to MongoDB's `_id` convention. Free-text search
//! predicates require a text index over the searchable fields of the
//! collection.

use crate::core::document::StoredDoc;
use crate::core::error::StorageError;
use crate::core::filter::Predicate;
use crate::core::query::{SortDirection, SortKey};
use crate::storage::{Aggregation, CREATED_AT, DocumentStore, FindOptions, StorageResult, UPDATED_AT};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::TryStreamExt;
use mongodb::Database;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use serde_json::Value;
use uuid::Uuid;

const BACKEND: &str = "mongodb";
const DUPLICATE_KEY_CODE: i32 = 11000;

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

/// Convert a stored document into a BSON Document, renaming `id` → `_id`.
fn to_document(stored: StoredDoc) -> StorageResult<Document> {
    let bson_val = mongodb::bson::to_bson(&Value::Object(stored))
        .map_err(|e| StorageError::InvalidDocument(format!("Failed to convert JSON to BSON: {}", e)))?;

    let mut doc = match bson_val {
        Bson::Document(d) => d,
        _ => {
            return Err(StorageError::InvalidDocument(
                "Expected BSON document, got non-object".to_string(),
            ));
        }
    };

    if let Some(id) = doc.remove("id") {
        doc.insert("_id", id);
    }

    Ok(doc)
}

/// Convert a BSON Document back into a stored document, renaming `_id` → `id`.
fn from_document(mut doc: Document) -> StoredDoc {
    if let Some(id) = doc.remove("_id") {
        doc.insert("id", id);
    }

    match Bson::Document(doc).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => StoredDoc::new(),
    }
}

fn field_name(field: &str) -> &str {
    if field == "id" { "_id" } else { field }
}

fn to_bson(value: &Value) -> StorageResult<Bson> {
    mongodb::bson::to_bson(value)
        .map_err(|e| StorageError::InvalidDocument(format!("Failed to convert JSON to BSON: {}", e)))
}

/// Every BSON value a textual filter value may be stored as
fn loose_candidates(value: &Value) -> StorageResult<Vec<Bson>> {
    let mut candidates = vec![to_bson(value)?];
    if let Value::String(text) = value {
        if let Ok(n) = text.parse::<i64>() {
            candidates.push(Bson::Int64(n));
            if let Ok(small) = i32::try_from(n) {
                candidates.push(Bson::Int32(small));
            }
        }
        if let Ok(f) = text.parse::<f64>() {
            candidates.push(Bson::Double(f));
        }
        if let Ok(b) = text.parse::<bool>() {
            candidates.push(Bson::Boolean(b));
        }
    }
    Ok(candidates)
}

/// Translate a predicate into a MongoDB query filter
fn predicate_to_filter(predicate: &Predicate) -> StorageResult<Document> {
    Ok(match predicate {
        Predicate::All => doc! {},
        Predicate::Eq { field, value } => {
            doc! { field_name(field): { "$in": loose_candidates(value)? } }
        }
        Predicate::In { field, values } => {
            let mut candidates = Vec::new();
            for value in values {
                candidates.extend(loose_candidates(value)?);
            }
            doc! { field_name(field): { "$in": candidates } }
        }
        Predicate::Gte { field, value } => {
            doc! { field_name(field): { "$gte": to_bson(value)? } }
        }
        Predicate::Search { text, .. } => doc! { "$text": { "$search": text.as_str() } },
        Predicate::And(parts) => {
            let parts = parts
                .iter()
                .map(predicate_to_filter)
                .collect::<StorageResult<Vec<Document>>>()?;
            doc! { "$and": parts }
        }
    })
}

fn sort_document(sort: &[SortKey]) -> Document {
    let mut document = Document::new();
    for key in sort {
        let direction = match key.direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        document.insert(field_name(&key.field), direction);
    }
    document
}

fn backend_error(context: &str, e: mongodb::error::Error) -> StorageError {
    StorageError::backend(BACKEND, format!("{}: {}", context, e))
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        _ => e.to_string().contains("E11000"),
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

// ---------------------------------------------------------------------------
// MongoDocumentStore
// ---------------------------------------------------------------------------

/// Document store backed by MongoDB.
///
/// # Example
///
/// ```rust,ignore
/// use mongodb::Client;
/// use catalog::storage::MongoDocumentStore;
///
/// let client = Client::with_uri_str("mongodb://localhost:27017").await?;
/// let store = MongoDocumentStore::new(client.database("catalog"));
/// ```
#[derive(Clone, Debug)]
pub struct MongoDocumentStore {
    database: Database,
}

impl MongoDocumentStore {
    /// Create a new `MongoDocumentStore` with the given database handle.
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Get a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.database.collection(name)
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn find_one(&self, collection: &str, id: &str) -> StorageResult<Option<StoredDoc>> {
        let doc = self
            .collection(collection)
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| backend_error("Failed to get document", e))?;

        Ok(doc.map(from_document))
    }

    async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<StoredDoc>> {
        let coll = self.collection(collection);
        let mut action = coll
            .find(predicate_to_filter(&options.filter)?)
            .skip(options.skip);

        if !options.sort.is_empty() {
            action = action.sort(sort_document(&options.sort));
        }
        if let Some(limit) = options.limit {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let cursor = action
            .await
            .map_err(|e| backend_error("Failed to find documents", e))?;

        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| backend_error("Failed to collect documents", e))?;

        Ok(docs.into_iter().map(from_document).collect())
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> StorageResult<u64> {
        self.collection(collection)
            .count_documents(predicate_to_filter(filter)?)
            .await
            .map_err(|e| backend_error("Failed to count documents", e))
    }

    async fn aggregate(
        &self,
        collection: &str,
        filter: &Predicate,
        aggregation: &Aggregation,
    ) -> StorageResult<Option<f64>> {
        let Aggregation::Average { field } = aggregation;
        let pipeline = vec![
            doc! { "$match": predicate_to_filter(filter)? },
            doc! { "$group": { "_id": Bson::Null, "value": { "$avg": format!("${}", field) } } },
        ];

        let cursor = self
            .collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| backend_error("Failed to aggregate", e))?;

        let results: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| backend_error("Failed to collect aggregate", e))?;

        Ok(results.first().and_then(|d| match d.get("value") {
            Some(Bson::Double(v)) => Some(*v),
            Some(Bson::Int32(v)) => Some(f64::from(*v)),
            Some(Bson::Int64(v)) => Some(*v as f64),
            _ => None,
        }))
    }

    async fn insert(&self, collection: &str, mut stored: StoredDoc) -> StorageResult<StoredDoc> {
        if !matches!(stored.get("id"), Some(Value::String(_))) {
            stored.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        let timestamp = now();
        stored
            .entry(CREATED_AT.to_string())
            .or_insert_with(|| timestamp.clone());
        stored.entry(UPDATED_AT.to_string()).or_insert(timestamp);

        self.collection(collection)
            .insert_one(to_document(stored.clone())?)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    StorageError::DuplicateKey {
                        collection: collection.to_string(),
                        message: e.to_string(),
                    }
                } else {
                    backend_error("Failed to insert document", e)
                }
            })?;

        Ok(stored)
    }

    async fn update(&self, collection: &str, id: &str, mut patch: StoredDoc) -> StorageResult<StoredDoc> {
        patch.remove("id");

        let updated = if patch.is_empty() {
            self.collection(collection)
                .find_one(doc! { "_id": id })
                .await
                .map_err(|e| backend_error("Failed to get document", e))?
        } else {
            self.collection(collection)
                .find_one_and_update(doc! { "_id": id }, doc! { "$set": to_document(patch)? })
                .return_document(ReturnDocument::After)
                .await
                .map_err(|e| {
                    if is_duplicate_key(&e) {
                        StorageError::DuplicateKey {
                            collection: collection.to_string(),
                            message: e.to_string(),
                        }
                    } else {
                        backend_error("Failed to update document", e)
                    }
                })?
        };

        updated.map(from_document).ok_or_else(|| StorageError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool> {
        let result = self
            .collection(collection)
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|e| backend_error("Failed to delete document", e))?;

        Ok(result.deleted_count > 0)
    }
}
