//! Storage contract and backends
//!
//! The mapping layer only talks to storage through [`DocumentStore`]. Each
//! resource type lives in its own collection, named after the type.

#[cfg(feature = "in-memory")]
pub mod in_memory;
#[cfg(feature = "mongodb_backend")]
pub mod mongodb;

#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryDocumentStore;
#[cfg(feature = "mongodb_backend")]
pub use mongodb::MongoDocumentStore;

use crate::core::document::StoredDoc;
use crate::core::error::StorageError;
use crate::core::filter::Predicate;
use crate::core::query::SortKey;
use async_trait::async_trait;

/// Result type of storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Parameters of a collection read
#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions {
    pub filter: Predicate,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    /// `None` reads to the end of the collection
    pub limit: Option<u64>,
}

impl FindOptions {
    /// Every document matching `filter`, unsorted
    pub fn matching(filter: Predicate) -> Self {
        Self {
            filter,
            sort: Vec::new(),
            skip: 0,
            limit: None,
        }
    }

    pub fn sorted(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn window(mut self, skip: u64, limit: u64) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }
}

/// Aggregate computed over the documents matching a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Mean of the numeric values of `field`; non-numeric and null values are skipped
    Average { field: String },
}

/// The narrow storage interface the mapping layer is written against
///
/// Implementations must provide per-document atomicity for `update`: only
/// the keys present in the patch are written.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document by id
    async fn find_one(&self, collection: &str, id: &str) -> StorageResult<Option<StoredDoc>>;

    /// Fetch the documents matching `options`
    async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<StoredDoc>>;

    /// Count the documents matching `filter`
    async fn count(&self, collection: &str, filter: &Predicate) -> StorageResult<u64>;

    /// Compute an aggregate; `None` when no document contributes a value
    async fn aggregate(
        &self,
        collection: &str,
        filter: &Predicate,
        aggregation: &Aggregation,
    ) -> StorageResult<Option<f64>>;

    /// Insert a document, assigning an id when it has none
    ///
    /// Returns the stored document.
    async fn insert(&self, collection: &str, doc: StoredDoc) -> StorageResult<StoredDoc>;

    /// Merge `patch` into an existing document
    ///
    /// Returns the updated document, or `StorageError::NotFound`.
    async fn update(&self, collection: &str, id: &str, patch: StoredDoc) -> StorageResult<StoredDoc>;

    /// Delete a document; returns whether it existed
    async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool>;
}

/// Document fields maintained by the stores themselves
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";
