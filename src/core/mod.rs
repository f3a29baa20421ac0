//! Core mapping layer: descriptors, query parsing, document translation
//! and derived metrics

pub mod descriptor;
pub mod deserializer;
pub mod document;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod pagination;
pub mod query;
pub mod registry;
pub mod serializer;
pub mod service;

pub use descriptor::{
    Cardinality, Linkage, RelationshipDescriptor, RelationshipTarget, ResourceDescriptor,
};
pub use deserializer::Deserializer;
pub use document::{DataDocument, LinkageDocument, ResourceIdentifier, ResourceObject, StoredDoc};
pub use error::{ApiError, ApiResult, StorageError};
pub use filter::{FilterResolver, Predicate};
pub use metrics::{EntryStats, MetricsRecomputer, MetricsSpec, popularity};
pub use pagination::{PageOffsets, Paginator};
pub use query::{Page, Query, QueryParser, SortDirection, SortKey};
pub use registry::ResourceRegistry;
pub use serializer::{IncludeTree, Serializer};
pub use service::ResourceService;
