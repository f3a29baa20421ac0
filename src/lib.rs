//! # Catalog JSON:API
//!
//! A schema-agnostic JSON:API mapping layer for catalog and tracking backends
//! (anime, manga, episodes, reviews, library entries and the like).
//!
//! ## Features
//!
//! - **Declarative Schema**: Resource types are described by [`ResourceDescriptor`]s, not code
//! - **Query Parsing**: `fields`, `include`, `filter`, `sort` and `page` parameters
//! - **Compound Documents**: Nested includes with de-duplicated `included` members
//! - **Polymorphic Relationships**: A tag field selects the target type per document
//! - **Derived Metrics**: Ratings, counts and popularity recomputed on read
//! - **Pluggable Storage**: In-memory and MongoDB backends behind [`DocumentStore`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use catalog::prelude::*;
//!
//! ServerBuilder::new()
//!     .with_store(InMemoryDocumentStore::new())
//!     .register(ResourceDescriptor::new("genres").attributes(["title", "description"]))?
//!     .register(
//!         ResourceDescriptor::new("anime")
//!             .attributes(["title", "synopsis"])
//!             .relationship(RelationshipDescriptor::to_many("genres", "genres")),
//!     )?
//!     .serve("127.0.0.1:5000")
//!     .await?;
//! ```
//!
//! [`ResourceDescriptor`]: crate::core::descriptor::ResourceDescriptor
//! [`DocumentStore`]: crate::storage::DocumentStore

pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Configuration ===
    pub use crate::config::{ApiConfig, PageConfig};

    // === Schema ===
    pub use crate::core::descriptor::{
        Cardinality, Linkage, RelationshipDescriptor, RelationshipTarget, ResourceDescriptor,
    };
    pub use crate::core::filter::Predicate;
    pub use crate::core::metrics::{EntryStats, MetricsSpec};
    pub use crate::core::query::SortKey;
    pub use crate::core::registry::ResourceRegistry;

    // === Documents and errors ===
    pub use crate::core::document::{DataDocument, LinkageDocument, StoredDoc};
    pub use crate::core::error::{ApiError, ApiResult, StorageError};

    // === Service ===
    pub use crate::core::service::ResourceService;

    // === Storage ===
    #[cfg(feature = "in-memory")]
    pub use crate::storage::InMemoryDocumentStore;
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoDocumentStore;
    pub use crate::storage::{DocumentStore, FindOptions};

    // === Server ===
    pub use crate::server::ServerBuilder;

    // === Re-exports from dependencies ===
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
