//! Derived-metric recomputation
//!
//! Some resource types carry statistics derived from other collections
//! (number of seasons, average rating of user entries, popularity, ...).
//! They are recomputed whenever one document is read by primary key and
//! written back in a single partial update that touches nothing else.

use crate::core::descriptor::ResourceDescriptor;
use crate::core::document::StoredDoc;
use crate::core::filter::Predicate;
use crate::storage::{Aggregation, DocumentStore, StorageResult};
use chrono::{Duration, SecondsFormat, Utc};
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::{Value, json};

pub const AVERAGE_RATING: &str = "averageRating";
pub const USER_COUNT: &str = "userCount";
pub const FAVORITES_COUNT: &str = "favoritesCount";
pub const POPULARITY: &str = "popularity";

/// A count of documents in another collection pointing at this one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCount {
    /// Field of this document receiving the count (e.g. `episodeCount`)
    pub field: String,
    pub collection: String,
    /// Field of the child documents holding this document's id
    pub foreign_field: String,
}

impl ChildCount {
    pub fn new(
        field: impl Into<String>,
        collection: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            collection: collection.into(),
            foreign_field: foreign_field.into(),
        }
    }
}

/// Where user library entries live and how they are flagged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStats {
    pub collection: String,
    pub foreign_field: String,
    pub rating_field: String,
    /// Boolean flag counted into `userCount`
    pub user_flag: String,
    /// Boolean flag counted into `favoritesCount`
    pub favorites_flag: String,
    /// Timestamp used to count recently updated entries
    pub updated_field: String,
}

impl EntryStats {
    /// Entry collection with the conventional field names
    /// (`rating`, `isAdd`, `isFavorites`, `updatedAt`)
    pub fn new(collection: impl Into<String>, foreign_field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            foreign_field: foreign_field.into(),
            rating_field: "rating".to_string(),
            user_flag: "isAdd".to_string(),
            favorites_flag: "isFavorites".to_string(),
            updated_field: "updatedAt".to_string(),
        }
    }

    pub fn rating_field(mut self, field: impl Into<String>) -> Self {
        self.rating_field = field.into();
        self
    }

    pub fn flags(mut self, user_flag: impl Into<String>, favorites_flag: impl Into<String>) -> Self {
        self.user_flag = user_flag.into();
        self.favorites_flag = favorites_flag.into();
        self
    }
}

/// Derived metrics declared by a resource type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSpec {
    pub child_counts: Vec<ChildCount>,
    pub entries: Option<EntryStats>,
}

impl MetricsSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a child count (`seasonCount`, `reviewCount`, ...)
    pub fn count(
        mut self,
        field: impl Into<String>,
        collection: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        self.child_counts
            .push(ChildCount::new(field, collection, foreign_field));
        self
    }

    /// Enable rating, user, favorites and popularity statistics
    pub fn entries(mut self, entries: EntryStats) -> Self {
        self.entries = Some(entries);
        self
    }

    /// Names of every field written by the recomputation
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.child_counts.iter().map(|c| c.field.as_str()).collect();
        if self.entries.is_some() {
            fields.extend([AVERAGE_RATING, USER_COUNT, FAVORITES_COUNT, POPULARITY]);
        }
        fields
    }
}

/// Statistics derived from user entries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryMetrics {
    /// `None` when no entry carries a rating
    pub average_rating: Option<f64>,
    pub user_count: u64,
    pub favorites_count: u64,
    pub popularity: i64,
}

/// One freshly computed metrics object
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub counts: IndexMap<String, u64>,
    pub entries: Option<EntryMetrics>,
}

impl DerivedMetrics {
    /// Partial update writing exactly the derived-metric fields
    pub fn to_patch(&self) -> StoredDoc {
        let mut patch = StoredDoc::new();
        for (field, count) in &self.counts {
            patch.insert(field.clone(), json!(count));
        }
        if let Some(entries) = &self.entries {
            patch.insert(
                AVERAGE_RATING.to_string(),
                entries.average_rating.map_or(Value::Null, |avg| json!(avg)),
            );
            patch.insert(USER_COUNT.to_string(), json!(entries.user_count));
            patch.insert(FAVORITES_COUNT.to_string(), json!(entries.favorites_count));
            patch.insert(POPULARITY.to_string(), json!(entries.popularity));
        }
        patch
    }
}

/// `user + fav + user*avg + 2*recent*avg*(user+fav)`, truncated toward zero
///
/// A missing average counts as 0.
pub fn popularity(user_count: u64, favorites_count: u64, average_rating: Option<f64>, recent: u64) -> i64 {
    let avg = average_rating.unwrap_or(0.0);
    let user = user_count as f64;
    let favorites = favorites_count as f64;
    let recent = recent as f64;

    let score = user + favorites + user * avg + 2.0 * recent * avg * (user + favorites);
    score.trunc() as i64
}

/// Recomputes and persists the derived metrics of single documents
#[derive(Debug, Clone, Copy)]
pub struct MetricsRecomputer {
    recent_window_days: i64,
}

impl MetricsRecomputer {
    pub fn new(recent_window_days: i64) -> Self {
        Self { recent_window_days }
    }

    /// Refresh the metrics of `doc` and return the persisted document
    ///
    /// On any failure the document is returned with its previous metrics.
    pub async fn recompute(
        &self,
        store: &dyn DocumentStore,
        descriptor: &ResourceDescriptor,
        doc: StoredDoc,
    ) -> StoredDoc {
        let Some(spec) = &descriptor.metrics else {
            return doc;
        };
        let Some(id) = doc.get("id").and_then(Value::as_str).map(str::to_string) else {
            return doc;
        };

        let metrics = match self.compute(store, spec, &id).await {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::warn!(
                    resource_type = %descriptor.type_name,
                    id = %id,
                    error = %e,
                    "metric recomputation aborted, serving last persisted values"
                );
                return doc;
            }
        };

        match store
            .update(&descriptor.type_name, &id, metrics.to_patch())
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(
                    resource_type = %descriptor.type_name,
                    id = %id,
                    error = %e,
                    "failed to persist derived metrics"
                );
                doc
            }
        }
    }

    /// Issue every count and aggregate concurrently
    pub async fn compute(
        &self,
        store: &dyn DocumentStore,
        spec: &MetricsSpec,
        id: &str,
    ) -> StorageResult<DerivedMetrics> {
        let counts = try_join_all(spec.child_counts.iter().map(|child| async move {
            let filter = Predicate::eq(child.foreign_field.as_str(), id);
            let count = store.count(&child.collection, &filter).await?;
            Ok::<_, crate::core::error::StorageError>((child.field.clone(), count))
        }));

        let entries = async {
            match &spec.entries {
                Some(entries) => self.entry_metrics(store, entries, id).await.map(Some),
                None => Ok(None),
            }
        };

        let (counts, entries) = futures::try_join!(counts, entries)?;

        Ok(DerivedMetrics {
            counts: counts.into_iter().collect(),
            entries,
        })
    }

    async fn entry_metrics(
        &self,
        store: &dyn DocumentStore,
        entries: &EntryStats,
        id: &str,
    ) -> StorageResult<EntryMetrics> {
        let owned = || Predicate::eq(entries.foreign_field.as_str(), id);
        let cutoff = (Utc::now() - Duration::days(self.recent_window_days))
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        let average = Aggregation::Average {
            field: entries.rating_field.clone(),
        };
        let with_owned = |p: Predicate| Predicate::and([owned(), p]);
        let all_entries = owned();
        let users = with_owned(Predicate::eq(entries.user_flag.as_str(), true));
        let favorites = with_owned(Predicate::eq(entries.favorites_flag.as_str(), true));
        let recent = with_owned(Predicate::gte(entries.updated_field.as_str(), cutoff));

        let (average_rating, user_count, favorites_count, recent_count) = futures::try_join!(
            store.aggregate(&entries.collection, &all_entries, &average),
            store.count(&entries.collection, &users),
            store.count(&entries.collection, &favorites),
            store.count(&entries.collection, &recent),
        )?;

        Ok(EntryMetrics {
            average_rating,
            user_count,
            favorites_count,
            popularity: popularity(user_count, favorites_count, average_rating, recent_count),
        })
    }
}
