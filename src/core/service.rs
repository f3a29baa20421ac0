//! Request orchestration
//!
//! [`ResourceService`] wires the query parser, filter resolver, storage,
//! metric recomputation, serializer and paginator together for each kind of
//! request. It is cheap to clone and holds no per-request state.
//!
//! Authorization is not decided here: callers check ownership before
//! invoking a mutation and report refusals as
//! [`ApiError::PermissionDenied`](crate::core::error::ApiError::PermissionDenied).

use crate::config::ApiConfig;
use crate::core::descriptor::{Cardinality, Linkage, RelationshipTarget, ResourceDescriptor};
use crate::core::deserializer::Deserializer;
use crate::core::document::{
    DataDocument, LinkageDocument, RelationshipData, RelationshipLinks, ResourceIdentifier, StoredDoc,
};
use crate::core::error::{ApiError, ApiResult};
use crate::core::filter::{FilterResolver, Predicate};
use crate::core::metrics::MetricsRecomputer;
use crate::core::pagination::Paginator;
use crate::core::query::{Query, QueryParser, SortKey};
use crate::core::registry::ResourceRegistry;
use crate::core::serializer::{Serializer, id_of};
use crate::storage::{DocumentStore, FindOptions, UPDATED_AT};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Entry point of the mapping layer for one backend
#[derive(Clone)]
pub struct ResourceService {
    config: Arc<ApiConfig>,
    registry: Arc<ResourceRegistry>,
    store: Arc<dyn DocumentStore>,
}

impl ResourceService {
    pub fn new(config: ApiConfig, registry: ResourceRegistry, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            store,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Clone using a different public base URL for generated links
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        Self {
            config: Arc::new(self.config.with_base_url(base_url)),
            ..self.clone()
        }
    }

    fn serializer(&self) -> Serializer<'_> {
        Serializer::new(&self.config, &self.registry, self.store.as_ref())
    }

    fn parse(&self, raw_query: &str, resource_type: &str) -> ApiResult<Query> {
        QueryParser::new(&self.config, &self.registry).parse(raw_query, resource_type)
    }

    fn recomputer(&self) -> MetricsRecomputer {
        MetricsRecomputer::new(self.config.recent_window_days)
    }

    /// Fetch a document by id, failing with `NotFound`
    async fn load(&self, descriptor: &ResourceDescriptor, id: &str) -> ApiResult<StoredDoc> {
        self.store
            .find_one(&descriptor.type_name, id)
            .await?
            .ok_or_else(|| ApiError::not_found(descriptor.type_name.clone(), id))
    }

    /// Paginated, filtered, sorted collection
    pub async fn list(&self, resource_type: &str, raw_query: &str, request_url: &str) -> ApiResult<DataDocument> {
        let descriptor = self.registry.require(resource_type)?;
        let query = self.parse(raw_query, resource_type)?;
        let filter = FilterResolver::resolve(descriptor, &query.filters)?;

        self.page_of(resource_type, filter, query.sort.clone(), &query, request_url)
            .await
    }

    /// Single resource by primary key, with freshly recomputed metrics
    pub async fn find_by_id(&self, resource_type: &str, id: &str, raw_query: &str) -> ApiResult<DataDocument> {
        let descriptor = self.registry.require(resource_type)?;
        let query = self.parse(raw_query, resource_type)?;

        let doc = self.load(descriptor, id).await?;
        let doc = self
            .recomputer()
            .recompute(self.store.as_ref(), descriptor, doc)
            .await;

        tracing::debug!(resource_type, id, "serving resource");
        self.serializer()
            .serialize_one(Some(doc), &query, resource_type)
            .await
    }

    /// Resources one relationship of a document points at
    ///
    /// To-one relationships yield a single resource (or `null`); to-many
    /// relationships yield a paginated collection.
    pub async fn find_related(
        &self,
        resource_type: &str,
        id: &str,
        relationship: &str,
        raw_query: &str,
        request_url: &str,
    ) -> ApiResult<DataDocument> {
        let descriptor = self.registry.require(resource_type)?;
        let rel = descriptor.relationship_named(relationship).ok_or_else(|| {
            ApiError::not_found(format!("{} relationship", resource_type), relationship)
        })?;
        let target_types = rel.target.target_types();
        let query_type = target_types.first().copied().unwrap_or(resource_type);
        let query = self.parse(raw_query, query_type)?;

        let doc = self.load(descriptor, id).await?;

        if let (Cardinality::Many, Linkage::Reverse { foreign_field }, RelationshipTarget::Fixed(target)) =
            (rel.cardinality, &rel.linkage, &rel.target)
        {
            let target_descriptor = self.registry.require(target)?;
            let filter = Predicate::and([
                Predicate::eq(foreign_field.as_str(), id),
                FilterResolver::resolve(target_descriptor, &query.filters)?,
            ]);
            let sort = if query.sort.is_empty() {
                rel.sort.clone()
            } else {
                query.sort.clone()
            };
            return self.page_of(target, filter, sort, &query, request_url).await;
        }

        let serializer = self.serializer();
        let related = serializer.related(resource_type, doc, relationship).await?;

        match rel.cardinality {
            Cardinality::One => {
                serializer
                    .serialize_related(related, &query, Cardinality::One)
                    .await
            }
            Cardinality::Many => {
                let total = related.len() as u64;
                let window: Vec<_> = related
                    .into_iter()
                    .skip(usize::try_from(query.page.offset).unwrap_or(usize::MAX))
                    .take(usize::try_from(query.page.limit).unwrap_or(usize::MAX))
                    .collect();
                let mut document = serializer
                    .serialize_related(window, &query, Cardinality::Many)
                    .await?;
                let (links, meta) = Paginator::new(&self.config).paginate(total, request_url, &query.page)?;
                document.links = Some(links);
                document.meta = Some(meta);
                Ok(document)
            }
        }
    }

    /// Linkage of one relationship, resolved against storage
    pub async fn relationship(&self, resource_type: &str, id: &str, relationship: &str) -> ApiResult<LinkageDocument> {
        let descriptor = self.registry.require(resource_type)?;
        let rel = descriptor.relationship_named(relationship).ok_or_else(|| {
            ApiError::not_found(format!("{} relationship", resource_type), relationship)
        })?;
        let doc = self.load(descriptor, id).await?;

        let idents: Vec<ResourceIdentifier> = self
            .serializer()
            .related(resource_type, doc, relationship)
            .await?
            .into_iter()
            .filter_map(|r| {
                let id = r.doc.get("id").and_then(id_of)?;
                Some(ResourceIdentifier::new(r.resource_type, id))
            })
            .collect();

        let data = match rel.cardinality {
            Cardinality::One => RelationshipData::ToOne(idents.into_iter().next()),
            Cardinality::Many => RelationshipData::ToMany(idents),
        };
        let base = format!("{}/{}", resource_type, id);
        Ok(LinkageDocument {
            data,
            links: RelationshipLinks {
                self_link: Some(
                    self.config
                        .url_for(&format!("{}/relationships/{}", base, relationship)),
                ),
                related: self.config.url_for(&format!("{}/{}", base, relationship)),
            },
        })
    }

    /// Create a resource from a request body and read it back
    pub async fn create(&self, resource_type: &str, payload: &Value, raw_query: &str) -> ApiResult<DataDocument> {
        // Reject a bad query before writing anything
        self.parse(raw_query, resource_type)?;
        let stored = Deserializer::new(&self.registry).deserialize(payload, resource_type)?;

        let created = self.store.insert(resource_type, stored).await?;
        let id = created
            .get("id")
            .and_then(id_of)
            .ok_or_else(|| ApiError::internal(format!("store returned a '{}' without id", resource_type)))?;

        tracing::info!(resource_type, id = %id, "resource created");
        self.find_by_id(resource_type, &id, raw_query).await
    }

    /// Merge a request body into an existing resource and read it back
    pub async fn update(
        &self,
        resource_type: &str,
        id: &str,
        payload: &Value,
        raw_query: &str,
    ) -> ApiResult<DataDocument> {
        let descriptor = self.registry.require(resource_type)?;
        self.parse(raw_query, resource_type)?;
        self.load(descriptor, id).await?;

        if let Some(payload_id) = Deserializer::payload_id(payload)
            && payload_id != id
        {
            return Err(ApiError::conflict(format!(
                "Payload id '{}' does not match resource id '{}'",
                payload_id, id
            )));
        }

        let mut patch = Deserializer::new(&self.registry).deserialize(payload, resource_type)?;
        patch.insert(
            UPDATED_AT.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        self.store.update(resource_type, id, patch).await?;

        tracing::info!(resource_type, id, "resource updated");
        self.find_by_id(resource_type, id, raw_query).await
    }

    /// Delete a resource
    pub async fn delete(&self, resource_type: &str, id: &str) -> ApiResult<()> {
        let descriptor = self.registry.require(resource_type)?;
        self.load(descriptor, id).await?;
        self.store.delete(resource_type, id).await?;

        tracing::info!(resource_type, id, "resource deleted");
        Ok(())
    }

    /// One page of `collection` plus navigation links and the total count
    async fn page_of(
        &self,
        collection: &str,
        filter: Predicate,
        sort: Vec<SortKey>,
        query: &Query,
        request_url: &str,
    ) -> ApiResult<DataDocument> {
        let options = FindOptions::matching(filter.clone())
            .sorted(sort)
            .window(query.page.offset, query.page.limit);

        let (docs, total) = futures::try_join!(
            self.store.find(collection, &options),
            self.store.count(collection, &filter),
        )?;

        tracing::debug!(
            resource_type = collection,
            returned = docs.len(),
            total,
            "serving collection"
        );

        let mut document = self.serializer().serialize_many(docs, query, collection).await?;
        let (links, meta) = Paginator::new(&self.config).paginate(total, request_url, &query.page)?;
        document.links = Some(links);
        document.meta = Some(meta);
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::RelationshipDescriptor;
    use crate::core::document::PrimaryData;
    use crate::core::metrics::{EntryStats, MetricsSpec};
    use crate::storage::InMemoryDocumentStore;
    use serde_json::json;

    async fn service() -> ResourceService {
        let registry = ResourceRegistry::new()
            .with(
                ResourceDescriptor::new("anime")
                    .attributes(["title", "status"])
                    .read_only(["seasonCount", "averageRating", "userCount", "favoritesCount", "popularity"])
                    .relationship(
                        RelationshipDescriptor::to_many("seasons", "seasons").reverse("anime"),
                    )
                    .metrics(
                        MetricsSpec::new()
                            .count("seasonCount", "seasons", "anime")
                            .entries(EntryStats::new("anime-entries", "anime")),
                    ),
            )
            .unwrap()
            .with(
                ResourceDescriptor::new("seasons")
                    .attributes(["number"])
                    .relationship(RelationshipDescriptor::to_one("anime", "anime")),
            )
            .unwrap();

        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .insert("anime", json!({"id": "a1", "title": "Naruto", "status": "finished"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        for (id, number) in [("s2", 2), ("s1", 1)] {
            store
                .insert("seasons", json!({"id": id, "number": number, "anime": "a1"}).as_object().cloned().unwrap())
                .await
                .unwrap();
        }
        ResourceService::new(ApiConfig::default(), registry, store)
    }

    #[tokio::test]
    async fn test_find_by_id_recomputes_metrics() {
        let service = service().await;
        let document = service.find_by_id("anime", "a1", "").await.unwrap();
        let resource = document.data.resources()[0].clone();
        assert_eq!(resource.attributes["seasonCount"], 2);
        assert_eq!(resource.attributes["popularity"], 0);
        assert_eq!(resource.attributes["averageRating"], Value::Null);
    }

    #[tokio::test]
    async fn test_missing_resource() {
        let service = service().await;
        let err = service.find_by_id("anime", "nope", "").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
        let err = service.find_by_id("studios", "a1", "").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_related_reverse_collection_uses_relationship_sort() {
        let service = service().await;
        let document = service
            .find_related("anime", "a1", "seasons", "", "/anime/a1/seasons")
            .await
            .unwrap();
        let ids: Vec<String> = document.data.resources().iter().map(|r| r.id.clone()).collect();
        // unsorted relationship keeps storage order
        assert_eq!(ids, vec!["s2", "s1"]);
        assert_eq!(document.meta.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_related_to_one() {
        let service = service().await;
        let document = service
            .find_related("seasons", "s1", "anime", "", "/seasons/s1/anime")
            .await
            .unwrap();
        match document.data {
            PrimaryData::Single(Some(resource)) => assert_eq!(resource.id, "a1"),
            other => panic!("unexpected data: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relationship_linkage() {
        let service = service().await;
        let document = service.relationship("anime", "a1", "seasons").await.unwrap();
        assert_eq!(
            document.data,
            RelationshipData::ToMany(vec![
                ResourceIdentifier::new("seasons", "s2"),
                ResourceIdentifier::new("seasons", "s1"),
            ])
        );
        assert_eq!(
            document.links.self_link.as_deref(),
            Some("http://localhost:5000/anime/a1/relationships/seasons")
        );

        let err = service.relationship("anime", "a1", "bogus").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_rejects_mismatched_id() {
        let service = service().await;
        let err = service
            .update("anime", "a1", &json!({"data": {"type": "anime", "id": "a2"}}), "")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let service = service().await;
        let created = service
            .create(
                "seasons",
                &json!({"data": {"type": "seasons", "attributes": {"number": 3},
                    "relationships": {"anime": {"data": {"type": "anime", "id": "a1"}}}}}),
                "",
            )
            .await
            .unwrap();
        let id = created.data.resources()[0].id.clone();

        let updated = service
            .update(
                "seasons",
                &id,
                &json!({"data": {"type": "seasons", "id": id, "attributes": {"number": 4}}}),
                "",
            )
            .await
            .unwrap();
        assert_eq!(updated.data.resources()[0].attributes["number"], 4);

        service.delete("seasons", &id).await.unwrap();
        let err = service.delete("seasons", &id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }
}
