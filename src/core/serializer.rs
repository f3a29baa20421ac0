//! Resource serialization
//!
//! Turns stored documents into JSON:API resource objects and compound
//! documents. Include paths are folded into an [`IncludeTree`] and resolved
//! one level at a time; every related document is serialized once, however
//! many paths reach it.

use crate::config::ApiConfig;
use crate::core::descriptor::{Cardinality, Linkage, RelationshipDescriptor, ResourceDescriptor};
use crate::core::document::{
    DataDocument, PrimaryData, RelationshipData, RelationshipLinks, RelationshipObject,
    ResourceIdentifier, ResourceLinks, ResourceObject, StoredDoc,
};
use crate::core::error::{ApiError, ApiResult};
use crate::core::filter::Predicate;
use crate::core::query::Query;
use crate::core::registry::ResourceRegistry;
use crate::storage::{DocumentStore, FindOptions};
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Include paths folded into a tree (`reviews.user,reviews.anime` shares `reviews`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeTree {
    pub children: IndexMap<String, IncludeTree>,
}

impl IncludeTree {
    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut root = IncludeTree::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.as_ref().split('.').filter(|s| !s.is_empty()) {
                node = node.children.entry(segment.to_string()).or_default();
            }
        }
        root
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// A stored document tagged with its resource type
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedDoc {
    pub resource_type: String,
    pub doc: StoredDoc,
}

/// Linkage discovered while resolving includes, keyed by owner and relationship
type Linkages = HashMap<(ResourceIdentifier, String), Vec<ResourceIdentifier>>;

#[derive(Debug, Clone)]
struct Node {
    descriptor: Arc<ResourceDescriptor>,
    ident: ResourceIdentifier,
    doc: StoredDoc,
}

/// Textual id of a stored value: a raw id, a populated document or an ObjectId
pub fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("_id"))
            .or_else(|| map.get("$oid"))
            .and_then(id_of),
        _ => None,
    }
}

/// Serializes stored documents of registered types
pub struct Serializer<'a> {
    config: &'a ApiConfig,
    registry: &'a ResourceRegistry,
    store: &'a dyn DocumentStore,
}

impl<'a> Serializer<'a> {
    pub fn new(config: &'a ApiConfig, registry: &'a ResourceRegistry, store: &'a dyn DocumentStore) -> Self {
        Self {
            config,
            registry,
            store,
        }
    }

    /// Single-resource document; `None` serializes as `data: null`
    pub async fn serialize_one(
        &self,
        doc: Option<StoredDoc>,
        query: &Query,
        resource_type: &str,
    ) -> ApiResult<DataDocument> {
        let descriptor = self.registry.require(resource_type)?;
        let primary = match doc {
            Some(doc) => vec![self.node(descriptor, doc)?],
            None => Vec::new(),
        };
        let (mut resources, included) = self.compound(primary, query).await?;
        Ok(DataDocument {
            data: PrimaryData::Single(resources.pop().map(Box::new)),
            included,
            links: None,
            meta: None,
        })
    }

    /// Collection document, in the order of `docs`
    pub async fn serialize_many(
        &self,
        docs: Vec<StoredDoc>,
        query: &Query,
        resource_type: &str,
    ) -> ApiResult<DataDocument> {
        let descriptor = self.registry.require(resource_type)?;
        let primary = docs
            .into_iter()
            .map(|doc| self.node(descriptor, doc))
            .collect::<ApiResult<Vec<_>>>()?;
        let (resources, included) = self.compound(primary, query).await?;
        Ok(DataDocument {
            data: PrimaryData::Collection(resources),
            included,
            links: None,
            meta: None,
        })
    }

    /// Document whose primary data are related resources, possibly of several types
    pub async fn serialize_related(
        &self,
        related: Vec<RelatedDoc>,
        query: &Query,
        cardinality: Cardinality,
    ) -> ApiResult<DataDocument> {
        let primary = related
            .into_iter()
            .map(|r| {
                let descriptor = self.registry.require(&r.resource_type)?;
                self.node(descriptor, r.doc)
            })
            .collect::<ApiResult<Vec<_>>>()?;
        let (mut resources, included) = self.compound(primary, query).await?;
        let data = match cardinality {
            Cardinality::One => {
                resources.truncate(1);
                PrimaryData::Single(resources.pop().map(Box::new))
            }
            Cardinality::Many => PrimaryData::Collection(resources),
        };
        Ok(DataDocument {
            data,
            included,
            links: None,
            meta: None,
        })
    }

    /// Serialize one document without resolving includes
    pub fn resource_object(&self, resource_type: &str, doc: StoredDoc, query: &Query) -> ApiResult<ResourceObject> {
        let descriptor = self.registry.require(resource_type)?;
        let node = self.node(descriptor, doc)?;
        Ok(self.build(&node, query, &Linkages::new()))
    }

    /// Every resource a relationship of `doc` points at
    ///
    /// Populated values are used as-is; ids are looked up in the store and
    /// dangling ids are skipped.
    pub async fn related(
        &self,
        resource_type: &str,
        doc: StoredDoc,
        relationship: &str,
    ) -> ApiResult<Vec<RelatedDoc>> {
        let descriptor = self.registry.require(resource_type)?;
        let rel = descriptor.relationship_named(relationship).ok_or_else(|| {
            ApiError::not_found(
                format!("{} relationship", resource_type),
                relationship.to_string(),
            )
        })?;
        let node = self.node(descriptor, doc)?;
        Ok(self
            .resolve(&node, rel)
            .await?
            .into_iter()
            .map(|n| RelatedDoc {
                resource_type: n.descriptor.type_name.clone(),
                doc: n.doc,
            })
            .collect())
    }

    // -------------------------------------------------------------------------
    // Compound documents
    // -------------------------------------------------------------------------

    async fn compound(
        &self,
        primary: Vec<Node>,
        query: &Query,
    ) -> ApiResult<(Vec<ResourceObject>, Vec<ResourceObject>)> {
        let tree = IncludeTree::from_paths(&query.include);
        let (included, linkages) = if tree.is_empty() || primary.is_empty() {
            (IndexMap::new(), Linkages::new())
        } else {
            self.resolve_includes(&primary, &tree).await?
        };

        let resources = primary
            .iter()
            .map(|node| self.build(node, query, &linkages))
            .collect();
        let included = included
            .values()
            .map(|node| self.build(node, query, &linkages))
            .collect();
        Ok((resources, included))
    }

    /// Walk the include tree breadth-first
    ///
    /// Each (resource, tree node) pair is expanded at most once, so cyclic
    /// paths terminate. Primary resources are never added to `included`.
    async fn resolve_includes(
        &self,
        primary: &[Node],
        tree: &IncludeTree,
    ) -> ApiResult<(IndexMap<ResourceIdentifier, Node>, Linkages)> {
        let primary_idents: HashSet<&ResourceIdentifier> = primary.iter().map(|n| &n.ident).collect();
        let mut included: IndexMap<ResourceIdentifier, Node> = IndexMap::new();
        let mut linkages = Linkages::new();
        let mut expanded: HashSet<(ResourceIdentifier, String)> = HashSet::new();

        let mut frontier: Vec<(Node, &IncludeTree, String)> = primary
            .iter()
            .map(|n| (n.clone(), tree, String::new()))
            .collect();

        while !frontier.is_empty() {
            let mut jobs = Vec::new();
            for (node, subtree, path) in &frontier {
                let subtree: &IncludeTree = *subtree;
                for (name, child) in &subtree.children {
                    if let Some(rel) = node.descriptor.relationship_named(name) {
                        let child_path = if path.is_empty() {
                            name.clone()
                        } else {
                            format!("{}.{}", path, name)
                        };
                        jobs.push((node, rel, child, child_path));
                    }
                }
            }

            let results = try_join_all(jobs.iter().map(|(node, rel, _, _)| self.resolve(node, rel))).await?;

            let mut next = Vec::new();
            for ((owner, rel, child, child_path), related) in jobs.into_iter().zip(results) {
                tracing::debug!(
                    resource_type = %owner.ident.resource_type,
                    id = %owner.ident.id,
                    path = %child_path,
                    count = related.len(),
                    "resolved include"
                );

                linkages.insert(
                    (owner.ident.clone(), rel.name.clone()),
                    related.iter().map(|n| n.ident.clone()).collect(),
                );

                for node in related {
                    if !primary_idents.contains(&node.ident) && !included.contains_key(&node.ident) {
                        included.insert(node.ident.clone(), node.clone());
                    }
                    if !child.is_empty() && expanded.insert((node.ident.clone(), child_path.clone())) {
                        next.push((node, child, child_path.clone()));
                    }
                }
            }
            frontier = next;
        }

        Ok((included, linkages))
    }

    /// Fetch the documents a relationship of `node` points at
    async fn resolve(&self, node: &Node, rel: &RelationshipDescriptor) -> ApiResult<Vec<Node>> {
        match &rel.linkage {
            Linkage::ForeignKey(field) => {
                let entries: Vec<&Value> = match node.doc.get(field) {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items.iter().collect(),
                    Some(value) => vec![value],
                };
                let Some(descriptor) = self.target_descriptor(rel, &node.doc) else {
                    return Ok(Vec::new());
                };

                let lookups = entries
                    .into_iter()
                    .map(|entry| self.lookup(&descriptor, entry));
                Ok(try_join_all(lookups).await?.into_iter().flatten().collect())
            }
            Linkage::Reverse { foreign_field } => {
                if let Some(Value::Array(items)) = node.doc.get(&rel.name)
                    && items.iter().all(Value::is_object)
                {
                    let Some(descriptor) = self.target_descriptor(rel, &node.doc) else {
                        return Ok(Vec::new());
                    };
                    return items
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|doc| self.node(&descriptor, doc.clone()))
                        .collect();
                }

                let mut nodes = Vec::new();
                for target in rel.target.target_types() {
                    let descriptor = self.registry.require(target)?;
                    let options = FindOptions::matching(Predicate::eq(
                        foreign_field.as_str(),
                        node.ident.id.as_str(),
                    ))
                    .sorted(rel.sort.clone());
                    for doc in self.store.find(target, &options).await? {
                        nodes.push(self.node(descriptor, doc)?);
                    }
                }
                Ok(nodes)
            }
        }
    }

    /// A populated document, or the stored document an id refers to
    async fn lookup(&self, descriptor: &Arc<ResourceDescriptor>, entry: &Value) -> ApiResult<Option<Node>> {
        if let Value::Object(populated) = entry
            && populated.len() > 1
        {
            return Ok(Some(self.node(descriptor, populated.clone())?));
        }
        let Some(id) = id_of(entry) else {
            return Ok(None);
        };
        match self.store.find_one(&descriptor.type_name, &id).await? {
            Some(doc) => Ok(Some(self.node(descriptor, doc)?)),
            None => Ok(None),
        }
    }

    /// Descriptor of the resource a relationship of `doc` points at
    fn target_descriptor(&self, rel: &RelationshipDescriptor, doc: &StoredDoc) -> Option<Arc<ResourceDescriptor>> {
        let target = match rel.tag_field() {
            Some(tag_field) => rel
                .target
                .type_for_tag(doc.get(tag_field).and_then(Value::as_str)?)?,
            None => rel.target.target_types().into_iter().next()?,
        };
        self.registry.get(target).cloned()
    }

    fn node(&self, descriptor: &Arc<ResourceDescriptor>, doc: StoredDoc) -> ApiResult<Node> {
        let id = doc.get("id").and_then(id_of).ok_or_else(|| {
            ApiError::internal(format!(
                "stored document of type '{}' has no id",
                descriptor.type_name
            ))
        })?;
        Ok(Node {
            ident: ResourceIdentifier::new(descriptor.type_name.clone(), id),
            descriptor: descriptor.clone(),
            doc,
        })
    }

    // -------------------------------------------------------------------------
    // Resource objects
    // -------------------------------------------------------------------------

    fn build(&self, node: &Node, query: &Query, linkages: &Linkages) -> ResourceObject {
        let descriptor = &node.descriptor;
        let type_name = descriptor.type_name.as_str();
        let base = format!("{}/{}", type_name, node.ident.id);

        let mut attributes = Map::new();
        for name in descriptor.exposed_attributes() {
            if !query.keeps_field(type_name, name) {
                continue;
            }
            if let Some(value) = node.doc.get(name) {
                attributes.insert(name.to_string(), value.clone());
            }
        }

        let mut relationships = IndexMap::new();
        for rel in &descriptor.relationships {
            if !query.keeps_field(type_name, &rel.name) {
                continue;
            }
            let data = match linkages.get(&(node.ident.clone(), rel.name.clone())) {
                Some(idents) => Some(Self::shape(rel.cardinality, idents.clone())),
                None => self.stored_linkage(rel, &node.doc),
            };
            relationships.insert(
                rel.name.clone(),
                RelationshipObject {
                    data,
                    links: RelationshipLinks {
                        self_link: Some(
                            self.config
                                .url_for(&format!("{}/relationships/{}", base, rel.name)),
                        ),
                        related: self.config.url_for(&format!("{}/{}", base, rel.name)),
                    },
                },
            );
        }

        ResourceObject {
            resource_type: type_name.to_string(),
            id: node.ident.id.clone(),
            attributes,
            relationships,
            links: ResourceLinks {
                self_link: self.config.url_for(&base),
            },
        }
    }

    fn shape(cardinality: Cardinality, mut idents: Vec<ResourceIdentifier>) -> RelationshipData {
        match cardinality {
            Cardinality::One => {
                idents.truncate(1);
                RelationshipData::ToOne(idents.pop())
            }
            Cardinality::Many => RelationshipData::ToMany(idents),
        }
    }

    /// Linkage readable from the stored document alone
    ///
    /// Reverse relationships only have linkage when they were populated.
    fn stored_linkage(&self, rel: &RelationshipDescriptor, doc: &StoredDoc) -> Option<RelationshipData> {
        let stored = match &rel.linkage {
            Linkage::ForeignKey(field) => doc.get(field),
            Linkage::Reverse { .. } => match doc.get(&rel.name) {
                Some(value @ Value::Array(items)) if items.iter().all(Value::is_object) => Some(value),
                _ => return None,
            },
        };

        let target = match rel.tag_field() {
            Some(tag_field) => doc
                .get(tag_field)
                .and_then(Value::as_str)
                .and_then(|tag| rel.target.type_for_tag(tag)),
            None => rel.target.target_types().into_iter().next(),
        };

        let idents: Vec<ResourceIdentifier> = match (stored, target) {
            (Some(Value::Array(items)), Some(target)) => items
                .iter()
                .filter_map(id_of)
                .map(|id| ResourceIdentifier::new(target, id))
                .collect(),
            (Some(value), Some(target)) => id_of(value)
                .map(|id| vec![ResourceIdentifier::new(target, id)])
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        Some(Self::shape(rel.cardinality, idents))
    }
}
