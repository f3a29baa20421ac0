//! Resource descriptors
//!
//! A [`ResourceDescriptor`] tells the mapping layer everything it needs about
//! one resource type: its wire name, its attributes, how its relationships
//! are stored, and any per-type filter or metric behavior. Descriptors are
//! built once at startup and registered in a
//! [`ResourceRegistry`](crate::core::registry::ResourceRegistry).
//!
//! # Example
//!
//! ```rust,ignore
//! let anime = ResourceDescriptor::new("anime")
//!     .attributes(["title", "synopsis", "startDate", "status"])
//!     .read_only(["slug", "createdAt", "updatedAt"])
//!     .relationship(RelationshipDescriptor::to_many("genres", "genres").foreign_key("genres"))
//!     .relationship(RelationshipDescriptor::to_many("reviews", "reviews").reverse("anime"))
//!     .searchable(["title", "titles"])
//!     .search_filter("query");
//! ```

use crate::core::filter::Predicate;
use crate::core::metrics::MetricsSpec;
use crate::core::query::SortKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Translation of a filter value into a storage predicate
pub type FilterOverride = Arc<dyn Fn(&str) -> Predicate + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Which resource type a relationship points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipTarget {
    /// Always the same type
    Fixed(String),

    /// One of several types, chosen by a tag stored next to the foreign key
    Polymorphic {
        /// Document field holding the tag (e.g. `sourceModel`)
        tag_field: String,
        /// `(stored tag, resource type)` pairs (e.g. `("Anime", "anime")`)
        variants: Vec<(String, String)>,
    },
}

impl RelationshipTarget {
    /// Resource type for a stored tag
    pub fn type_for_tag(&self, tag: &str) -> Option<&str> {
        match self {
            RelationshipTarget::Fixed(resource_type) => Some(resource_type),
            RelationshipTarget::Polymorphic { variants, .. } => variants
                .iter()
                .find(|(t, _)| t == tag)
                .map(|(_, resource_type)| resource_type.as_str()),
        }
    }

    /// Stored tag for a resource type
    pub fn tag_for_type(&self, resource_type: &str) -> Option<&str> {
        match self {
            RelationshipTarget::Fixed(_) => None,
            RelationshipTarget::Polymorphic { variants, .. } => variants
                .iter()
                .find(|(_, t)| t == resource_type)
                .map(|(tag, _)| tag.as_str()),
        }
    }

    /// Every resource type this target may resolve to
    pub fn target_types(&self) -> Vec<&str> {
        match self {
            RelationshipTarget::Fixed(resource_type) => vec![resource_type.as_str()],
            RelationshipTarget::Polymorphic { variants, .. } => {
                variants.iter().map(|(_, t)| t.as_str()).collect()
            }
        }
    }
}

/// Where the linkage of a relationship is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Linkage {
    /// This document holds the related id(s) in the named field
    ForeignKey(String),

    /// Documents of the target type hold this document's id in `foreign_field`
    Reverse { foreign_field: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    pub name: String,
    pub cardinality: Cardinality,
    pub target: RelationshipTarget,
    pub linkage: Linkage,
    /// Ordering of reverse relationships when fetched from storage
    pub sort: Vec<SortKey>,
}

impl RelationshipDescriptor {
    /// To-one relationship stored under a field of the same name
    pub fn to_one(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            linkage: Linkage::ForeignKey(name.clone()),
            name,
            cardinality: Cardinality::One,
            target: RelationshipTarget::Fixed(target_type.into()),
            sort: Vec::new(),
        }
    }

    /// To-many relationship stored under a field of the same name
    pub fn to_many(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::to_one(name, target_type)
        }
    }

    /// Polymorphic to-one relationship disambiguated by `tag_field`
    pub fn polymorphic<I, T, R>(name: impl Into<String>, tag_field: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = (T, R)>,
        T: Into<String>,
        R: Into<String>,
    {
        let name = name.into();
        Self {
            linkage: Linkage::ForeignKey(name.clone()),
            name,
            cardinality: Cardinality::One,
            target: RelationshipTarget::Polymorphic {
                tag_field: tag_field.into(),
                variants: variants
                    .into_iter()
                    .map(|(tag, t)| (tag.into(), t.into()))
                    .collect(),
            },
            sort: Vec::new(),
        }
    }

    /// Store the linkage under a differently named field
    pub fn foreign_key(mut self, field: impl Into<String>) -> Self {
        self.linkage = Linkage::ForeignKey(field.into());
        self
    }

    /// Resolve through documents of the target type pointing back here
    pub fn reverse(mut self, foreign_field: impl Into<String>) -> Self {
        self.linkage = Linkage::Reverse {
            foreign_field: foreign_field.into(),
        };
        self
    }

    pub fn sorted_by(mut self, sort: impl IntoIterator<Item = SortKey>) -> Self {
        self.sort = sort.into_iter().collect();
        self
    }

    /// The field of this document holding the linkage, if any
    pub fn foreign_key_field(&self) -> Option<&str> {
        match &self.linkage {
            Linkage::ForeignKey(field) => Some(field),
            Linkage::Reverse { .. } => None,
        }
    }

    /// The polymorphic tag field, if any
    pub fn tag_field(&self) -> Option<&str> {
        match &self.target {
            RelationshipTarget::Polymorphic { tag_field, .. } => Some(tag_field),
            RelationshipTarget::Fixed(_) => None,
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self.target, RelationshipTarget::Polymorphic { .. })
    }
}

/// Everything the mapping layer knows about one resource type
#[derive(Clone)]
pub struct ResourceDescriptor {
    /// Wire type name, also used as the storage collection name
    pub type_name: String,
    /// Ordered attribute names exposed on the wire
    pub attributes: Vec<String>,
    /// Attributes that are serialized but never accepted from clients
    pub read_only: Vec<String>,
    pub relationships: Vec<RelationshipDescriptor>,
    pub filters: HashMap<String, FilterOverride>,
    /// Fields covered by free-text search
    pub search_fields: Vec<String>,
    /// Filter keys routed to free-text search
    pub search_keys: Vec<String>,
    pub metrics: Option<MetricsSpec>,
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<&String> = self.filters.keys().collect();
        filters.sort();
        f.debug_struct("ResourceDescriptor")
            .field("type_name", &self.type_name)
            .field("attributes", &self.attributes)
            .field("read_only", &self.read_only)
            .field("relationships", &self.relationships)
            .field("filters", &filters)
            .field("search_fields", &self.search_fields)
            .field("search_keys", &self.search_keys)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl ResourceDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: Vec::new(),
            read_only: Vec::new(),
            relationships: Vec::new(),
            filters: HashMap::new(),
            search_fields: Vec::new(),
            search_keys: Vec::new(),
            metrics: None,
        }
    }

    /// Append writable attributes
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(names.into_iter().map(Into::into));
        self
    }

    /// Append server-managed attributes (serialized, ignored on input)
    pub fn read_only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.attributes.contains(&name) {
                self.attributes.push(name.clone());
            }
            self.read_only.push(name);
        }
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDescriptor) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Replace the default translation of a filter key
    pub fn filter<F>(mut self, key: impl Into<String>, translate: F) -> Self
    where
        F: Fn(&str) -> Predicate + Send + Sync + 'static,
    {
        let key = key.into();
        self.search_keys.retain(|k| *k != key);
        self.filters.insert(key, Arc::new(translate));
        self
    }

    /// Declare the fields covered by free-text search
    pub fn searchable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Route a filter key to free-text search over the searchable fields
    ///
    /// The fields are read when the filter is resolved, so this may be
    /// declared before or after [`searchable`](Self::searchable).
    pub fn search_filter(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.filters.remove(&key);
        if !self.search_keys.contains(&key) {
            self.search_keys.push(key);
        }
        self
    }

    pub fn metrics(mut self, metrics: MetricsSpec) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.read_only.iter().any(|a| a == name)
    }

    pub fn relationship_named(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn filter_override(&self, key: &str) -> Option<&FilterOverride> {
        self.filters.get(key)
    }

    pub fn is_search_key(&self, key: &str) -> bool {
        self.search_keys.iter().any(|k| k == key)
    }

    /// Whether `field` can appear in a `sort` parameter
    pub fn is_sortable(&self, field: &str) -> bool {
        field == "id" || self.has_attribute(field)
    }

    /// Whether `field` is stored on the document to carry a relationship
    ///
    /// Such fields are never exposed as attributes.
    pub fn is_linkage_field(&self, field: &str) -> bool {
        self.relationships
            .iter()
            .any(|r| r.foreign_key_field() == Some(field) || r.tag_field() == Some(field))
    }

    /// Attributes that are actually serialized (linkage fields removed)
    pub fn exposed_attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .map(String::as_str)
            .filter(|a| *a != "id" && !self.is_linkage_field(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn franchise() -> ResourceDescriptor {
        ResourceDescriptor::new("franchises")
            .attributes(["role", "source", "sourceModel"])
            .read_only(["createdAt", "updatedAt"])
            .relationship(RelationshipDescriptor::polymorphic(
                "source",
                "sourceModel",
                [("Anime", "anime"), ("Manga", "manga")],
            ))
    }

    #[test]
    fn test_linkage_fields_not_exposed() {
        let descriptor = franchise();
        let exposed: Vec<&str> = descriptor.exposed_attributes().collect();
        assert_eq!(exposed, vec!["role", "createdAt", "updatedAt"]);
    }

    #[test]
    fn test_read_only_appends_attribute_once() {
        let descriptor = ResourceDescriptor::new("anime")
            .attributes(["title", "createdAt"])
            .read_only(["createdAt"]);
        assert_eq!(descriptor.attributes, vec!["title", "createdAt"]);
        assert!(descriptor.is_read_only("createdAt"));
        assert!(!descriptor.is_read_only("title"));
    }

    #[test]
    fn test_polymorphic_tags() {
        let descriptor = franchise();
        let source = descriptor.relationship_named("source").unwrap();
        assert!(source.is_polymorphic());
        assert_eq!(source.target.type_for_tag("Manga"), Some("manga"));
        assert_eq!(source.target.tag_for_type("anime"), Some("Anime"));
        assert_eq!(source.target.type_for_tag("Novel"), None);
        assert_eq!(source.target.target_types(), vec!["anime", "manga"]);
    }

    #[test]
    fn test_search_filter_registers_search_key() {
        let descriptor = ResourceDescriptor::new("anime")
            .attributes(["title", "titles"])
            .searchable(["title", "titles"])
            .search_filter("query");
        assert!(descriptor.is_search_key("query"));
        assert!(!descriptor.is_search_key("title"));
        assert!(descriptor.filter_override("query").is_none());
    }

    #[test]
    fn test_latest_filter_declaration_wins() {
        let descriptor = ResourceDescriptor::new("anime")
            .search_filter("query")
            .filter("query", |text| Predicate::eq("slug", text.to_string()));
        assert!(!descriptor.is_search_key("query"));
        assert!(descriptor.filter_override("query").is_some());

        let descriptor = descriptor.search_filter("query");
        assert!(descriptor.is_search_key("query"));
        assert!(descriptor.filter_override("query").is_none());
    }

    #[test]
    fn test_relationship_builders() {
        let rel = RelationshipDescriptor::to_many("reviews", "reviews").reverse("anime");
        assert_eq!(rel.cardinality, Cardinality::Many);
        assert_eq!(rel.foreign_key_field(), None);

        let rel = RelationshipDescriptor::to_one("user", "users").foreign_key("userId");
        assert_eq!(rel.foreign_key_field(), Some("userId"));
    }

    #[test]
    fn test_sortable() {
        let descriptor = franchise();
        assert!(descriptor.is_sortable("id"));
        assert!(descriptor.is_sortable("role"));
        assert!(!descriptor.is_sortable("bogus"));
    }
}
