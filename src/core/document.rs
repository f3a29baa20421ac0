//! JSON:API wire types
//!
//! Outbound documents are built by the [`Serializer`](crate::core::serializer::Serializer)
//! and the [`Paginator`](crate::core::pagination::Paginator); inbound payloads
//! are read into [`IncomingDocument`] before the
//! [`Deserializer`](crate::core::deserializer::Deserializer) maps them onto a
//! resource type.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document as the mapping layer sees it
///
/// The identity lives under the `"id"` key. Relationship fields hold either
/// raw ids or, when the caller populated them, nested documents.
pub type StoredDoc = Map<String, Value>;

/// Minimal `{type, id}` reference to a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

/// Linkage of a relationship: one identifier (or none) or an ordered list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    ToMany(Vec<ResourceIdentifier>),
    ToOne(Option<ResourceIdentifier>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipLinks {
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    pub related: String,
}

/// A relationship of a resource object
///
/// `data` is absent when the linkage is unknown without an extra query
/// (a reverse relationship that was neither populated nor included).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RelationshipData>,

    pub links: RelationshipLinks,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLinks {
    #[serde(rename = "self")]
    pub self_link: String,
}

/// The wire-format unit of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub resource_type: String,

    pub id: String,

    pub attributes: Map<String, Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, RelationshipObject>,

    pub links: ResourceLinks,
}

impl ResourceObject {
    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier::new(self.resource_type.clone(), self.id.clone())
    }
}

/// Primary data of a successful document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Collection(Vec<ResourceObject>),
    Single(Option<Box<ResourceObject>>),
}

impl PrimaryData {
    /// Primary resources, whatever the shape
    pub fn resources(&self) -> Vec<&ResourceObject> {
        match self {
            PrimaryData::Collection(items) => items.iter().collect(),
            PrimaryData::Single(Some(item)) => vec![item.as_ref()],
            PrimaryData::Single(None) => Vec::new(),
        }
    }
}

/// Navigation links of a paginated collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationLinks {
    #[serde(rename = "self")]
    pub self_link: String,

    pub first: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    pub last: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Number of resources matching the request filter, across all pages
    pub total: u64,
}

/// Success document: primary data plus compound `included` resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDocument {
    pub data: PrimaryData,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceObject>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<PaginationLinks>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Response of a relationship endpoint: linkage only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkageDocument {
    pub data: RelationshipData,

    pub links: RelationshipLinks,
}

// =============================================================================
// Inbound payloads
// =============================================================================

/// Request body of a create or update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingDocument {
    pub data: IncomingResource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingResource {
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub relationships: Map<String, Value>,
}

impl From<ResourceObject> for IncomingResource {
    fn from(resource: ResourceObject) -> Self {
        let relationships = resource
            .relationships
            .into_iter()
            .filter_map(|(name, rel)| {
                let data = rel.data?;
                let value = serde_json::to_value(data).ok()?;
                let mut wrapper = Map::new();
                wrapper.insert("data".to_string(), value);
                Some((name, Value::Object(wrapper)))
            })
            .collect();

        Self {
            resource_type: resource.resource_type,
            id: Some(resource.id),
            attributes: resource.attributes,
            relationships,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relationship_data_shapes() {
        let one = RelationshipData::ToOne(Some(ResourceIdentifier::new("anime", "1")));
        assert_eq!(
            serde_json::to_value(&one).unwrap(),
            json!({"type": "anime", "id": "1"})
        );

        let none = RelationshipData::ToOne(None);
        assert_eq!(serde_json::to_value(&none).unwrap(), json!(null));

        let many = RelationshipData::ToMany(vec![
            ResourceIdentifier::new("genres", "a"),
            ResourceIdentifier::new("genres", "b"),
        ]);
        assert_eq!(
            serde_json::to_value(&many).unwrap(),
            json!([{"type": "genres", "id": "a"}, {"type": "genres", "id": "b"}])
        );
    }

    #[test]
    fn test_relationship_without_data_omits_key() {
        let rel = RelationshipObject {
            data: None,
            links: RelationshipLinks {
                self_link: None,
                related: "http://x/anime/1/reviews".to_string(),
            },
        };
        let json = serde_json::to_value(&rel).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["links"]["related"], "http://x/anime/1/reviews");
    }

    #[test]
    fn test_single_null_primary_data() {
        let doc = DataDocument {
            data: PrimaryData::Single(None),
            included: Vec::new(),
            links: None,
            meta: None,
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, json!({"data": null}));
    }

    #[test]
    fn test_incoming_defaults() {
        let doc: IncomingDocument =
            serde_json::from_value(json!({"data": {"type": "anime"}})).unwrap();
        assert_eq!(doc.data.resource_type, "anime");
        assert!(doc.data.id.is_none());
        assert!(doc.data.attributes.is_empty());
        assert!(doc.data.relationships.is_empty());
    }
}
