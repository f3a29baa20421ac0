//! Inbound payload mapping
//!
//! Converts a JSON:API request document into a plain [`StoredDoc`] patch for
//! one resource type. Whether the patch is merged into an existing document
//! or stored as a new one is up to the caller.

use crate::core::descriptor::{Cardinality, Linkage, RelationshipDescriptor, RelationshipTarget};
use crate::core::document::{IncomingDocument, ResourceIdentifier, StoredDoc};
use crate::core::error::{ApiError, ApiResult};
use crate::core::registry::ResourceRegistry;
use serde_json::{Map, Value};

/// Maps request documents onto registered resource types
pub struct Deserializer<'a> {
    registry: &'a ResourceRegistry,
}

impl<'a> Deserializer<'a> {
    pub fn new(registry: &'a ResourceRegistry) -> Self {
        Self { registry }
    }

    /// Deserialize a typed request document
    pub fn deserialize_document(&self, document: &IncomingDocument, resource_type: &str) -> ApiResult<StoredDoc> {
        let payload = serde_json::to_value(document)?;
        self.deserialize(&payload, resource_type)
    }

    /// Deserialize a raw request body
    ///
    /// Unknown attributes and relationships are ignored, as are read-only
    /// attributes and `data.id`.
    pub fn deserialize(&self, payload: &Value, resource_type: &str) -> ApiResult<StoredDoc> {
        let descriptor = self.registry.require(resource_type)?;
        let data = resource_data(payload)?;

        let declared_type = data
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_pointer("/data/type", "Resource object must have a string 'type'"))?;
        if declared_type != resource_type {
            return Err(ApiError::conflict(format!(
                "Resource type '{}' does not match endpoint type '{}'",
                declared_type, resource_type
            )));
        }

        let mut stored = StoredDoc::new();

        match data.get("attributes") {
            None | Some(Value::Null) => {}
            Some(Value::Object(attributes)) => {
                for (name, value) in attributes {
                    if name != "id"
                        && descriptor.has_attribute(name)
                        && !descriptor.is_read_only(name)
                        && !descriptor.is_linkage_field(name)
                    {
                        stored.insert(name.clone(), value.clone());
                    }
                }
            }
            Some(_) => {
                return Err(ApiError::bad_pointer(
                    "/data/attributes",
                    "'attributes' must be an object",
                ));
            }
        }

        match data.get("relationships") {
            None | Some(Value::Null) => {}
            Some(Value::Object(relationships)) => {
                for (name, value) in relationships {
                    let Some(rel) = descriptor.relationship_named(name) else {
                        continue;
                    };
                    if let Linkage::ForeignKey(field) = &rel.linkage {
                        write_linkage(&mut stored, rel, field, value)?;
                    }
                }
            }
            Some(_) => {
                return Err(ApiError::bad_pointer(
                    "/data/relationships",
                    "'relationships' must be an object",
                ));
            }
        }

        Ok(stored)
    }

    /// `data.id` of a raw request body, if present
    pub fn payload_id(payload: &Value) -> Option<&str> {
        payload.get("data")?.get("id")?.as_str()
    }
}

fn resource_data(payload: &Value) -> ApiResult<&Map<String, Value>> {
    match payload.get("data") {
        Some(Value::Object(data)) => Ok(data),
        Some(_) => Err(ApiError::bad_pointer("/data", "'data' must be a resource object")),
        None => Err(ApiError::bad_pointer(
            "",
            "Request document must contain a 'data' member",
        )),
    }
}

/// Store one relationship in its native foreign-key form
fn write_linkage(stored: &mut StoredDoc, rel: &RelationshipDescriptor, field: &str, value: &Value) -> ApiResult<()> {
    let pointer = format!("/data/relationships/{}/data", rel.name);
    let data = value
        .as_object()
        .and_then(|object| object.get("data"))
        .ok_or_else(|| {
            ApiError::bad_pointer(
                format!("/data/relationships/{}", rel.name),
                format!("Relationship '{}' must contain a 'data' member", rel.name),
            )
        })?;

    match (rel.cardinality, data) {
        (Cardinality::One, Value::Null) => {
            stored.insert(field.to_string(), Value::Null);
            if let Some(tag_field) = rel.tag_field() {
                stored.insert(tag_field.to_string(), Value::Null);
            }
        }
        (Cardinality::One, Value::Object(_)) => {
            let ident = identifier(data, &pointer)?;
            let tag = check_target(rel, &ident)?;
            stored.insert(field.to_string(), Value::String(ident.id));
            if let (Some(tag_field), Some(tag)) = (rel.tag_field(), tag) {
                stored.insert(tag_field.to_string(), Value::String(tag));
            }
        }
        (Cardinality::Many, Value::Array(items)) => {
            let mut ids = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let ident = identifier(item, &format!("{}/{}", pointer, index))?;
                check_target(rel, &ident)?;
                ids.push(Value::String(ident.id));
            }
            stored.insert(field.to_string(), Value::Array(ids));
        }
        (Cardinality::One, _) => {
            return Err(ApiError::bad_pointer(
                pointer,
                format!("To-one relationship '{}' expects an identifier or null", rel.name),
            ));
        }
        (Cardinality::Many, _) => {
            return Err(ApiError::bad_pointer(
                pointer,
                format!("To-many relationship '{}' expects an array of identifiers", rel.name),
            ));
        }
    }
    Ok(())
}

fn identifier(value: &Value, pointer: &str) -> ApiResult<ResourceIdentifier> {
    let resource_type = value.get("type").and_then(Value::as_str);
    let id = value.get("id").and_then(Value::as_str);
    match (resource_type, id) {
        (Some(resource_type), Some(id)) => Ok(ResourceIdentifier::new(resource_type, id)),
        _ => Err(ApiError::bad_pointer(
            pointer,
            "Resource identifier must have string 'type' and 'id' members",
        )),
    }
}

/// Check the identifier's type against the relationship target
///
/// Returns the stored tag for polymorphic relationships.
fn check_target(rel: &RelationshipDescriptor, ident: &ResourceIdentifier) -> ApiResult<Option<String>> {
    match &rel.target {
        RelationshipTarget::Fixed(target) if *target == ident.resource_type => Ok(None),
        RelationshipTarget::Fixed(target) => Err(ApiError::conflict(format!(
            "Relationship '{}' expects '{}', got '{}'",
            rel.name, target, ident.resource_type
        ))),
        RelationshipTarget::Polymorphic { .. } => rel
            .target
            .tag_for_type(&ident.resource_type)
            .map(|tag| Some(tag.to_string()))
            .ok_or_else(|| {
                ApiError::conflict(format!(
                    "Relationship '{}' cannot point at '{}'",
                    rel.name, ident.resource_type
                ))
            }),
    }
}
