//! Registry of resource descriptors
//!
//! Populated once at startup and shared read-only (behind an `Arc`) by every
//! request afterwards.

use crate::core::descriptor::ResourceDescriptor;
use crate::core::error::{ApiError, ApiResult};
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps resource type names to their descriptors
#[derive(Debug, Default, Clone)]
pub struct ResourceRegistry {
    descriptors: HashMap<String, Arc<ResourceDescriptor>>,
}

impl ResourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
        }
    }

    /// Register a descriptor
    ///
    /// Fails when the type is already registered or when a relationship name
    /// collides with an exposed attribute.
    pub fn register(&mut self, descriptor: ResourceDescriptor) -> Result<()> {
        if self.descriptors.contains_key(&descriptor.type_name) {
            return Err(anyhow!(
                "Resource type '{}' is already registered",
                descriptor.type_name
            ));
        }

        for relationship in &descriptor.relationships {
            if descriptor
                .exposed_attributes()
                .any(|a| a == relationship.name)
            {
                return Err(anyhow!(
                    "Relationship '{}' of '{}' collides with an attribute",
                    relationship.name,
                    descriptor.type_name
                ));
            }
        }

        self.descriptors
            .insert(descriptor.type_name.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, descriptor: ResourceDescriptor) -> Result<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Check that every relationship targets a registered type
    ///
    /// Call once after all descriptors are registered.
    pub fn validate(&self) -> Result<()> {
        for descriptor in self.descriptors.values() {
            for relationship in &descriptor.relationships {
                for target in relationship.target.target_types() {
                    if !self.descriptors.contains_key(target) {
                        return Err(anyhow!(
                            "Relationship '{}.{}' targets unknown type '{}'",
                            descriptor.type_name,
                            relationship.name,
                            target
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.descriptors.get(type_name)
    }

    /// Look up a descriptor, failing with `NotFound` for unknown types
    pub fn require(&self, type_name: &str) -> ApiResult<&Arc<ResourceDescriptor>> {
        self.get(type_name).ok_or_else(|| ApiError::NotFound {
            resource_type: "resource type".to_string(),
            id: type_name.to_string(),
        })
    }

    /// All registered type names, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::RelationshipDescriptor;

    #[test]
    fn test_new_registry_is_empty() {
        let registry = ResourceRegistry::new();
        assert!(registry.types().is_empty());
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ResourceRegistry::new()
            .with(ResourceDescriptor::new("genres").attributes(["title"]))
            .unwrap()
            .with(ResourceDescriptor::new("anime").attributes(["title"]))
            .unwrap();
        assert_eq!(registry.types(), vec!["anime", "genres"]);
        assert!(registry.get("anime").is_some());
        assert!(registry.require("manga").is_err());
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut registry = ResourceRegistry::new();
        registry.register(ResourceDescriptor::new("anime")).unwrap();
        assert!(registry.register(ResourceDescriptor::new("anime")).is_err());
    }

    #[test]
    fn test_relationship_attribute_collision() {
        let descriptor = ResourceDescriptor::new("anime")
            .attributes(["reviews"])
            .relationship(RelationshipDescriptor::to_many("reviews", "reviews").reverse("anime"));
        assert!(ResourceRegistry::new().with(descriptor).is_err());
    }

    #[test]
    fn test_validate_unknown_target() {
        let registry = ResourceRegistry::new()
            .with(
                ResourceDescriptor::new("anime")
                    .relationship(RelationshipDescriptor::to_many("genres", "genres")),
            )
            .unwrap();
        assert!(registry.validate().is_err());

        let registry = registry.with(ResourceDescriptor::new("genres")).unwrap();
        assert!(registry.validate().is_ok());
    }
}
