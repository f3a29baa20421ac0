//! Filter and search resolution
//!
//! Turns the `filter[...]` entries of a [`Query`](crate::core::query::Query)
//! into a storage-agnostic [`Predicate`]. Storage adapters translate the
//! predicate into their native query language.

use crate::core::descriptor::ResourceDescriptor;
use crate::core::error::{ApiError, ApiResult};
use indexmap::IndexMap;
use serde_json::Value;

/// A storage-agnostic filter over documents of one collection
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every document
    All,

    /// Field equals the value (or, for array fields, contains it)
    Eq { field: String, value: Value },

    /// Field equals any of the values
    In { field: String, values: Vec<Value> },

    /// Field is greater than or equal to the value
    Gte { field: String, value: Value },

    /// Free-text match over the given fields; ranking is up to the store
    Search { text: String, fields: Vec<String> },

    /// All sub-predicates hold
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn one_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn search(text: impl Into<String>, fields: Vec<String>) -> Self {
        Predicate::Search {
            text: text.into(),
            fields,
        }
    }

    /// Conjunction, flattening nested `And`s and dropping `All`
    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let mut parts = Vec::new();
        for predicate in predicates {
            match predicate {
                Predicate::All => {}
                Predicate::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Predicate::All,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }
}

/// Maps `filter[key]=value` entries onto predicates for one resource type
pub struct FilterResolver;

impl FilterResolver {
    /// Resolve every filter entry and combine them with `And`
    pub fn resolve(
        descriptor: &ResourceDescriptor,
        filters: &IndexMap<String, String>,
    ) -> ApiResult<Predicate> {
        let mut predicates = Vec::with_capacity(filters.len());
        for (key, value) in filters {
            predicates.push(Self::resolve_one(descriptor, key, value)?);
        }
        Ok(Predicate::and(predicates))
    }

    /// Resolve a single filter entry
    ///
    /// Registered overrides and search keys win; otherwise the key must name
    /// an attribute or a relationship stored on the document.
    pub fn resolve_one(
        descriptor: &ResourceDescriptor,
        key: &str,
        value: &str,
    ) -> ApiResult<Predicate> {
        if let Some(translate) = descriptor.filter_override(key) {
            return Ok(translate(value));
        }
        if descriptor.is_search_key(key) {
            return Ok(Predicate::search(value, descriptor.search_fields.clone()));
        }

        let field = Self::stored_field(descriptor, key).ok_or_else(|| {
            ApiError::bad_parameter(
                format!("filter[{}]", key),
                format!(
                    "Unknown filter '{}' for resource type '{}'",
                    key, descriptor.type_name
                ),
            )
        })?;

        if value.contains(',') {
            let options = value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| Value::String(v.to_string()));
            Ok(Predicate::one_of(field, options))
        } else {
            Ok(Predicate::eq(field, value.to_string()))
        }
    }

    /// Whether `key` is accepted as a filter on this type
    pub fn accepts(descriptor: &ResourceDescriptor, key: &str) -> bool {
        descriptor.filter_override(key).is_some()
            || descriptor.is_search_key(key)
            || Self::stored_field(descriptor, key).is_some()
    }

    fn stored_field<'a>(descriptor: &'a ResourceDescriptor, key: &'a str) -> Option<&'a str> {
        if key == "id" || descriptor.has_attribute(key) {
            return Some(key);
        }
        descriptor
            .relationship_named(key)
            .and_then(|rel| rel.foreign_key_field())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::RelationshipDescriptor;

    fn anime() -> ResourceDescriptor {
        ResourceDescriptor::new("anime")
            .attributes(["title", "titles", "status"])
            .relationship(RelationshipDescriptor::to_many("genres", "genres"))
            .relationship(RelationshipDescriptor::to_many("reviews", "reviews").reverse("anime"))
            .searchable(["title", "titles"])
            .search_filter("query")
    }

    fn filters(entries: &[(&str, &str)]) -> IndexMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_equality_filter() {
        let predicate = FilterResolver::resolve(&anime(), &filters(&[("status", "airing")])).unwrap();
        assert_eq!(predicate, Predicate::eq("status", "airing"));
    }

    #[test]
    fn test_comma_separated_values() {
        let predicate =
            FilterResolver::resolve(&anime(), &filters(&[("status", "airing, finished")])).unwrap();
        assert_eq!(
            predicate,
            Predicate::one_of("status", ["airing", "finished"])
        );
    }

    #[test]
    fn test_search_override() {
        let predicate = FilterResolver::resolve(&anime(), &filters(&[("query", "one piece")])).unwrap();
        assert_eq!(
            predicate,
            Predicate::search("one piece", vec!["title".to_string(), "titles".to_string()])
        );
    }

    #[test]
    fn test_search_key_declared_before_searchable_fields() {
        let descriptor = ResourceDescriptor::new("users")
            .attributes(["pseudo", "about"])
            .search_filter("query")
            .searchable(["pseudo", "about"]);
        let predicate = FilterResolver::resolve(&descriptor, &filters(&[("query", "alice")])).unwrap();
        assert_eq!(
            predicate,
            Predicate::search("alice", vec!["pseudo".to_string(), "about".to_string()])
        );
        assert!(FilterResolver::accepts(&descriptor, "query"));
    }

    #[test]
    fn test_relationship_filter_uses_foreign_key() {
        let predicate = FilterResolver::resolve(&anime(), &filters(&[("genres", "g1")])).unwrap();
        assert_eq!(predicate, Predicate::eq("genres", "g1"));
    }

    #[test]
    fn test_reverse_relationship_is_not_filterable() {
        let err = FilterResolver::resolve(&anime(), &filters(&[("reviews", "r1")])).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }

    #[test]
    fn test_unknown_filter_rejected() {
        let err = FilterResolver::resolve(&anime(), &filters(&[("bogus", "x")])).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }

    #[test]
    fn test_multiple_filters_combined() {
        let predicate = FilterResolver::resolve(
            &anime(),
            &filters(&[("status", "airing"), ("title", "Naruto")]),
        )
        .unwrap();
        assert_eq!(
            predicate,
            Predicate::And(vec![
                Predicate::eq("status", "airing"),
                Predicate::eq("title", "Naruto"),
            ])
        );
    }

    #[test]
    fn test_and_flattens() {
        let predicate = Predicate::and([
            Predicate::All,
            Predicate::and([Predicate::eq("a", 1), Predicate::eq("b", 2)]),
        ]);
        assert_eq!(
            predicate,
            Predicate::And(vec![Predicate::eq("a", 1), Predicate::eq("b", 2)])
        );
        assert_eq!(Predicate::and([]), Predicate::All);
    }
}
