//! Compound document tests
//!
//! These tests go through `ResourceService` against the shared catalog fixture
//! and check the shape of the produced JSON:API documents:
//! - sparse fieldsets
//! - `included` de-duplication and nested / polymorphic includes
//! - deserializing a serialized resource restores its writable fields

mod common;

use catalog::core::deserializer::Deserializer;
use catalog::core::document::{
    IncomingDocument, PrimaryData, RelationshipData, ResourceIdentifier, ResourceObject,
};
use catalog::prelude::*;
use common::catalog_service;
use std::collections::HashSet;

fn primary(document: &DataDocument) -> ResourceObject {
    document.data.resources()[0].clone()
}

fn included_idents(document: &DataDocument) -> Vec<ResourceIdentifier> {
    document.included.iter().map(|r| r.identifier()).collect()
}

fn assert_unique_included(document: &DataDocument) {
    let idents = included_idents(document);
    let unique: HashSet<&ResourceIdentifier> = idents.iter().collect();
    assert_eq!(unique.len(), idents.len(), "duplicate in included: {:?}", idents);

    let primaries: HashSet<ResourceIdentifier> =
        document.data.resources().iter().map(|r| r.identifier()).collect();
    assert!(idents.iter().all(|i| !primaries.contains(i)));
}

// =============================================================================
// Sparse fieldsets
// =============================================================================

mod sparse_fieldsets {
    use super::*;

    #[tokio::test]
    async fn test_only_requested_attributes() {
        let service = catalog_service().await;
        let document = service
            .find_by_id("anime", "a1", "fields%5Banime%5D=title,status")
            .await
            .unwrap();
        let resource = primary(&document);

        assert_eq!(resource.resource_type, "anime");
        assert_eq!(resource.id, "a1");
        let keys: Vec<&str> = resource.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["title", "status"]);
        assert!(resource.relationships.is_empty());
    }

    #[tokio::test]
    async fn test_fieldset_applies_to_included_type() {
        let service = catalog_service().await;
        let document = service
            .list(
                "anime",
                "include=genres&fields%5Banime%5D=title,genres&fields%5Bgenres%5D=id",
                "/anime",
            )
            .await
            .unwrap();

        for resource in document.data.resources() {
            assert!(resource.attributes.keys().all(|k| k == "title"));
            assert!(resource.relationships.contains_key("genres"));
        }
        assert!(!document.included.is_empty());
        for genre in &document.included {
            assert_eq!(genre.resource_type, "genres");
            assert!(genre.attributes.is_empty());
        }
    }

    #[tokio::test]
    async fn test_unknown_type_in_fieldset_is_rejected() {
        let service = catalog_service().await;
        let err = service
            .list("anime", "fields%5Bstudios%5D=name", "/anime")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }
}

// =============================================================================
// Includes
// =============================================================================

mod includes {
    use super::*;

    #[tokio::test]
    async fn test_shared_related_resource_included_once() {
        let service = catalog_service().await;
        let document = service.list("anime", "include=genres", "/anime").await.unwrap();

        assert_unique_included(&document);
        let idents = included_idents(&document);
        assert_eq!(
            idents.iter().filter(|i| i.id == "action").count(),
            1,
            "action is shared by a1 and a2"
        );
        assert_eq!(idents.len(), 2);
    }

    #[tokio::test]
    async fn test_nested_include() {
        let service = catalog_service().await;
        let document = service
            .find_by_id("anime", "a1", "include=seasons.episodes,reviews.user")
            .await
            .unwrap();

        assert_unique_included(&document);
        let idents = included_idents(&document);
        for expected in [
            ResourceIdentifier::new("seasons", "s1"),
            ResourceIdentifier::new("seasons", "s2"),
            ResourceIdentifier::new("episodes", "e1"),
            ResourceIdentifier::new("episodes", "e2"),
            ResourceIdentifier::new("reviews", "r1"),
            ResourceIdentifier::new("reviews", "r2"),
            ResourceIdentifier::new("users", "u1"),
            ResourceIdentifier::new("users", "u2"),
        ] {
            assert!(idents.contains(&expected), "missing {:?}", expected);
        }

        let resource = primary(&document);
        assert_eq!(
            resource.relationships["seasons"].data,
            Some(RelationshipData::ToMany(vec![
                ResourceIdentifier::new("seasons", "s1"),
                ResourceIdentifier::new("seasons", "s2"),
            ]))
        );
        assert_eq!(
            resource.relationships["reviews"].data,
            Some(RelationshipData::ToMany(vec![
                ResourceIdentifier::new("reviews", "r2"),
                ResourceIdentifier::new("reviews", "r1"),
            ]))
        );
    }

    #[tokio::test]
    async fn test_polymorphic_include() {
        let service = catalog_service().await;
        let document = service
            .find_by_id("franchises", "f1", "include=source,destination")
            .await
            .unwrap();

        let resource = primary(&document);
        assert_eq!(
            resource.relationships["source"].data,
            Some(RelationshipData::ToOne(Some(ResourceIdentifier::new("anime", "a1"))))
        );
        assert_eq!(
            resource.relationships["destination"].data,
            Some(RelationshipData::ToOne(Some(ResourceIdentifier::new("manga", "m1"))))
        );
        assert!(!resource.attributes.contains_key("sourceModel"));

        let idents = included_idents(&document);
        assert!(idents.contains(&ResourceIdentifier::new("anime", "a1")));
        assert!(idents.contains(&ResourceIdentifier::new("manga", "m1")));
    }

    #[tokio::test]
    async fn test_include_continues_past_polymorphic_segment() {
        let service = catalog_service().await;
        let document = service
            .find_by_id("franchises", "f1", "include=source.genres,destination.genres")
            .await
            .unwrap();

        assert_unique_included(&document);
        let idents = included_idents(&document);
        for ident in [
            ResourceIdentifier::new("anime", "a1"),
            ResourceIdentifier::new("manga", "m1"),
            ResourceIdentifier::new("genres", "action"),
            ResourceIdentifier::new("genres", "drama"),
        ] {
            assert!(idents.contains(&ident), "{:?} not included", ident);
        }

        // manga declares no seasons
        let err = service
            .find_by_id("franchises", "f1", "include=source.seasons")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_unknown_include_is_rejected() {
        let service = catalog_service().await;
        let err = service
            .find_by_id("anime", "a1", "include=studios")
            .await
            .unwrap_err();
        match err {
            ApiError::BadRequest { parameter, .. } => {
                assert_eq!(parameter.as_deref(), Some("include"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reverse_relationship_without_include_has_links_only() {
        let service = catalog_service().await;
        let document = service.find_by_id("anime", "a2", "").await.unwrap();
        let resource = primary(&document);

        let seasons = &resource.relationships["seasons"];
        assert!(seasons.data.is_none());
        assert_eq!(seasons.links.related, "http://localhost:5000/anime/a2/seasons");
        assert_eq!(
            resource.relationships["genres"].data,
            Some(RelationshipData::ToMany(vec![ResourceIdentifier::new("genres", "action")]))
        );
    }
}

// =============================================================================
// Round trip
// =============================================================================

#[tokio::test]
async fn test_deserialize_serialized_resource() {
    let service = catalog_service().await;
    let document = service.find_by_id("anime", "a1", "").await.unwrap();
    let resource = primary(&document);

    let incoming = IncomingDocument {
        data: resource.into(),
    };
    let stored = Deserializer::new(service.registry())
        .deserialize_document(&incoming, "anime")
        .unwrap();

    assert_eq!(stored["title"], "Naruto");
    assert_eq!(stored["status"], "finished");
    assert_eq!(stored["titles"], json!({"en_jp": "Naruto", "ja_jp": "ナルト"}));
    assert_eq!(stored["genres"], json!(["action", "drama"]));
    assert!(!stored.contains_key("id"));
    assert!(!stored.contains_key("popularity"));
    assert!(!stored.contains_key("updatedAt"));
    assert!(!stored.contains_key("seasons"));
}

#[tokio::test]
async fn test_missing_single_resource_yields_not_found() {
    let service = catalog_service().await;
    let err = service.find_by_id("genres", "horror", "").await.unwrap_err();
    assert_eq!(err.status_code().as_u16(), 404);

    let document = service
        .find_related("episodes", "e1", "season", "", "/episodes/e1/season")
        .await
        .unwrap();
    assert!(matches!(document.data, PrimaryData::Single(Some(_))));
}
