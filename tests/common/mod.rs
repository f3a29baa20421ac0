//! Shared catalog fixture for integration tests
//!
//! Seeded data:
//! - anime `a1` (Naruto), `a2` (Bleach), `a3` (Frieren); manga `m1`
//! - genres `action`, `drama`
//! - seasons `s2`, `s1` of `a1` (inserted out of order), episodes `e1`, `e2` of `s1`
//! - users `u1`, `u2`; reviews `r1`, `r2` of `a1` and `r3` of `m1`
//! - anime entries of `a1`: `u1` (added, favorite, rated 8, recent) and
//!   `u2` (added, rated 6, updated in 2020)
//! - franchise `f1` linking anime `a1` to manga `m1`

#![allow(dead_code)]

use catalog::prelude::*;
use url::Url;

pub fn doc(value: Value) -> StoredDoc {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture document must be an object, got {}", other),
    }
}

pub fn catalog_registry() -> ResourceRegistry {
    let media = [("Anime", "anime"), ("Manga", "manga")];

    ResourceRegistry::new()
        .with(
            ResourceDescriptor::new("anime")
                .attributes(["title", "titles", "status", "synopsis"])
                .read_only([
                    "seasonCount",
                    "reviewCount",
                    "averageRating",
                    "userCount",
                    "favoritesCount",
                    "popularity",
                    "createdAt",
                    "updatedAt",
                ])
                .relationship(RelationshipDescriptor::to_many("genres", "genres"))
                .relationship(
                    RelationshipDescriptor::to_many("seasons", "seasons")
                        .reverse("anime")
                        .sorted_by([SortKey::asc("number")]),
                )
                .relationship(
                    RelationshipDescriptor::to_many("reviews", "reviews")
                        .reverse("anime")
                        .sorted_by([SortKey::desc("updatedAt")]),
                )
                .searchable(["title", "titles"])
                .search_filter("query")
                .metrics(
                    MetricsSpec::new()
                        .count("seasonCount", "seasons", "anime")
                        .count("reviewCount", "reviews", "anime")
                        .entries(EntryStats::new("anime-entries", "anime")),
                ),
        )
        .unwrap()
        .with(
            ResourceDescriptor::new("manga")
                .attributes(["title", "status"])
                .read_only(["createdAt", "updatedAt"])
                .relationship(RelationshipDescriptor::to_many("genres", "genres"))
                .relationship(RelationshipDescriptor::to_many("reviews", "reviews").reverse("manga")),
        )
        .unwrap()
        .with(
            ResourceDescriptor::new("seasons")
                .attributes(["number", "title"])
                .relationship(RelationshipDescriptor::to_one("anime", "anime"))
                .relationship(
                    RelationshipDescriptor::to_many("episodes", "episodes")
                        .reverse("season")
                        .sorted_by([SortKey::asc("number")]),
                ),
        )
        .unwrap()
        .with(
            ResourceDescriptor::new("episodes")
                .attributes(["number", "title"])
                .relationship(RelationshipDescriptor::to_one("anime", "anime"))
                .relationship(RelationshipDescriptor::to_one("season", "seasons")),
        )
        .unwrap()
        .with(ResourceDescriptor::new("genres").attributes(["title"]))
        .unwrap()
        .with(
            ResourceDescriptor::new("users")
                .attributes(["pseudo"])
                .relationship(RelationshipDescriptor::to_many("reviews", "reviews").reverse("user")),
        )
        .unwrap()
        .with(
            ResourceDescriptor::new("reviews")
                .attributes(["content"])
                .read_only(["createdAt", "updatedAt"])
                .relationship(RelationshipDescriptor::to_one("user", "users"))
                .relationship(RelationshipDescriptor::to_one("anime", "anime"))
                .relationship(RelationshipDescriptor::to_one("manga", "manga")),
        )
        .unwrap()
        .with(
            ResourceDescriptor::new("anime-entries")
                .attributes(["isAdd", "isFavorites", "rating"])
                .read_only(["createdAt", "updatedAt"])
                .relationship(RelationshipDescriptor::to_one("user", "users"))
                .relationship(RelationshipDescriptor::to_one("anime", "anime")),
        )
        .unwrap()
        .with(
            ResourceDescriptor::new("franchises")
                .attributes(["role"])
                .relationship(RelationshipDescriptor::polymorphic("source", "sourceModel", media))
                .relationship(RelationshipDescriptor::polymorphic(
                    "destination",
                    "destinationModel",
                    media,
                )),
        )
        .unwrap()
}

pub async fn seeded_store() -> InMemoryDocumentStore {
    let store = InMemoryDocumentStore::new().with_unique_index("anime-entries", ["user", "anime"]);

    let fixtures = [
        ("genres", json!({"id": "action", "title": "Action"})),
        ("genres", json!({"id": "drama", "title": "Drama"})),
        (
            "anime",
            json!({
                "id": "a1",
                "title": "Naruto",
                "titles": {"en_jp": "Naruto", "ja_jp": "ナルト"},
                "status": "finished",
                "synopsis": "A ninja wants to become Hokage.",
                "genres": ["action", "drama"],
            }),
        ),
        (
            "anime",
            json!({"id": "a2", "title": "Bleach", "status": "finished", "genres": ["action"]}),
        ),
        (
            "anime",
            json!({
                "id": "a3",
                "title": "Frieren",
                "titles": {"en": "Frieren: Beyond Journey's End"},
                "status": "airing",
                "genres": ["drama"],
            }),
        ),
        (
            "manga",
            json!({"id": "m1", "title": "Naruto", "status": "finished", "genres": ["action"]}),
        ),
        ("seasons", json!({"id": "s2", "number": 2, "anime": "a1"})),
        ("seasons", json!({"id": "s1", "number": 1, "anime": "a1"})),
        (
            "episodes",
            json!({"id": "e1", "number": 1, "anime": "a1", "season": "s1"}),
        ),
        (
            "episodes",
            json!({"id": "e2", "number": 2, "anime": "a1", "season": "s1"}),
        ),
        ("users", json!({"id": "u1", "pseudo": "alice"})),
        ("users", json!({"id": "u2", "pseudo": "bob"})),
        (
            "reviews",
            json!({"id": "r1", "content": "Great", "user": "u1", "anime": "a1",
                   "updatedAt": "2024-05-01T00:00:00.000Z"}),
        ),
        (
            "reviews",
            json!({"id": "r2", "content": "Too long", "user": "u2", "anime": "a1",
                   "updatedAt": "2024-06-01T00:00:00.000Z"}),
        ),
        (
            "reviews",
            json!({"id": "r3", "content": "Better than the show", "user": "u1", "manga": "m1"}),
        ),
        (
            "anime-entries",
            json!({"id": "ae1", "user": "u1", "anime": "a1",
                   "isAdd": true, "isFavorites": true, "rating": 8}),
        ),
        (
            "anime-entries",
            json!({"id": "ae2", "user": "u2", "anime": "a1",
                   "isAdd": true, "isFavorites": false, "rating": 6,
                   "updatedAt": "2020-01-01T00:00:00.000Z"}),
        ),
        (
            "franchises",
            json!({"id": "f1", "role": "adaptation",
                   "source": "a1", "sourceModel": "Anime",
                   "destination": "m1", "destinationModel": "Manga"}),
        ),
    ];

    for (collection, value) in fixtures {
        store.insert(collection, doc(value)).await.unwrap();
    }
    store
}

pub async fn catalog_service() -> ResourceService {
    ResourceService::new(
        ApiConfig::default(),
        catalog_registry(),
        Arc::new(seeded_store().await),
    )
}

/// `(page[limit], page[offset])` of a pagination link
pub fn page_of(link: &str) -> (u64, u64) {
    let url = Url::parse(link).unwrap();
    let get = |name: &str| -> u64 {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.parse().unwrap())
            .unwrap()
    };
    (get("page[limit]"), get("page[offset]"))
}
