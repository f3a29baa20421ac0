//! Catalog schema and seed data

use anyhow::Result;
use catalog::prelude::*;

fn polymorphic_media(name: &str, tag_field: &str) -> RelationshipDescriptor {
    RelationshipDescriptor::polymorphic(name, tag_field, [("Anime", "anime"), ("Manga", "manga")])
}

const MEDIA_METRICS: [&str; 6] = [
    "averageRating",
    "userCount",
    "favoritesCount",
    "popularity",
    "reviewCount",
    "ratingRank",
];

pub fn registry() -> Result<ResourceRegistry> {
    let anime = ResourceDescriptor::new("anime")
        .attributes([
            "title", "titles", "slug", "synopsis", "startDate", "endDate", "origin",
            "animeType", "status", "inProduction", "youtubeVideoId", "coverImage",
            "bannerImage", "links", "episodeLength",
        ])
        .read_only(MEDIA_METRICS)
        .read_only(["seasonCount", "episodeCount", "createdAt", "updatedAt"])
        .relationship(RelationshipDescriptor::to_many("genres", "genres"))
        .relationship(
            RelationshipDescriptor::to_many("seasons", "seasons")
                .reverse("anime")
                .sorted_by([SortKey::asc("number")]),
        )
        .relationship(
            RelationshipDescriptor::to_many("episodes", "episodes")
                .reverse("anime")
                .sorted_by([SortKey::asc("number")]),
        )
        .relationship(
            RelationshipDescriptor::to_many("reviews", "reviews")
                .reverse("anime")
                .sorted_by([SortKey::desc("updatedAt")]),
        )
        .relationship(RelationshipDescriptor::to_many("franchises", "franchises").reverse("source"))
        .relationship(RelationshipDescriptor::to_many("anime-entries", "anime-entries").reverse("anime"))
        .searchable(["title", "titles"])
        .search_filter("query")
        .metrics(
            MetricsSpec::new()
                .count("seasonCount", "seasons", "anime")
                .count("episodeCount", "episodes", "anime")
                .count("reviewCount", "reviews", "anime")
                .entries(EntryStats::new("anime-entries", "anime")),
        );

    let manga = ResourceDescriptor::new("manga")
        .attributes([
            "title", "titles", "slug", "synopsis", "startDate", "endDate", "origin",
            "mangaType", "status", "coverImage", "bannerImage", "links",
        ])
        .read_only(MEDIA_METRICS)
        .read_only(["volumeCount", "chapterCount", "createdAt", "updatedAt"])
        .relationship(RelationshipDescriptor::to_many("genres", "genres"))
        .relationship(
            RelationshipDescriptor::to_many("volumes", "volumes")
                .reverse("manga")
                .sorted_by([SortKey::asc("number")]),
        )
        .relationship(
            RelationshipDescriptor::to_many("chapters", "chapters")
                .reverse("manga")
                .sorted_by([SortKey::asc("number")]),
        )
        .relationship(
            RelationshipDescriptor::to_many("reviews", "reviews")
                .reverse("manga")
                .sorted_by([SortKey::desc("updatedAt")]),
        )
        .relationship(RelationshipDescriptor::to_many("franchises", "franchises").reverse("source"))
        .relationship(RelationshipDescriptor::to_many("manga-entries", "manga-entries").reverse("manga"))
        .searchable(["title", "titles"])
        .search_filter("query")
        .metrics(
            MetricsSpec::new()
                .count("volumeCount", "volumes", "manga")
                .count("chapterCount", "chapters", "manga")
                .count("reviewCount", "reviews", "manga")
                .entries(EntryStats::new("manga-entries", "manga")),
        );

    let seasons = ResourceDescriptor::new("seasons")
        .attributes(["number", "title", "titles", "startDate", "endDate"])
        .read_only(["episodeCount", "createdAt", "updatedAt"])
        .relationship(RelationshipDescriptor::to_one("anime", "anime"))
        .relationship(
            RelationshipDescriptor::to_many("episodes", "episodes")
                .reverse("season")
                .sorted_by([SortKey::asc("number")]),
        )
        .metrics(MetricsSpec::new().count("episodeCount", "episodes", "season"));

    let episodes = ResourceDescriptor::new("episodes")
        .attributes(["number", "relativeNumber", "title", "titles", "airDate", "duration"])
        .read_only(["createdAt", "updatedAt"])
        .relationship(RelationshipDescriptor::to_one("anime", "anime"))
        .relationship(RelationshipDescriptor::to_one("season", "seasons"));

    let volumes = ResourceDescriptor::new("volumes")
        .attributes(["number", "title", "titles", "publishedDate", "coverImage"])
        .read_only(["chapterCount", "createdAt", "updatedAt"])
        .relationship(RelationshipDescriptor::to_one("manga", "manga"))
        .relationship(
            RelationshipDescriptor::to_many("chapters", "chapters")
                .reverse("volume")
                .sorted_by([SortKey::asc("number")]),
        )
        .metrics(MetricsSpec::new().count("chapterCount", "chapters", "volume"));

    let chapters = ResourceDescriptor::new("chapters")
        .attributes(["number", "title", "titles", "publishedDate"])
        .read_only(["createdAt", "updatedAt"])
        .relationship(RelationshipDescriptor::to_one("manga", "manga"))
        .relationship(RelationshipDescriptor::to_one("volume", "volumes"));

    let genres = ResourceDescriptor::new("genres")
        .attributes(["title", "description"])
        .read_only(["createdAt", "updatedAt"]);

    let users = ResourceDescriptor::new("users")
        .attributes(["pseudo", "avatar", "about", "gender", "birthday"])
        .read_only(["createdAt", "updatedAt"])
        .relationship(
            RelationshipDescriptor::to_many("reviews", "reviews")
                .reverse("user")
                .sorted_by([SortKey::desc("updatedAt")]),
        )
        .relationship(RelationshipDescriptor::to_many("anime-library", "anime-entries").reverse("user"))
        .relationship(RelationshipDescriptor::to_many("manga-library", "manga-entries").reverse("user"))
        .searchable(["pseudo"])
        .search_filter("query");

    let reviews = ResourceDescriptor::new("reviews")
        .attributes(["content", "isSpoiler"])
        .read_only(["createdAt", "updatedAt"])
        .relationship(RelationshipDescriptor::to_one("user", "users"))
        .relationship(RelationshipDescriptor::to_one("anime", "anime"))
        .relationship(RelationshipDescriptor::to_one("manga", "manga"));

    let entry_attributes = [
        "isAdd", "isFavorites", "status", "rating", "startedAt", "finishedAt", "rewatchCount",
    ];
    let anime_entries = ResourceDescriptor::new("anime-entries")
        .attributes(entry_attributes)
        .attributes(["episodesWatch"])
        .read_only(["createdAt", "updatedAt"])
        .relationship(RelationshipDescriptor::to_one("user", "users"))
        .relationship(RelationshipDescriptor::to_one("anime", "anime"));

    let manga_entries = ResourceDescriptor::new("manga-entries")
        .attributes(entry_attributes)
        .attributes(["volumesRead", "chaptersRead"])
        .read_only(["createdAt", "updatedAt"])
        .relationship(RelationshipDescriptor::to_one("user", "users"))
        .relationship(RelationshipDescriptor::to_one("manga", "manga"));

    let franchises = ResourceDescriptor::new("franchises")
        .attributes(["role"])
        .read_only(["createdAt", "updatedAt"])
        .relationship(polymorphic_media("source", "sourceModel"))
        .relationship(polymorphic_media("destination", "destinationModel"));

    let registry = ResourceRegistry::new()
        .with(anime)?
        .with(manga)?
        .with(seasons)?
        .with(episodes)?
        .with(volumes)?
        .with(chapters)?
        .with(genres)?
        .with(users)?
        .with(reviews)?
        .with(anime_entries)?
        .with(manga_entries)?
        .with(franchises)?;
    registry.validate()?;
    Ok(registry)
}

async fn put(store: &InMemoryDocumentStore, collection: &str, doc: Value) -> Result<()> {
    let Value::Object(doc) = doc else {
        anyhow::bail!("seed document for '{}' is not an object", collection);
    };
    store.insert(collection, doc).await?;
    Ok(())
}

/// Seed a handful of documents so the routes have something to show
pub async fn seed(store: &InMemoryDocumentStore) -> Result<()> {
    put(store, "genres", json!({"id": "action", "title": "Action"})).await?;
    put(store, "genres", json!({"id": "adventure", "title": "Adventure"})).await?;

    put(store, "anime", json!({
        "id": "naruto",
        "title": "Naruto",
        "titles": {"ja_jp": "ナルト"},
        "animeType": "tv",
        "status": "finished",
        "genres": ["action", "adventure"],
    }))
    .await?;
    put(store, "manga", json!({
        "id": "naruto-manga",
        "title": "Naruto",
        "mangaType": "shonen",
        "status": "finished",
        "genres": ["action"],
    }))
    .await?;

    put(store, "seasons", json!({"id": "naruto-s1", "number": 1, "anime": "naruto"})).await?;
    for number in 1..=3 {
        put(store, "episodes", json!({
            "id": format!("naruto-e{}", number),
            "number": number,
            "anime": "naruto",
            "season": "naruto-s1",
        }))
        .await?;
    }

    put(store, "users", json!({"id": "alice", "pseudo": "alice"})).await?;
    put(store, "users", json!({"id": "bob", "pseudo": "bob"})).await?;

    put(store, "anime-entries", json!({
        "user": "alice", "anime": "naruto", "isAdd": true, "isFavorites": true, "rating": 8,
    }))
    .await?;
    put(store, "anime-entries", json!({
        "user": "bob", "anime": "naruto", "isAdd": true, "isFavorites": false, "rating": 6,
    }))
    .await?;
    put(store, "reviews", json!({
        "user": "alice", "anime": "naruto", "content": "Believe it.", "isSpoiler": false,
    }))
    .await?;

    put(store, "franchises", json!({
        "role": "adaptation",
        "source": "naruto",
        "sourceModel": "Anime",
        "destination": "naruto-manga",
        "destinationModel": "Manga",
    }))
    .await?;

    Ok(())
}
