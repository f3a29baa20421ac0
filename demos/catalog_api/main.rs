//! Anime & Manga Catalog Example
//!
//! This example registers a small anime/manga tracking schema and serves it
//! as a JSON:API backend on the in-memory store:
//! - Generic CRUD routes for every resource type
//! - Compound documents through `include`
//! - Derived metrics (ratings, popularity) recomputed on single reads
//!
//! Try:
//!   curl 'http://127.0.0.1:5000/anime?include=genres&fields[anime]=title,popularity'
//!   curl 'http://127.0.0.1:5000/anime/naruto?include=seasons.episodes,reviews.user'
//!   curl 'http://127.0.0.1:5000/franchises?include=source,destination'

mod schema;

use anyhow::Result;
use catalog::prelude::*;
use tracing_subscriber::EnvFilter;

const ADDR: &str = "127.0.0.1:5000";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("catalog=debug,tower_http=info")),
        )
        .init();

    let config = match std::env::var("CATALOG_CONFIG") {
        Ok(path) => ApiConfig::from_yaml_file(&path)?,
        Err(_) => ApiConfig {
            base_url: format!("http://{}", ADDR),
            ..ApiConfig::default()
        },
    };

    let store = InMemoryDocumentStore::new()
        .with_unique_index("anime-entries", ["user", "anime"])
        .with_unique_index("manga-entries", ["user", "manga"])
        .with_unique_index("reviews", ["user", "anime"])
        .with_unique_index("reviews", ["user", "manga"]);
    schema::seed(&store).await?;

    let registry = schema::registry()?;
    tracing::info!(types = ?registry.types(), "Starting catalog API");

    ServerBuilder::new()
        .with_config(config)
        .with_store(store)
        .with_registry(registry)
        .with_permissive_cors()
        .serve(ADDR)
        .await
}
