//! Tests for configuration flowing into generated documents

mod common;

use catalog::prelude::*;
use common::{catalog_registry, page_of, seeded_store};
use std::io::Write;

fn config_file(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_yaml_config_drives_links_and_paging() {
    let file = config_file(
        "base_url: https://catalog.example.com/\n\
         default_page:\n  limit: 2\n  offset: 0\n\
         max_page_limit: 2\n",
    );
    let config = ApiConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();

    let service = ResourceService::new(config, catalog_registry(), Arc::new(seeded_store().await));
    let document = service
        .list("anime", "page%5Blimit%5D=50", "/anime")
        .await
        .unwrap();

    assert_eq!(document.data.resources().len(), 2);
    assert_eq!(
        document.data.resources()[0].links.self_link,
        "https://catalog.example.com/anime/a1"
    );
    let links = document.links.unwrap();
    assert!(links.next.as_deref().unwrap().starts_with("https://catalog.example.com/anime?"));
    assert_eq!(page_of(&links.last), (2, 2));
}

#[test]
fn test_invalid_file_is_rejected() {
    let file = config_file("max_page_limit: 0\n");
    assert!(ApiConfig::from_yaml_file(file.path().to_str().unwrap()).is_err());

    let file = config_file("base_url: [not, a, string]\n");
    assert!(ApiConfig::from_yaml_file(file.path().to_str().unwrap()).is_err());

    assert!(ApiConfig::from_yaml_file("/definitely/not/here.yaml").is_err());
}
