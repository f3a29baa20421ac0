//! Offset pagination
//!
//! Links are rebuilt from the request URL: every other query parameter is
//! kept in its original order and only `page[limit]` / `page[offset]` are
//! rewritten.

use crate::config::ApiConfig;
use crate::core::document::{Meta, PaginationLinks};
use crate::core::error::{ApiError, ApiResult};
use crate::core::query::Page;
use url::Url;

const PAGE_LIMIT: &str = "page[limit]";
const PAGE_OFFSET: &str = "page[offset]";

/// Offsets of the navigation links for one page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOffsets {
    pub first: u64,
    pub prev: Option<u64>,
    pub next: Option<u64>,
    pub last: u64,
}

impl PageOffsets {
    pub fn compute(total: u64, page: &Page) -> Self {
        let limit = page.limit.max(1);
        let offset = page.offset;

        let last = if total == 0 {
            0
        } else {
            ((total - 1) / limit) * limit
        };
        let prev = (offset > 0).then(|| offset.saturating_sub(limit));
        let next = (offset.saturating_add(limit) < total).then(|| offset + limit);

        Self {
            first: 0,
            prev,
            next,
            last,
        }
    }
}

/// Builds pagination links and meta for collection responses
pub struct Paginator<'a> {
    config: &'a ApiConfig,
}

impl<'a> Paginator<'a> {
    pub fn new(config: &'a ApiConfig) -> Self {
        Self { config }
    }

    /// Links and meta for a page of a collection of `total` resources
    ///
    /// `request_url` may be absolute or a path (resolved against the base URL).
    pub fn paginate(&self, total: u64, request_url: &str, page: &Page) -> ApiResult<(PaginationLinks, Meta)> {
        let url = self.absolute(request_url)?;
        let offsets = PageOffsets::compute(total, page);
        let link = |offset: u64| with_page(&url, page.limit, offset);

        let links = PaginationLinks {
            self_link: link(page.offset),
            first: link(offsets.first),
            prev: offsets.prev.map(link),
            next: offsets.next.map(link),
            last: link(offsets.last),
        };

        Ok((links, Meta { total }))
    }

    fn absolute(&self, request_url: &str) -> ApiResult<Url> {
        if let Ok(url) = Url::parse(request_url) {
            return Ok(url);
        }
        Url::parse(&self.config.url_for(request_url))
            .map_err(|e| ApiError::bad_request(format!("Invalid request URL '{}': {}", request_url, e)))
    }
}

/// Copy of `url` with the page window replaced
fn with_page(url: &Url, limit: u64, offset: u64) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut seen_limit = false;
    let mut seen_offset = false;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            PAGE_LIMIT => {
                if !seen_limit {
                    pairs.push((PAGE_LIMIT.to_string(), limit.to_string()));
                    seen_limit = true;
                }
            }
            PAGE_OFFSET => {
                if !seen_offset {
                    pairs.push((PAGE_OFFSET.to_string(), offset.to_string()));
                    seen_offset = true;
                }
            }
            _ => pairs.push((key.into_owned(), value.into_owned())),
        }
    }
    if !seen_limit {
        pairs.push((PAGE_LIMIT.to_string(), limit.to_string()));
    }
    if !seen_offset {
        pairs.push((PAGE_OFFSET.to_string(), offset.to_string()));
    }

    let mut link = url.clone();
    link.query_pairs_mut().clear().extend_pairs(pairs);
    link.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets_of(link: &str) -> (u64, u64) {
        let url = Url::parse(link).unwrap();
        let get = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.parse::<u64>().unwrap())
                .unwrap()
        };
        (get(PAGE_LIMIT), get(PAGE_OFFSET))
    }

    #[test]
    fn test_offsets_first_page() {
        let offsets = PageOffsets::compute(25, &Page { limit: 10, offset: 0 });
        assert_eq!(
            offsets,
            PageOffsets {
                first: 0,
                prev: None,
                next: Some(10),
                last: 20,
            }
        );
    }

    #[test]
    fn test_offsets_last_page() {
        let offsets = PageOffsets::compute(25, &Page { limit: 10, offset: 20 });
        assert_eq!(offsets.prev, Some(10));
        assert_eq!(offsets.next, None);
        assert_eq!(offsets.last, 20);
    }

    #[test]
    fn test_offsets_empty_and_unaligned() {
        let offsets = PageOffsets::compute(0, &Page { limit: 10, offset: 0 });
        assert_eq!(offsets.last, 0);
        assert_eq!(offsets.next, None);

        let offsets = PageOffsets::compute(25, &Page { limit: 10, offset: 5 });
        assert_eq!(offsets.prev, Some(0));
        assert_eq!(offsets.next, Some(15));

        let offsets = PageOffsets::compute(30, &Page { limit: 10, offset: 20 });
        assert_eq!(offsets.last, 20);
        assert_eq!(offsets.next, None);
    }

    #[test]
    fn test_links_keep_other_parameters() {
        let config = ApiConfig::default();
        let (links, meta) = Paginator::new(&config)
            .paginate(
                25,
                "/anime?filter%5Bstatus%5D=airing&page%5Blimit%5D=10&sort=-popularity",
                &Page { limit: 10, offset: 0 },
            )
            .unwrap();

        assert_eq!(meta.total, 25);
        assert!(links.prev.is_none());
        let next = links.next.unwrap();
        assert!(next.starts_with("http://localhost:5000/anime?"));
        assert_eq!(offsets_of(&next), (10, 10));
        assert_eq!(offsets_of(&links.last), (10, 20));
        assert_eq!(offsets_of(&links.first), (10, 0));

        let url = Url::parse(&next).unwrap();
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(keys, vec!["filter[status]", PAGE_LIMIT, "sort", PAGE_OFFSET]);
    }

    #[test]
    fn test_absolute_request_url() {
        let config = ApiConfig::default();
        let (links, _) = Paginator::new(&config)
            .paginate(5, "https://api.example.com/manga", &Page { limit: 2, offset: 2 })
            .unwrap();
        assert!(links.self_link.starts_with("https://api.example.com/manga?"));
        assert_eq!(offsets_of(&links.self_link), (2, 2));
        assert_eq!(offsets_of(&links.prev.unwrap()), (2, 0));
        assert_eq!(offsets_of(&links.next.unwrap()), (2, 4));
    }
}
