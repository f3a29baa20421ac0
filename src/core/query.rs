//! Query-string parsing
//!
//! Recognized parameters:
//!
//! ```text
//! fields[<type>]=a,b        sparse fieldset per resource type
//! include=a,b.c             dotted relationship paths
//! filter[<key>]=<value>     resolved by the FilterResolver
//! sort=-a,b                 leading '-' means descending
//! page[limit]=<int>         clamped to the configured ceiling
//! page[offset]=<int>
//! ```
//!
//! Any other parameter is ignored here and preserved by pagination links.

use crate::config::ApiConfig;
use crate::core::error::{ApiError, ApiResult};
use crate::core::filter::FilterResolver;
use crate::core::registry::ResourceRegistry;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse one entry of a `sort` parameter (`"-updatedAt"`, `"title"`)
    pub fn parse(entry: &str) -> Self {
        match entry.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(entry),
        }
    }
}

/// Offset-based page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

/// A parsed request query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Sparse fieldsets keyed by resource type
    pub fields: HashMap<String, HashSet<String>>,
    /// Validated include paths, deduplicated, in request order
    pub include: Vec<String>,
    /// Raw filter values keyed by filter name
    pub filters: IndexMap<String, String>,
    pub sort: Vec<SortKey>,
    pub page: Page,
}

impl Query {
    /// Empty query with the configured default page window
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            fields: HashMap::new(),
            include: Vec::new(),
            filters: IndexMap::new(),
            sort: Vec::new(),
            page: Page {
                limit: clamp_limit(config.default_page.limit, config.max_page_limit),
                offset: config.default_page.offset,
            },
        }
    }

    /// Whether a field of `resource_type` survives the sparse fieldset
    ///
    /// Absence of a `fields[type]` entry means every field is kept.
    pub fn keeps_field(&self, resource_type: &str, field: &str) -> bool {
        self.fields
            .get(resource_type)
            .is_none_or(|selected| selected.contains(field))
    }
}

fn bracket_regex() -> &'static Regex {
    static BRACKET_REGEX: OnceLock<Regex> = OnceLock::new();
    BRACKET_REGEX.get_or_init(|| Regex::new(r"^(fields|filter|page)\[([^\[\]]+)\]$").unwrap())
}

/// Parses raw query strings against the registry
pub struct QueryParser<'a> {
    config: &'a ApiConfig,
    registry: &'a ResourceRegistry,
}

impl<'a> QueryParser<'a> {
    pub fn new(config: &'a ApiConfig, registry: &'a ResourceRegistry) -> Self {
        Self { config, registry }
    }

    /// Parse a percent-encoded query string (without the leading `?`)
    /// for a request whose primary data is of `primary_type`
    pub fn parse(&self, raw: &str, primary_type: &str) -> ApiResult<Query> {
        let descriptor = self.registry.require(primary_type)?;
        let mut query = Query::new(self.config);

        for (key, value) in url::form_urlencoded::parse(raw.trim_start_matches('?').as_bytes()) {
            let key = key.as_ref();
            let value = value.as_ref();

            if key == "include" {
                for path in split_list(value) {
                    self.validate_include(primary_type, path)?;
                    if !query.include.iter().any(|p| p == path) {
                        query.include.push(path.to_string());
                    }
                }
                continue;
            }

            if key == "sort" {
                query.sort.clear();
                for entry in split_list(value) {
                    let sort_key = SortKey::parse(entry);
                    if sort_key.field.is_empty() || !descriptor.is_sortable(&sort_key.field) {
                        return Err(ApiError::bad_parameter(
                            "sort",
                            format!(
                                "Cannot sort '{}' by '{}'",
                                primary_type, sort_key.field
                            ),
                        ));
                    }
                    query.sort.push(sort_key);
                }
                continue;
            }

            let Some(captures) = bracket_regex().captures(key) else {
                continue;
            };
            let family = &captures[1];
            let name = &captures[2];

            match family {
                "fields" => {
                    if self.registry.get(name).is_none() {
                        return Err(ApiError::bad_parameter(
                            key,
                            format!("Unknown resource type '{}' in fieldset", name),
                        ));
                    }
                    query.fields.insert(
                        name.to_string(),
                        split_list(value).map(str::to_string).collect(),
                    );
                }
                "filter" => {
                    if !FilterResolver::accepts(descriptor, name) {
                        return Err(ApiError::bad_parameter(
                            key,
                            format!(
                                "Unknown filter '{}' for resource type '{}'",
                                name, primary_type
                            ),
                        ));
                    }
                    query.filters.insert(name.to_string(), value.to_string());
                }
                "page" => match name {
                    "limit" => {
                        let limit = parse_non_negative(key, value)?;
                        query.page.limit = clamp_limit(limit, self.config.max_page_limit);
                    }
                    "offset" => {
                        query.page.offset = parse_non_negative(key, value)?;
                    }
                    _ => {
                        return Err(ApiError::bad_parameter(
                            key,
                            format!("Unsupported page parameter '{}'", name),
                        ));
                    }
                },
                _ => {}
            }
        }

        tracing::debug!(
            resource_type = primary_type,
            include = ?query.include,
            filters = query.filters.len(),
            limit = query.page.limit,
            offset = query.page.offset,
            "parsed query"
        );

        Ok(query)
    }

    /// Check every segment of a dotted include path
    ///
    /// A segment must be a relationship of every type reachable through the
    /// preceding segments (polymorphic relationships fan out to all variants).
    fn validate_include(&self, primary_type: &str, path: &str) -> ApiResult<()> {
        let segments: Vec<&str> = path.split('.').collect();

        if segments.iter().any(|s| s.is_empty()) {
            return Err(ApiError::bad_parameter(
                "include",
                format!("Malformed include path '{}'", path),
            ));
        }

        if segments.len() > self.config.max_include_depth {
            return Err(ApiError::bad_parameter(
                "include",
                format!(
                    "Include path '{}' exceeds the maximum depth of {}",
                    path, self.config.max_include_depth
                ),
            ));
        }

        let mut current: Vec<String> = vec![primary_type.to_string()];
        for segment in segments {
            let mut next: Vec<String> = Vec::new();
            for resource_type in &current {
                let relationship = self
                    .registry
                    .get(resource_type)
                    .and_then(|d| d.relationship_named(segment))
                    .ok_or_else(|| {
                        ApiError::bad_parameter(
                            "include",
                            format!(
                                "Unknown relationship '{}' on '{}' in include path '{}'",
                                segment, resource_type, path
                            ),
                        )
                    })?;
                for target in relationship.target.target_types() {
                    if !next.iter().any(|t| t == target) {
                        next.push(target.to_string());
                    }
                }
            }
            current = next;
        }

        Ok(())
    }
}

/// Keep a page size within `1..=max`, treating a zero ceiling as 1
fn clamp_limit(limit: u64, max: u64) -> u64 {
    limit.max(1).min(max.max(1))
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_non_negative(key: &str, value: &str) -> ApiResult<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        ApiError::bad_parameter(
            key,
            format!("'{}' must be a non-negative integer, got '{}'", key, value),
        )
    })
}
