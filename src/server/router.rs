//! Route table for resource endpoints

use crate::server::handlers::{
    ApiState, create_resource, delete_resource, get_related, get_relationship, get_resource,
    list_resources, not_found, override_resource, update_resource,
};
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

/// Build resource routes
///
/// These routes are generic and work for every registered resource type:
/// - GET /{resource_type} - Paginated collection
/// - POST /{resource_type} - Create a resource
/// - GET /{resource_type}/{id} - Single resource (recomputes derived metrics)
/// - PATCH /{resource_type}/{id} - Partial update
/// - DELETE /{resource_type}/{id} - Delete
/// - POST /{resource_type}/{id} - Method override via `REQUEST_METHOD`
/// - GET /{resource_type}/{id}/{relationship} - Related resources
/// - GET /{resource_type}/{id}/relationships/{relationship} - Linkage only
pub fn build_resource_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route(
            "/{resource_type}",
            get(list_resources).post(create_resource),
        )
        .route(
            "/{resource_type}/{id}",
            get(get_resource)
                .patch(update_resource)
                .delete(delete_resource)
                .post(override_resource),
        )
        .route("/{resource_type}/{id}/{relationship}", get(get_related))
        .route(
            "/{resource_type}/{id}/relationships/{relationship}",
            get(get_relationship),
        )
        .fallback(not_found)
        .with_state(state)
}

/// Health check endpoint handler
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "catalog-jsonapi"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::core::descriptor::ResourceDescriptor;
    use crate::core::registry::ResourceRegistry;
    use crate::core::service::ResourceService;
    use crate::storage::InMemoryDocumentStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn routes() -> Router {
        let registry = ResourceRegistry::new()
            .with(ResourceDescriptor::new("genres").attributes(["title"]))
            .unwrap();
        let service = ResourceService::new(
            ApiConfig::default(),
            registry,
            Arc::new(InMemoryDocumentStore::new()),
        );
        build_resource_routes(ApiState {
            service,
            links_from_host: false,
        })
    }

    async fn status_of(request: Request<Body>) -> (StatusCode, Option<String>) {
        let response = routes().oneshot(request).await.unwrap();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        (response.status(), content_type)
    }

    #[tokio::test]
    async fn test_health_route() {
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, _) = status_of(request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_collection_route() {
        let request = Request::get("/genres").body(Body::empty()).unwrap();
        let (status, content_type) = status_of(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/vnd.api+json"));
    }

    #[tokio::test]
    async fn test_fallback_is_jsonapi_not_found() {
        let request = Request::get("/a/b/c/d/e").body(Body::empty()).unwrap();
        let (status, content_type) = status_of(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(content_type.as_deref(), Some("application/vnd.api+json"));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let request = Request::put("/genres").body(Body::empty()).unwrap();
        let (status, _) = status_of(request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
