//! HTTP handlers for resource operations
//!
//! Every handler is type-agnostic: the resource type comes from the path and
//! is looked up in the registry of the [`ResourceService`].

use axum::{
    body::Bytes,
    extract::{OriginalUri, Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::document::{DataDocument, LinkageDocument};
use crate::core::error::{ApiError, ApiResult, JSONAPI_MEDIA_TYPE};
use crate::core::service::ResourceService;

/// Body key naming the method a `POST` stands in for
pub const METHOD_OVERRIDE_KEY: &str = "REQUEST_METHOD";

/// Application state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    pub service: ResourceService,
    /// Derive link base URLs from the request's `Host` header
    pub links_from_host: bool,
}

impl ApiState {
    /// Service for one request, with the public base URL applied
    fn service_for(&self, headers: &HeaderMap) -> ResourceService {
        if !self.links_from_host {
            return self.service.clone();
        }
        match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
            Some(host) => {
                let scheme = headers
                    .get("x-forwarded-proto")
                    .and_then(|h| h.to_str().ok())
                    .unwrap_or("http");
                self.service.with_base_url(format!("{}://{}", scheme, host))
            }
            None => self.service.clone(),
        }
    }
}

/// A JSON:API response body with its status code
pub struct JsonApi<T>(pub StatusCode, pub T);

impl<T: Serialize> IntoResponse for JsonApi<T> {
    fn into_response(self) -> Response {
        let mut response = (self.0, Json(self.1)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSONAPI_MEDIA_TYPE),
        );
        response
    }
}

/// A request body after method-override unwrapping
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Method named by `REQUEST_METHOD`, upper-cased
    pub method_override: Option<String>,
    pub body: Value,
}

impl Payload {
    /// Parse a JSON body, unwrapping `{ "REQUEST_METHOD": m, "data": ... }`
    ///
    /// The overridden body is the wrapper's `data` member; a bare resource
    /// object is wrapped into a `{ "data": ... }` document.
    pub fn parse(bytes: &Bytes) -> ApiResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;

        let Some(method) = value.get(METHOD_OVERRIDE_KEY).and_then(Value::as_str) else {
            return Ok(Self {
                method_override: None,
                body: value,
            });
        };
        let method = method.to_ascii_uppercase();

        let inner = value.get("data").cloned().unwrap_or(Value::Null);
        let body = match inner {
            Value::Object(map) if map.contains_key("data") => Value::Object(map),
            Value::Null => Value::Null,
            other => {
                let mut wrapper = Map::new();
                wrapper.insert("data".to_string(), other);
                Value::Object(wrapper)
            }
        };

        Ok(Self {
            method_override: Some(method),
            body,
        })
    }
}

fn request_url(uri: &OriginalUri) -> String {
    uri.0.to_string()
}

/// `GET /{resource_type}`
pub async fn list_resources(
    State(state): State<ApiState>,
    Path(resource_type): Path<String>,
    RawQuery(raw): RawQuery,
    uri: OriginalUri,
    headers: HeaderMap,
) -> ApiResult<JsonApi<DataDocument>> {
    let service = state.service_for(&headers);
    let document = service
        .list(&resource_type, raw.as_deref().unwrap_or(""), &request_url(&uri))
        .await?;
    Ok(JsonApi(StatusCode::OK, document))
}

/// `POST /{resource_type}`
pub async fn create_resource(
    State(state): State<ApiState>,
    Path(resource_type): Path<String>,
    RawQuery(raw): RawQuery,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let service = state.service_for(&headers);
    let raw = raw.as_deref().unwrap_or("");
    let payload = Payload::parse(&body)?;

    match payload.method_override.as_deref() {
        None | Some("POST") => {
            let document = service.create(&resource_type, &payload.body, raw).await?;
            Ok(JsonApi(StatusCode::CREATED, document).into_response())
        }
        Some("GET") => {
            let document = service.list(&resource_type, raw, &request_url(&uri)).await?;
            Ok(JsonApi(StatusCode::OK, document).into_response())
        }
        Some(other) => Err(ApiError::bad_pointer(
            format!("/{}", METHOD_OVERRIDE_KEY),
            format!("Method '{}' is not supported on a collection", other),
        )),
    }
}

/// `GET /{resource_type}/{id}`
pub async fn get_resource(
    State(state): State<ApiState>,
    Path((resource_type, id)): Path<(String, String)>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> ApiResult<JsonApi<DataDocument>> {
    let service = state.service_for(&headers);
    let document = service
        .find_by_id(&resource_type, &id, raw.as_deref().unwrap_or(""))
        .await?;
    Ok(JsonApi(StatusCode::OK, document))
}

/// `PATCH /{resource_type}/{id}`
pub async fn update_resource(
    State(state): State<ApiState>,
    Path((resource_type, id)): Path<(String, String)>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<JsonApi<DataDocument>> {
    let service = state.service_for(&headers);
    let payload = Payload::parse(&body)?;
    let document = service
        .update(&resource_type, &id, &payload.body, raw.as_deref().unwrap_or(""))
        .await?;
    Ok(JsonApi(StatusCode::OK, document))
}

/// `DELETE /{resource_type}/{id}`
pub async fn delete_resource(
    State(state): State<ApiState>,
    Path((resource_type, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    state.service_for(&headers).delete(&resource_type, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /{resource_type}/{id}` carrying a `REQUEST_METHOD` override
pub async fn override_resource(
    State(state): State<ApiState>,
    Path((resource_type, id)): Path<(String, String)>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let service = state.service_for(&headers);
    let raw = raw.as_deref().unwrap_or("");
    let payload = Payload::parse(&body)?;

    match payload.method_override.as_deref() {
        Some("PATCH") | Some("PUT") => {
            let document = service.update(&resource_type, &id, &payload.body, raw).await?;
            Ok(JsonApi(StatusCode::OK, document).into_response())
        }
        Some("DELETE") => {
            service.delete(&resource_type, &id).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Some("GET") => {
            let document = service.find_by_id(&resource_type, &id, raw).await?;
            Ok(JsonApi(StatusCode::OK, document).into_response())
        }
        Some(other) => Err(ApiError::bad_pointer(
            format!("/{}", METHOD_OVERRIDE_KEY),
            format!("Method '{}' is not supported on a resource", other),
        )),
        None => Err(ApiError::bad_request(format!(
            "POST on a resource requires a '{}' override",
            METHOD_OVERRIDE_KEY
        ))),
    }
}

/// `GET /{resource_type}/{id}/{relationship}`
pub async fn get_related(
    State(state): State<ApiState>,
    Path((resource_type, id, relationship)): Path<(String, String, String)>,
    RawQuery(raw): RawQuery,
    uri: OriginalUri,
    headers: HeaderMap,
) -> ApiResult<JsonApi<DataDocument>> {
    let service = state.service_for(&headers);
    let document = service
        .find_related(
            &resource_type,
            &id,
            &relationship,
            raw.as_deref().unwrap_or(""),
            &request_url(&uri),
        )
        .await?;
    Ok(JsonApi(StatusCode::OK, document))
}

/// `GET /{resource_type}/{id}/relationships/{relationship}`
pub async fn get_relationship(
    State(state): State<ApiState>,
    Path((resource_type, id, relationship)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<JsonApi<LinkageDocument>> {
    let document = state
        .service_for(&headers)
        .relationship(&resource_type, &id, &relationship)
        .await?;
    Ok(JsonApi(StatusCode::OK, document))
}

/// Encode unmatched paths as JSON:API `NotFound` errors
pub async fn not_found(uri: OriginalUri) -> ApiError {
    ApiError::not_found("route", uri.0.path().to_string())
}
