//! Typed error handling for the mapping layer
//!
//! Every failure that can reach a caller is one of the six canonical
//! [`ApiError`] kinds. Each kind maps to an HTTP status and to a JSON:API
//! error object, so handlers never have to build error bodies themselves.
//!
//! # Error Categories
//!
//! - [`ApiError`]: the taxonomy surfaced to callers
//! - [`StorageError`]: failures reported by a [`DocumentStore`](crate::storage::DocumentStore),
//!   translated into the nearest [`ApiError`] at the adapter boundary
//!
//! # Example
//!
//! ```rust,ignore
//! use catalog::prelude::*;
//!
//! async fn load(store: &dyn DocumentStore, id: &str) -> ApiResult<StoredDoc> {
//!     store
//!         .find_one("anime", id)
//!         .await?
//!         .ok_or_else(|| ApiError::not_found("anime", id))
//! }
//! ```

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Media type of every JSON:API body
pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Detail string used in place of any internal error message
const INTERNAL_DETAIL: &str = "An unexpected error occurred";

/// The canonical error kinds of the mapping layer
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// A resource addressed by type and id does not exist
    NotFound { resource_type: String, id: String },

    /// Malformed query string or payload
    BadRequest {
        message: String,
        /// Query parameter that caused the failure, if any
        parameter: Option<String>,
        /// JSON pointer into the request document, if any
        pointer: Option<String>,
    },

    /// Type mismatch or unique-constraint violation
    Conflict { message: String },

    /// The caller is not allowed to perform the operation
    PermissionDenied { message: String },

    /// A schema constraint was violated
    ValidationFailed {
        message: String,
        /// JSON pointer into the request document
        pointer: Option<String>,
    },

    /// Anything else. The message is logged but never sent to clients.
    Internal(String),
}

impl ApiError {
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        ApiError::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            parameter: None,
            pointer: None,
        }
    }

    /// Bad request pinned to a query parameter
    pub fn bad_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            parameter: Some(parameter.into()),
            pointer: None,
        }
    }

    /// Bad request pinned to a location in the request document
    pub fn bad_pointer(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            parameter: None,
            pointer: Some(pointer.into()),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        ApiError::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>, pointer: Option<String>) -> Self {
        ApiError::ValidationFailed {
            message: message.into(),
            pointer,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            ApiError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::BadRequest { .. } => "BAD_REQUEST",
            ApiError::Conflict { .. } => "CONFLICT",
            ApiError::PermissionDenied { .. } => "PERMISSION_DENIED",
            ApiError::ValidationFailed { .. } => "VALIDATION_FAILED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Short, human-readable summary of the error kind
    pub fn title(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "Not Found",
            ApiError::BadRequest { .. } => "Bad Request",
            ApiError::Conflict { .. } => "Conflict",
            ApiError::PermissionDenied { .. } => "Permission Denied",
            ApiError::ValidationFailed { .. } => "Validation Failed",
            ApiError::Internal(_) => "Internal Server Error",
        }
    }

    /// Encode as a single JSON:API error object
    ///
    /// Internal errors are logged here with their full message and replaced
    /// by a generic detail.
    pub fn to_error_object(&self) -> ErrorObject {
        let detail = match self {
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                INTERNAL_DETAIL.to_string()
            }
            other => other.to_string(),
        };

        let source = match self {
            ApiError::BadRequest {
                parameter, pointer, ..
            } if parameter.is_some() || pointer.is_some() => Some(ErrorSource {
                pointer: pointer.clone(),
                parameter: parameter.clone(),
            }),
            ApiError::ValidationFailed {
                pointer: Some(pointer),
                ..
            } => Some(ErrorSource {
                pointer: Some(pointer.clone()),
                parameter: None,
            }),
            _ => None,
        };

        ErrorObject {
            status: self.status_code().as_u16().to_string(),
            code: Some(self.error_code().to_string()),
            title: self.title().to_string(),
            detail,
            source,
        }
    }

    /// Encode as a complete error document
    pub fn to_document(&self) -> ErrorDocument {
        ErrorDocument {
            errors: vec![self.to_error_object()],
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound { resource_type, id } => {
                write!(f, "{} with id '{}' not found", resource_type, id)
            }
            ApiError::BadRequest { message, .. } => write!(f, "{}", message),
            ApiError::Conflict { message } => write!(f, "{}", message),
            ApiError::PermissionDenied { message } => write!(f, "{}", message),
            ApiError::ValidationFailed { message, .. } => write!(f, "{}", message),
            ApiError::Internal(message) => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for ApiError {}

/// A JSON:API error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    pub title: String,

    pub detail: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

/// Location of the offending input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// Top-level failure document: `{ "errors": [...] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self.to_document())).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSONAPI_MEDIA_TYPE),
        );
        response
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors reported by storage adapters
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("document '{id}' not found in '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("duplicate key in '{collection}': {message}")]
    DuplicateKey { collection: String, message: String },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("{backend} error: {message}")]
    Backend { backend: String, message: String },
}

impl StorageError {
    pub fn backend(backend: impl Into<String>, message: impl fmt::Display) -> Self {
        StorageError::Backend {
            backend: backend.into(),
            message: message.to_string(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { collection, id } => ApiError::NotFound {
                resource_type: collection,
                id,
            },
            StorageError::DuplicateKey { .. } => ApiError::conflict(err.to_string()),
            StorageError::InvalidDocument(message) => ApiError::validation(message, None),
            StorageError::Backend { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid JSON: {}", err))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(other) => ApiError::Internal(other.to_string()),
        }
    }
}

/// A specialized Result type for mapping-layer operations
pub type ApiResult<T> = Result<T, ApiError>;
