//! Typed error handling for the natours API
//!
//! Every failure produced by the resource layer ends up as an [`ApiError`],
//! which knows its HTTP status, its "fail"/"error" classification and how to
//! render itself as the JSON error envelope.
//!
//! # Error Categories
//!
//! - [`ApiError`]: Request-level errors returned by handlers and middleware
//! - [`ValidationError`]: Model-layer rejections of a create/update payload
//! - [`StorageError`]: Errors raised by storage backends
//!
//! # Example
//!
//! ```rust,ignore
//! use natours::prelude::*;
//!
//! async fn load(resource: &impl ResourceDescriptor, id: &str) -> ApiResult<Value> {
//!     resource.find_by_id(id, &[]).await?.ok_or(ApiError::NotFound)
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// The main error type of the resource layer
#[derive(Debug)]
pub enum ApiError {
    /// The identifier does not resolve to a record
    NotFound,

    /// No route matched the request
    RouteNotFound { url: String },

    /// The identifier is not a well-formed record id
    InvalidId { value: String },

    /// The model rejected the payload
    Validation(ValidationError),

    /// A unique field already holds this value
    Duplicate { field: String, value: String },

    /// Malformed request that is not a validation failure
    BadRequest { message: String },

    /// Missing or invalid credentials
    Unauthorized { message: String },

    /// Authenticated but not allowed
    Forbidden { message: String },

    /// A collaborator (payments, uploads) is not configured
    Unavailable { message: String },

    /// Storage backend failure
    Storage(StorageError),

    /// Internal errors (should not happen in normal operation)
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound => write!(f, "No document found with that ID"),
            ApiError::RouteNotFound { url } => write!(f, "Can't find {} on this server!", url),
            ApiError::InvalidId { value } => write!(f, "Invalid id: {}.", value),
            ApiError::Validation(e) => write!(f, "{}", e),
            ApiError::Duplicate { value, .. } => write!(
                f,
                "Duplicate field value: {}. Please use another value!",
                value
            ),
            ApiError::BadRequest { message }
            | ApiError::Unauthorized { message }
            | ApiError::Forbidden { message }
            | ApiError::Unavailable { message } => write!(f, "{}", message),
            ApiError::Storage(e) => write!(f, "{}", e),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Validation(e) => Some(e),
            ApiError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

/// Error body sent to clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// "fail" for 4xx, "error" otherwise
    pub status: &'static str,
    /// Human-readable error message
    pub message: String,
    /// Debug representation of the error (development only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiError {
    /// Forbidden with the standard role-check message
    pub fn permission_denied() -> Self {
        ApiError::Forbidden {
            message: "You do not have permission to perform this action".to_string(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound | ApiError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::InvalidId { .. }
            | ApiError::Validation(_)
            | ApiError::Duplicate { .. }
            | ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Status classification used in the response envelope
    pub fn status(&self) -> &'static str {
        if self.status_code().is_client_error() {
            "fail"
        } else {
            "error"
        }
    }

    /// Operational errors are expected failures whose message is safe to show
    pub fn is_operational(&self) -> bool {
        !matches!(self, ApiError::Storage(_) | ApiError::Internal(_))
    }

    /// Convert to an error response
    pub fn to_response(&self, mode: ErrorMode) -> ErrorResponse {
        match mode {
            ErrorMode::Development => ErrorResponse {
                status: self.status(),
                message: self.to_string(),
                error: Some(format!("{:?}", self)),
            },
            ErrorMode::Production if self.is_operational() => ErrorResponse {
                status: self.status(),
                message: self.to_string(),
                error: None,
            },
            ErrorMode::Production => ErrorResponse {
                status: "error",
                message: "Something went very wrong!".to_string(),
                error: None,
            },
        }
    }
}

/// How much detail error responses carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    #[default]
    Development,
    Production,
}

static ERROR_MODE: OnceLock<ErrorMode> = OnceLock::new();

/// Select the error rendering mode once at startup.
///
/// Later calls are ignored; the first mode set wins.
pub fn set_error_mode(mode: ErrorMode) {
    let _ = ERROR_MODE.set(mode);
}

fn error_mode() -> ErrorMode {
    ERROR_MODE.get().copied().unwrap_or_default()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mode = error_mode();

        if self.is_operational() {
            tracing::debug!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::error!(error = ?self, "unexpected error");
        }

        let body = Json(self.to_response(mode));
        (status, body).into_response()
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors raised by the model layer when a payload is rejected
#[derive(Debug)]
pub enum ValidationError {
    /// One or more fields failed validation
    FieldErrors(Vec<FieldValidationError>),

    /// The body is not valid JSON for this model
    InvalidJson { message: String },
}

/// A single field validation error
#[derive(Debug, Clone, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::FieldErrors(errors) => {
                let msgs: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
                write!(f, "Invalid input data. {}", msgs.join(". "))
            }
            ValidationError::InvalidJson { message } => {
                write!(f, "Invalid input data. {}", message)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// Single field failure
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::FieldErrors(vec![FieldValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug)]
pub enum StorageError {
    /// Connection error
    ConnectionError { backend: String, message: String },

    /// Query execution error
    QueryError { backend: String, message: String },

    /// A unique constraint was violated
    DuplicateKey { field: String, value: String },

    /// Stored document could not be (de)serialized
    Serialization { message: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionError { backend, message } => {
                write!(f, "Failed to connect to {}: {}", backend, message)
            }
            StorageError::QueryError { backend, message } => {
                write!(f, "{} query error: {}", backend, message)
            }
            StorageError::DuplicateKey { field, value } => {
                write!(f, "Duplicate value '{}' for unique field '{}'", value, field)
            }
            StorageError::Serialization { message } => {
                write!(f, "Document serialization error: {}", message)
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateKey { field, value } => ApiError::Duplicate { field, value },
            other => ApiError::Storage(other),
        }
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Validation(ValidationError::InvalidJson {
            message: err.to_string(),
        })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let message = match err.kind() {
            ErrorKind::ExpiredSignature => "Your token has expired! Please log in again.",
            _ => "Invalid token. Please log in again!",
        };
        ApiError::Unauthorized {
            message: message.to_string(),
        }
    }
}

/// Convert from anyhow::Error at the bootstrap boundary
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(err) => ApiError::Internal(err.to_string()),
        }
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for handler operations
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Tests
// =============================================================================
