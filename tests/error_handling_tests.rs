//! Tests for the typed error handling system
//!
//! These tests verify that:
//! - Errors return correct HTTP status codes
//! - Error responses are properly formatted
//! - Error conversions work correctly

use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use natours::core::error::{ErrorMode, FieldValidationError};
use natours::prelude::*;

async fn body_of(err: ApiError) -> (StatusCode, Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// =============================================================================
// HTTP Status Code Tests
// =============================================================================

mod status_code_tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        let cases = [
            (ApiError::NotFound, StatusCode::NOT_FOUND),
            (
                ApiError::RouteNotFound {
                    url: "/nowhere".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::InvalidId {
                    value: "x".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Duplicate {
                    field: "name".to_string(),
                    value: "x".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Unauthorized {
                    message: "no".to_string(),
                },
                StatusCode::UNAUTHORIZED,
            ),
            (ApiError::permission_denied(), StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{:?}", err);
            assert_eq!(err.status(), "fail");
            assert!(err.is_operational());
        }
    }

    #[test]
    fn test_unavailable_is_error_503() {
        let err = ApiError::Unavailable {
            message: "Payments are not configured".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.status(), "error");
    }

    #[test]
    fn test_internal_is_not_operational() {
        let err = ApiError::Internal("boom".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.is_operational());
    }
}

// =============================================================================
// Messages
// =============================================================================

mod message_tests {
    use super::*;

    #[test]
    fn test_validation_message_joins_fields() {
        let err = ValidationError::FieldErrors(vec![
            FieldValidationError {
                field: "name".to_string(),
                message: "A tour must have a name".to_string(),
            },
            FieldValidationError {
                field: "price".to_string(),
                message: "A tour must have a price".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid input data. A tour must have a name. A tour must have a price"
        );
    }

    #[test]
    fn test_duplicate_message() {
        let err = ApiError::Duplicate {
            field: "name".to_string(),
            value: "The Forest Hiker".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate field value: The Forest Hiker. Please use another value!"
        );
    }

    #[test]
    fn test_route_not_found_message() {
        let err = ApiError::RouteNotFound {
            url: "/api/v1/nothing".to_string(),
        };
        assert_eq!(err.to_string(), "Can't find /api/v1/nothing on this server!");
    }
}

// =============================================================================
// Rendering
// =============================================================================

mod rendering_tests {
    use super::*;

    #[test]
    fn test_development_response_carries_detail() {
        let response = ApiError::NotFound.to_response(ErrorMode::Development);
        assert_eq!(response.status, "fail");
        assert_eq!(response.message, "No document found with that ID");
        assert!(response.error.is_some());
    }

    #[test]
    fn test_production_hides_programming_errors() {
        let err: ApiError = StorageError::QueryError {
            backend: "MongoDB".to_string(),
            message: "connection reset".to_string(),
        }
        .into();
        let response = err.to_response(ErrorMode::Production);
        assert_eq!(response.status, "error");
        assert_eq!(response.message, "Something went very wrong!");
        assert!(response.error.is_none());
    }

    #[test]
    fn test_production_keeps_operational_messages() {
        let response = ApiError::permission_denied().to_response(ErrorMode::Production);
        assert_eq!(response.status, "fail");
        assert_eq!(
            response.message,
            "You do not have permission to perform this action"
        );
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_into_response_envelope() {
        let (status, body) = body_of(ApiError::BadRequest {
            message: "Please provide email and password!".to_string(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "Please provide email and password!");
    }
}

// =============================================================================
// Conversions
// =============================================================================

mod conversion_tests {
    use super::*;

    #[test]
    fn test_duplicate_key_becomes_duplicate() {
        let err: ApiError = StorageError::DuplicateKey {
            field: "email".to_string(),
            value: "jonas@example.com".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::Duplicate { ref field, .. } if field == "email"));
    }

    #[test]
    fn test_serde_error_is_validation() {
        let parse: Result<Tour, _> = serde_json::from_value(json!({"price": "cheap"}));
        let err: ApiError = parse.unwrap_err().into();
        assert!(matches!(err, ApiError::Validation(ValidationError::InvalidJson { .. })));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_anyhow_round_trip_keeps_api_error() {
        let err: ApiError = anyhow::Error::new(ApiError::NotFound).into();
        assert!(matches!(err, ApiError::NotFound));
    }
}
