//! Axum extractors
//!
//! - [`ApiJson`]: JSON body whose rejections render as the error envelope
//! - [`Principal`]: the caller attached by the `protect` middleware
//! - [`QueryParams`]: the query string as ordered `(key, value)` pairs
//! - [`bearer_token`]: token lookup in the `Authorization` header or the
//!   `jwt` cookie

use crate::core::auth::Principal;
use crate::core::error::{ApiError, ValidationError};
use crate::core::query::QuerySpec;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;

/// Name of the session cookie
pub const TOKEN_COOKIE: &str = "jwt";

/// JSON request body
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::Validation(ValidationError::InvalidJson {
                message: rejection.body_text(),
            })),
        }
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(not_logged_in)
    }
}

/// Ordered query-string pairs, repeated keys included
#[derive(Debug, Clone, Default)]
pub struct QueryParams(pub Vec<(String, String)>);

impl QueryParams {
    /// Build the request's [`QuerySpec`]
    pub fn into_spec(self, multi_value_keys: &[String]) -> QuerySpec {
        QuerySpec::from_pairs(self.0, multi_value_keys)
    }
}

impl<S> FromRequestParts<S> for QueryParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::BadRequest {
                message: rejection.body_text(),
            })?;
        Ok(QueryParams(pairs))
    }
}

/// The 401 raised when a protected route is hit without credentials
pub fn not_logged_in() -> ApiError {
    ApiError::Unauthorized {
        message: "You are not logged in! Please log in to get access.".to_string(),
    }
}

/// Token from `Authorization: Bearer <token>`, else from the `jwt` cookie
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from);

    from_header.or_else(|| {
        CookieJar::from_headers(headers)
            .get(TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty() && token != "loggedout")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::http::header::COOKIE;

    #[test]
    fn test_bearer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        headers.insert(COOKIE, HeaderValue::from_static("jwt=from-cookie"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; jwt=from-cookie"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("jwt=loggedout"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_query_params_into_spec() {
        let params = QueryParams(vec![
            ("sort".into(), "price".into()),
            ("sort".into(), "-price".into()),
        ]);
        let spec = params.into_spec(&[]);
        assert_eq!(spec.get("sort"), Some("-price"));
    }
}
