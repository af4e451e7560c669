//! Authentication and authorization middleware
//!
//! Compose with `axum::middleware::from_fn_with_state`:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/", post(create_tour).route_layer(from_fn_with_state(STAFF, restrict_to)))
//!     .route_layer(from_fn_with_state(state.clone(), protect))
//! ```

use crate::core::auth::{Principal, Role};
use crate::core::error::{ApiError, ApiResult};
use crate::core::extractors::{bearer_token, not_logged_in};
use crate::core::filter::{Filter, ID_FIELD};
use crate::entities::user::changed_password_after;
use crate::server::routes::IdPath;
use crate::server::state::AppState;
use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;

/// Roles allowed to manage tours and bookings
pub const STAFF: &[Role] = &[Role::Admin, Role::LeadGuide];

/// Roles allowed to see the monthly plan
pub const GUIDES: &[Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];

pub const ADMIN: &[Role] = &[Role::Admin];

/// Reviews are written by plain users
pub const REVIEWERS: &[Role] = &[Role::User];

/// Reviews are edited by their author (or an admin who wrote it)
pub const REVIEW_EDITORS: &[Role] = &[Role::User, Role::Admin];

/// Require a valid token whose user still exists and has not changed their
/// password since; attaches the [`Principal`]
pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or_else(not_logged_in)?;
    let claims = state.tokens.verify(&token)?;

    let principal = authenticate(&state, &claims.sub, claims.iat).await?;
    tracing::debug!(user = %principal.id, role = %principal.role, "authenticated");

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

async fn authenticate(state: &AppState, user_id: &str, iat: i64) -> ApiResult<Principal> {
    let user = state
        .users
        .resource()
        .find_one_with_hidden(Filter::eq(ID_FIELD, user_id))
        .await?
        .ok_or_else(|| ApiError::Unauthorized {
            message: "The user belonging to this token does no longer exist.".to_string(),
        })?;

    if changed_password_after(&user, iat) {
        return Err(ApiError::Unauthorized {
            message: "User recently changed password! Please log in again.".to_string(),
        });
    }

    Ok(principal_of(&user))
}

/// Principal of a stored user record
pub fn principal_of(user: &Value) -> Principal {
    Principal {
        id: user
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        role: user
            .get("role")
            .and_then(Value::as_str)
            .and_then(|role| role.parse().ok())
            .unwrap_or_default(),
    }
}

/// Reject principals whose role is not listed; runs after [`protect`]
pub async fn restrict_to(
    State(roles): State<&'static [Role]>,
    principal: Principal,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !principal.has_role(roles) {
        return Err(ApiError::permission_denied());
    }
    Ok(next.run(req).await)
}

/// Only the author of the review at `{id}` gets through
pub async fn review_owner(
    State(state): State<AppState>,
    Path(IdPath { id }): Path<IdPath>,
    principal: Principal,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    state.reviews.is_owner(&id, &principal, "user").await?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_principal_of_user_record() {
        let principal = principal_of(&json!({"id": "u-1", "role": "lead-guide"}));
        assert_eq!(principal.id, "u-1");
        assert_eq!(principal.role, Role::LeadGuide);
    }

    #[test]
    fn test_principal_defaults_to_user_role() {
        let principal = principal_of(&json!({"id": "u-2", "role": "wizard"}));
        assert_eq!(principal.role, Role::User);
    }

    #[test]
    fn test_role_sets() {
        assert!(STAFF.contains(&Role::LeadGuide));
        assert!(!STAFF.contains(&Role::Guide));
        assert!(GUIDES.contains(&Role::Guide));
    }
}
