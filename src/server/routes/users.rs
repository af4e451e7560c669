//! `/api/v1/users`: authentication, the caller's own account, and admin CRUD

use super::IdPath;
use crate::core::auth::{PasswordHasher, Principal};
use crate::core::error::{ApiError, ApiResult, ValidationError};
use crate::core::extractors::{ApiJson, QueryParams, TOKEN_COOKIE};
use crate::core::filter::{Filter, ID_FIELD};
use crate::core::model::Model;
use crate::core::resource::ResourceDescriptor;
use crate::core::validation::filters::{lowercase, trim};
use crate::entities::{PasswordChange, User};
use crate::handlers::ApiResponse;
use crate::server::middleware::{ADMIN, protect, restrict_to};
use crate::server::state::AppState;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::Json;
use chrono::{Duration, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use validator::Validate;

pub fn routes(state: &AppState) -> Router<AppState> {
    let account = Router::new()
        .route("/me", get(get_me))
        .route("/updateMe", patch(update_me))
        .route("/deleteMe", delete(delete_me))
        .route("/updateMyPassword", patch(update_my_password));

    let admin = Router::new()
        .route("/", get(get_all_users).post(create_user))
        .route("/{id}", get(get_user).patch(update_user).delete(delete_user))
        .route_layer(from_fn_with_state(ADMIN, restrict_to));

    Router::new()
        .merge(account)
        .merge(admin)
        .route_layer(from_fn_with_state(state.clone(), protect))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
}

// =============================================================================
// Tokens
// =============================================================================

fn cookie_header(value: &str, max_age_secs: i64, secure: bool) -> ApiResult<HeaderValue> {
    let mut cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly",
        TOKEN_COOKIE, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::Internal(format!("Invalid cookie value: {}", e)))
}

/// Issue a token for `user` and send it as body field and cookie
fn send_token(state: &AppState, user: Value, status: StatusCode) -> ApiResult<Response> {
    let user_id = user
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Internal("user record has no id".to_string()))?;
    let token = state.tokens.issue(user_id)?;

    let max_age = Duration::days(state.cookies.max_age_days).num_seconds();
    let cookie = cookie_header(&token, max_age, state.cookies.secure)?;

    let mut user = user;
    if let Some(map) = user.as_object_mut() {
        for field in User::HIDDEN_FIELDS {
            map.remove(*field);
        }
    }

    let body = json!({
        "status": "success",
        "token": token,
        "data": { "user": user },
    });
    Ok((status, [(SET_COOKIE, cookie)], Json(body)).into_response())
}

// =============================================================================
// Authentication
// =============================================================================

async fn signup(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<Response> {
    let allowed = ["name", "email", "password", "passwordConfirm"];
    let fields: Map<String, Value> = body
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(key, _)| allowed.contains(&key.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    let user = state.users.resource().create(Value::Object(fields)).await?;
    tracing::info!(user = ?user.get(ID_FIELD), "user signed up");
    send_token(&state, user, StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
struct Credentials {
    email: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> ApiResult<Response> {
    let (Some(email), Some(password)) = (credentials.email, credentials.password) else {
        return Err(ApiError::BadRequest {
            message: "Please provide email and password!".to_string(),
        });
    };

    let incorrect = || ApiError::Unauthorized {
        message: "Incorrect email or password".to_string(),
    };

    let user = state
        .users
        .resource()
        .find_one_with_hidden(Filter::eq("email", lowercase(&trim(&email))))
        .await?
        .ok_or_else(incorrect)?;

    let hash = user.get("password").and_then(Value::as_str).unwrap_or_default();
    if hash.is_empty() || !PasswordHasher.verify(&password, hash)? {
        return Err(incorrect());
    }

    send_token(&state, user, StatusCode::OK)
}

async fn logout(State(state): State<AppState>) -> ApiResult<Response> {
    let cookie = cookie_header("loggedout", 10, state.cookies.secure)?;
    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(json!({ "status": "success" })),
    )
        .into_response())
}

// =============================================================================
// Own account
// =============================================================================

async fn get_me(State(state): State<AppState>, principal: Principal) -> ApiResult<ApiResponse> {
    state.users.get_one(&principal.id, &[]).await
}

async fn update_me(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<ApiResponse> {
    let map = body.as_object().cloned().unwrap_or_default();
    if map.contains_key("password") || map.contains_key("passwordConfirm") {
        return Err(ApiError::BadRequest {
            message: "This route is not for password updates. Please use /updateMyPassword."
                .to_string(),
        });
    }

    let allowed = ["name", "email", "photo"];
    let fields: Map<String, Value> = map
        .into_iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .collect();
    state
        .users
        .update_one(&principal.id, Value::Object(fields))
        .await
}

async fn delete_me(State(state): State<AppState>, principal: Principal) -> ApiResult<ApiResponse> {
    let mut fields = Map::new();
    fields.insert("active".to_string(), Value::Bool(false));
    state
        .users
        .resource()
        .update_fields(&principal.id, fields)
        .await?;
    tracing::info!(user = %principal.id, "account deactivated");
    Ok(ApiResponse::NoContent)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordUpdate {
    password_current: Option<String>,
    #[serde(flatten)]
    change: PasswordChange,
}

async fn update_my_password(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(update): ApiJson<PasswordUpdate>,
) -> ApiResult<Response> {
    let users = state.users.resource();
    let user = users
        .find_one_with_hidden(Filter::eq(ID_FIELD, principal.id.as_str()))
        .await?
        .ok_or(ApiError::NotFound)?;

    let hash = user.get("password").and_then(Value::as_str).unwrap_or_default();
    let current = update.password_current.unwrap_or_default();
    if hash.is_empty() || !PasswordHasher.verify(&current, hash)? {
        return Err(ApiError::Unauthorized {
            message: "Your current password is wrong.".to_string(),
        });
    }

    update.change.validate().map_err(ValidationError::from)?;

    // One second back so tokens issued right after stay valid
    let changed_at =
        (Utc::now() - Duration::seconds(1)).to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut fields = Map::new();
    fields.insert(
        "password".to_string(),
        Value::String(PasswordHasher.hash(&update.change.password)?),
    );
    fields.insert("passwordChangedAt".to_string(), Value::String(changed_at));

    let updated = users
        .update_fields(&principal.id, fields)
        .await?
        .ok_or(ApiError::NotFound)?;
    send_token(&state, updated, StatusCode::OK)
}

// =============================================================================
// Admin
// =============================================================================

async fn get_all_users(
    State(state): State<AppState>,
    params: QueryParams,
) -> ApiResult<ApiResponse> {
    let spec = state.query_spec(params);
    state.users.get_all(&spec, None).await
}

async fn create_user(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<ApiResponse> {
    state.users.create_one(body).await
}

async fn get_user(
    State(state): State<AppState>,
    Path(IdPath { id }): Path<IdPath>,
) -> ApiResult<ApiResponse> {
    state.users.get_one(&id, &[]).await
}

async fn update_user(
    State(state): State<AppState>,
    Path(IdPath { id }): Path<IdPath>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<ApiResponse> {
    state.users.update_one(&id, body).await
}

async fn delete_user(
    State(state): State<AppState>,
    Path(IdPath { id }): Path<IdPath>,
) -> ApiResult<ApiResponse> {
    state.users.delete_one(&id).await
}
