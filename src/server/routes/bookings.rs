//! `/api/v1/bookings`

use super::{IdPath, TourPath};
use crate::core::auth::Principal;
use crate::core::error::{ApiError, ApiResult};
use crate::core::extractors::{ApiJson, QueryParams};
use crate::core::resource::ResourceDescriptor;
use crate::handlers::ApiResponse;
use crate::server::middleware::{STAFF, protect, restrict_to};
use crate::server::payments::checkout_request;
use crate::server::state::AppState;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::HOST;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use serde_json::Value;

pub fn routes(state: &AppState) -> Router<AppState> {
    let staff = Router::new()
        .route("/", get(get_all_bookings).post(create_booking))
        .route(
            "/{id}",
            get(get_booking).patch(update_booking).delete(delete_booking),
        )
        .route_layer(from_fn_with_state(STAFF, restrict_to));

    Router::new()
        .route("/checkout-session/{tourId}", get(checkout_session))
        .merge(staff)
        .route_layer(from_fn_with_state(state.clone(), protect))
}

/// Base URL the provider redirects back to
fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.public_url {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

async fn checkout_session(
    State(state): State<AppState>,
    Path(TourPath { tour_id }): Path<TourPath>,
    principal: Principal,
    headers: HeaderMap,
) -> ApiResult<ApiResponse> {
    let tour = state
        .tours
        .resource()
        .find_by_id(&tour_id, &[])
        .await?
        .ok_or(ApiError::NotFound)?;

    let gateway = state.payments.clone().ok_or_else(|| ApiError::Unavailable {
        message: "Payments are not configured".to_string(),
    })?;

    let user = state
        .users
        .resource()
        .find_by_id(&principal.id, &[])
        .await?
        .ok_or(ApiError::NotFound)?;

    let base = base_url(&state, &headers);
    let image_base = state
        .image_base_url
        .clone()
        .unwrap_or_else(|| format!("{}/img/tours", base));

    let request = checkout_request(&tour, &user, &base, &image_base);
    let session = gateway.create_checkout_session(request).await?;
    tracing::info!(tour = %tour_id, user = %principal.id, session = %session.id, "checkout session created");

    let session = serde_json::to_value(session)?;
    Ok(ApiResponse::named("session", session))
}

async fn get_all_bookings(
    State(state): State<AppState>,
    params: QueryParams,
) -> ApiResult<ApiResponse> {
    let spec = state.query_spec(params);
    state.bookings.get_all(&spec, None).await
}

async fn create_booking(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<ApiResponse> {
    state.bookings.create_one(body).await
}

async fn get_booking(
    State(state): State<AppState>,
    Path(IdPath { id }): Path<IdPath>,
) -> ApiResult<ApiResponse> {
    state.bookings.get_one(&id, &[]).await
}

async fn update_booking(
    State(state): State<AppState>,
    Path(IdPath { id }): Path<IdPath>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<ApiResponse> {
    state.bookings.update_one(&id, body).await
}

async fn delete_booking(
    State(state): State<AppState>,
    Path(IdPath { id }): Path<IdPath>,
) -> ApiResult<ApiResponse> {
    state.bookings.delete_one(&id).await
}
