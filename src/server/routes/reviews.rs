//! `/api/v1/reviews` and `/api/v1/tours/{tourId}/reviews`
//!
//! Every review route requires a logged-in user. Writing a review keeps the
//! tour's `ratingsQuantity` and `ratingsAverage` in step.

use super::{IdPath, TourPath};
use crate::core::auth::Principal;
use crate::core::error::ApiResult;
use crate::core::extractors::{ApiJson, QueryParams};
use crate::core::filter::ID_FIELD;
use crate::core::resource::{ResourceDescriptor, id_of, parse_id};
use crate::core::validation::filters::round_decimals;
use crate::entities::review::{DEFAULT_RATING, rating_stats};
use crate::handlers::{ApiResponse, ParentScope};
use crate::server::middleware::{REVIEW_EDITORS, REVIEWERS, protect, restrict_to, review_owner};
use crate::server::state::AppState;
use axum::Router;
use axum::extract::{Path, State};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, patch, post};
use serde_json::{Map, Value, json};

/// Top-level `/reviews` routes
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(get_all_reviews))
        .route(
            "/",
            post(create_review).route_layer(from_fn_with_state(REVIEWERS, restrict_to)),
        )
        .merge(item_routes(state))
        .route_layer(from_fn_with_state(state.clone(), protect))
}

/// Routes mounted under `/tours/{tourId}/reviews`
pub fn nested_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(get_tour_reviews))
        .route(
            "/",
            post(create_tour_review).route_layer(from_fn_with_state(REVIEWERS, restrict_to)),
        )
        .merge(item_routes(state))
        .route_layer(from_fn_with_state(state.clone(), protect))
}

fn item_routes(state: &AppState) -> Router<AppState> {
    Router::new().route("/{id}", get(get_review)).route(
        "/{id}",
        patch(update_review)
            .delete(delete_review)
            .route_layer(from_fn_with_state(state.clone(), review_owner))
            .route_layer(from_fn_with_state(REVIEW_EDITORS, restrict_to)),
    )
}

async fn get_all_reviews(
    State(state): State<AppState>,
    params: QueryParams,
) -> ApiResult<ApiResponse> {
    let spec = state.query_spec(params);
    state.reviews.get_all(&spec, None).await
}

async fn get_tour_reviews(
    State(state): State<AppState>,
    Path(TourPath { tour_id }): Path<TourPath>,
    params: QueryParams,
) -> ApiResult<ApiResponse> {
    let spec = state.query_spec(params);
    let scope = ParentScope {
        field: "tour",
        value: &tour_id,
    };
    state.reviews.get_all(&spec, Some(scope)).await
}

async fn create_review(
    State(state): State<AppState>,
    principal: Principal,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<ApiResponse> {
    create(&state, &principal, None, body).await
}

async fn create_tour_review(
    State(state): State<AppState>,
    Path(TourPath { tour_id }): Path<TourPath>,
    principal: Principal,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<ApiResponse> {
    create(&state, &principal, Some(tour_id), body).await
}

/// The author is always the caller; the tour comes from the body or the path
async fn create(
    state: &AppState,
    principal: &Principal,
    tour_id: Option<String>,
    body: Value,
) -> ApiResult<ApiResponse> {
    let mut body = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if !body.get("tour").is_some_and(Value::is_string)
        && let Some(tour_id) = tour_id
    {
        body.insert("tour".to_string(), Value::String(tour_id));
    }
    if let Some(tour) = body.get("tour").and_then(Value::as_str) {
        let normalized = parse_id(tour)?;
        body.insert("tour".to_string(), Value::String(normalized));
    }
    body.insert("user".to_string(), Value::String(principal.id.clone()));

    let response = state.reviews.create_one(Value::Object(body)).await?;
    refresh_from(state, &response).await?;
    Ok(response)
}

async fn get_review(
    State(state): State<AppState>,
    Path(IdPath { id }): Path<IdPath>,
) -> ApiResult<ApiResponse> {
    state.reviews.get_one(&id, &[]).await
}

async fn update_review(
    State(state): State<AppState>,
    Path(IdPath { id }): Path<IdPath>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<ApiResponse> {
    let response = state.reviews.update_one(&id, body).await?;
    refresh_from(&state, &response).await?;
    Ok(response)
}

async fn delete_review(
    State(state): State<AppState>,
    Path(IdPath { id }): Path<IdPath>,
) -> ApiResult<ApiResponse> {
    let tour = state
        .reviews
        .resource()
        .find_by_id(&id, &[])
        .await?
        .and_then(|review| tour_of(&review));

    let response = state.reviews.delete_one(&id).await?;
    if let Some(tour) = tour {
        refresh_tour_ratings(&state, &tour).await?;
    }
    Ok(response)
}

fn tour_of(review: &Value) -> Option<String> {
    review
        .get("tour")
        .and_then(|tour| tour.as_str().or_else(|| id_of(tour)))
        .map(String::from)
}

async fn refresh_from(state: &AppState, response: &ApiResponse) -> ApiResult<()> {
    if let ApiResponse::Single { record, .. } = response
        && let Some(tour) = tour_of(record)
    {
        refresh_tour_ratings(state, &tour).await?;
    }
    Ok(())
}

/// Recompute a tour's rating count and average from its reviews
pub async fn refresh_tour_ratings(state: &AppState, tour_id: &str) -> ApiResult<()> {
    let stats = state.reviews.resource().aggregate(rating_stats(tour_id)).await?;

    let (quantity, average) = match stats.first() {
        Some(stat) => (
            stat.get("nRating").and_then(Value::as_u64).unwrap_or(0),
            stat.get("avgRating")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_RATING),
        ),
        None => (0, DEFAULT_RATING),
    };

    let mut fields = Map::new();
    fields.insert("ratingsQuantity".to_string(), json!(quantity));
    fields.insert("ratingsAverage".to_string(), json!(round_decimals(average, 1)));

    let updated = state.tours.resource().update_fields(tour_id, fields).await?;
    tracing::debug!(
        tour = tour_id,
        quantity,
        average,
        found = updated.as_ref().and_then(|t| t.get(ID_FIELD)).is_some(),
        "tour ratings refreshed"
    );
    Ok(())
}
