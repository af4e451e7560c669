//! `/api/v1/tours`

use super::{TourPath, reviews};
use crate::core::error::{ApiError, ApiResult};
use crate::core::extractors::{ApiJson, QueryParams};
use crate::core::filter::{Comparison, Condition, Filter, GeoPoint, Projection, SortSpec};
use crate::core::pipeline::{Accumulator, Expr, GROUP_KEY, Pipeline};
use crate::core::resource::{ResourceDescriptor, parse_id};
use crate::entities::tour::reviews_populate;
use crate::handlers::ApiResponse;
use crate::server::middleware::{GUIDES, STAFF, protect, restrict_to};
use crate::server::state::AppState;
use crate::server::uploads::{TourUpdateBody, process_tour_images};
use axum::Router;
use axum::extract::{Path, State};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, patch, post};
use serde_json::{Value, json};

const EARTH_RADIUS_MI: f64 = 3963.2;
const EARTH_RADIUS_KM: f64 = 6378.1;
const METERS_TO_MILES: f64 = 0.000621371192;
const METERS_TO_KM: f64 = 0.001;

pub fn routes(state: &AppState) -> Router<AppState> {
    let protect = from_fn_with_state(state.clone(), protect);
    let staff = from_fn_with_state(STAFF, restrict_to);

    Router::new()
        .route("/", get(get_all_tours))
        .route(
            "/",
            post(create_tour)
                .route_layer(staff.clone())
                .route_layer(protect.clone()),
        )
        .route("/top-5-cheap", get(top_five_cheap))
        .route("/tour-stats", get(tour_stats))
        .route(
            "/monthly-plan/{year}",
            get(monthly_plan)
                .route_layer(from_fn_with_state(GUIDES, restrict_to))
                .route_layer(protect.clone()),
        )
        .route(
            "/tours-within/{distance}/center/{latlng}/unit/{unit}",
            get(tours_within),
        )
        .route("/distances/{latlng}/unit/{unit}", get(distances))
        .route("/{tourId}", get(get_tour))
        .route(
            "/{tourId}",
            patch(update_tour)
                .delete(delete_tour)
                .route_layer(staff)
                .route_layer(protect),
        )
        .nest("/{tourId}/reviews", reviews::nested_routes(state))
}

async fn get_all_tours(
    State(state): State<AppState>,
    params: QueryParams,
) -> ApiResult<ApiResponse> {
    let spec = state.query_spec(params);
    state.tours.get_all(&spec, None).await
}

/// Five best rated, cheapest first among equals
async fn top_five_cheap(
    State(state): State<AppState>,
    params: QueryParams,
) -> ApiResult<ApiResponse> {
    let spec = state
        .query_spec(params)
        .with("limit", "5")
        .with("sort", "-ratingsAverage,price")
        .with("fields", "name,price,ratingsAverage,summary,difficulty");
    state.tours.get_all(&spec, None).await
}

async fn get_tour(
    State(state): State<AppState>,
    Path(TourPath { tour_id }): Path<TourPath>,
) -> ApiResult<ApiResponse> {
    state.tours.get_one(&tour_id, &[reviews_populate()]).await
}

async fn create_tour(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<ApiResponse> {
    state.tours.create_one(body).await
}

async fn update_tour(
    State(state): State<AppState>,
    Path(TourPath { tour_id }): Path<TourPath>,
    body: TourUpdateBody,
) -> ApiResult<ApiResponse> {
    let tour_id = parse_id(&tour_id)?;
    let body = match body {
        TourUpdateBody::Json(value) => value,
        TourUpdateBody::Form(form) => {
            Value::Object(process_tour_images(&state.images, &tour_id, form).await?)
        }
    };
    state.tours.update_one(&tour_id, body).await
}

async fn delete_tour(
    State(state): State<AppState>,
    Path(TourPath { tour_id }): Path<TourPath>,
) -> ApiResult<ApiResponse> {
    state.tours.delete_one(&tour_id).await
}

/// Per-difficulty statistics of well rated tours
pub fn stats_pipeline() -> Pipeline {
    Pipeline::new()
        .match_(Filter::new().and(
            "ratingsAverage",
            Condition::Compare(Comparison::Gte, json!(4.5)),
        ))
        .group(
            Expr::upper(Expr::field("difficulty")),
            vec![
                ("numTours".to_string(), Accumulator::count()),
                ("numRating".to_string(), Accumulator::Sum(Expr::field("ratingsQuantity"))),
                ("avgRating".to_string(), Accumulator::Avg(Expr::field("ratingsAverage"))),
                ("avgPrice".to_string(), Accumulator::Avg(Expr::field("price"))),
                ("minPrice".to_string(), Accumulator::Min(Expr::field("price"))),
                ("maxPrice".to_string(), Accumulator::Max(Expr::field("price"))),
            ],
        )
        .sort(SortSpec::parse("avgPrice"))
}

async fn tour_stats(State(state): State<AppState>) -> ApiResult<ApiResponse> {
    let stats = state.tours.resource().aggregate(stats_pipeline()).await?;
    Ok(ApiResponse::named("stats", Value::Array(stats)))
}

/// Tour starts per month of `year`, busiest month first
pub fn monthly_plan_pipeline(year: i32) -> Pipeline {
    Pipeline::new()
        .unwind("startDates")
        .match_(
            Filter::new()
                .and(
                    "startDates",
                    Condition::Compare(Comparison::Gte, json!(format!("{}-01-01", year))),
                )
                .and(
                    "startDates",
                    Condition::Compare(Comparison::Lte, json!(format!("{}-12-31", year))),
                ),
        )
        .group(
            Expr::month(Expr::field("startDates")),
            vec![
                ("numTourStarts".to_string(), Accumulator::count()),
                ("tours".to_string(), Accumulator::Push(Expr::field("name"))),
            ],
        )
        .add_fields(vec![("month".to_string(), Expr::field(GROUP_KEY))])
        .project(Projection::exclude([GROUP_KEY]))
        .sort(SortSpec::parse("-numTourStarts"))
        .limit(12)
}

async fn monthly_plan(
    State(state): State<AppState>,
    Path(year): Path<String>,
) -> ApiResult<ApiResponse> {
    let year: i32 = year.parse().map_err(|_| ApiError::BadRequest {
        message: format!("Invalid year: {}", year),
    })?;
    let plan = state
        .tours
        .resource()
        .aggregate(monthly_plan_pipeline(year))
        .await?;
    Ok(ApiResponse::named("plan", Value::Array(plan)))
}

/// Parse `lat,lng`
pub fn parse_lat_lng(latlng: &str) -> ApiResult<GeoPoint> {
    let parsed = latlng.split_once(',').and_then(|(lat, lng)| {
        Some(GeoPoint::new(
            lng.trim().parse().ok()?,
            lat.trim().parse().ok()?,
        ))
    });
    parsed.ok_or_else(|| ApiError::BadRequest {
        message: "Please provide latitude and longitude in the format lat,lng.".to_string(),
    })
}

async fn tours_within(
    State(state): State<AppState>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> ApiResult<ApiResponse> {
    let center = parse_lat_lng(&latlng)?;
    let distance: f64 = distance.parse().map_err(|_| ApiError::BadRequest {
        message: "Please provide the distance as a number.".to_string(),
    })?;
    let radius = match unit.as_str() {
        "mi" => distance / EARTH_RADIUS_MI,
        _ => distance / EARTH_RADIUS_KM,
    };

    let tours = state.tours.resource();
    let filter = Filter::new().and("startLocation", Condition::GeoWithin { center, radius });
    let records = tours.execute(tours.find(filter)).await?;
    Ok(ApiResponse::list("data", records))
}

async fn distances(
    State(state): State<AppState>,
    Path((latlng, unit)): Path<(String, String)>,
) -> ApiResult<ApiResponse> {
    let near = parse_lat_lng(&latlng)?;
    let multiplier = match unit.as_str() {
        "mi" => METERS_TO_MILES,
        _ => METERS_TO_KM,
    };

    let pipeline = Pipeline::new()
        .geo_near(near, "distance", multiplier, "startLocation")
        .project(Projection::include_list("distance,name"));
    let distances = state.tours.resource().aggregate(pipeline).await?;
    Ok(ApiResponse::named("data", Value::Array(distances)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::Stage;

    #[test]
    fn test_parse_lat_lng() {
        let point = parse_lat_lng("34.111745,-118.113491").unwrap();
        assert_eq!(point, GeoPoint::new(-118.113491, 34.111745));
    }

    #[test]
    fn test_parse_lat_lng_rejects_malformed() {
        for input in ["34.1", "north,west", ""] {
            let err = parse_lat_lng(input).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Please provide latitude and longitude in the format lat,lng."
            );
        }
    }

    #[test]
    fn test_monthly_plan_pipeline_shape() {
        let pipeline = monthly_plan_pipeline(2021);
        let stages = pipeline.stages();
        assert!(matches!(stages[0], Stage::Unwind(ref f) if f == "startDates"));
        assert!(matches!(stages.last(), Some(Stage::Limit(12))));
    }
}
