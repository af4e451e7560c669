//! Tours

use crate::core::error::ApiResult;
use crate::core::filter::{Condition, Filter, Populate, Projection};
use crate::core::model::Model;
use crate::core::pipeline::{Pipeline, Stage};
use crate::core::validation::filters::{round_decimals, slugify, trim_opt};
use crate::core::validation::validators::{failure, one_of};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use validator::{Validate, ValidationError};

pub const COLLECTION: &str = "tours";

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];

const DIFFICULTY_MESSAGE: &str = "Difficulty is either: easy, medium, difficult";

/// GeoJSON geometry kind; only points are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeoKind {
    #[default]
    Point,
}

/// A GeoJSON point with tour metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type", default)]
    pub kind: GeoKind,
    /// `[lng, lat]`
    #[serde(default)]
    pub coordinates: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_tour"))]
pub struct Tour {
    #[validate(
        required(message = "A tour must have a name"),
        length(min = 10, max = 40, message = "A tour name must have between 10 and 40 characters")
    )]
    pub name: Option<String>,
    pub slug: Option<String>,
    #[validate(required(message = "A tour must have a duration"))]
    pub duration: Option<u32>,
    #[validate(required(message = "A tour must have a group size"))]
    pub max_group_size: Option<u32>,
    #[validate(required(message = "A tour must have a difficulty"))]
    pub difficulty: Option<String>,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1.0 and 5.0"))]
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<u32>,
    #[validate(required(message = "A tour must have a price"))]
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    #[validate(required(message = "A tour must have a summary"))]
    pub summary: Option<String>,
    pub description: Option<String>,
    #[validate(required(message = "A tour must have a cover image"))]
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<String>>,
    pub secret_tour: Option<bool>,
    pub start_location: Option<Location>,
    pub locations: Option<Vec<Location>>,
    /// User ids
    pub guides: Option<Vec<String>>,
}

fn validate_tour(tour: &Tour) -> Result<(), ValidationError> {
    if let Some(difficulty) = &tour.difficulty {
        one_of(difficulty, &DIFFICULTIES, DIFFICULTY_MESSAGE)?;
    }
    if let (Some(discount), Some(price)) = (tour.price_discount, tour.price)
        && discount >= price
    {
        return Err(failure(
            "price_discount",
            format!("Discount price ({}) should be below regular price", discount),
        ));
    }
    Ok(())
}

/// Partial tour update
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_tour_patch"))]
pub struct TourPatch {
    #[validate(length(
        min = 10,
        max = 40,
        message = "A tour name must have between 10 and 40 characters"
    ))]
    pub name: Option<String>,
    pub duration: Option<u32>,
    pub max_group_size: Option<u32>,
    pub difficulty: Option<String>,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1.0 and 5.0"))]
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<u32>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<String>>,
    pub secret_tour: Option<bool>,
    pub start_location: Option<Location>,
    pub locations: Option<Vec<Location>>,
    pub guides: Option<Vec<String>>,
}

fn validate_tour_patch(patch: &TourPatch) -> Result<(), ValidationError> {
    match &patch.difficulty {
        Some(difficulty) => one_of(difficulty, &DIFFICULTIES, DIFFICULTY_MESSAGE),
        None => Ok(()),
    }
}

/// Tour guides, as embedded in tour responses
pub fn guides_populate() -> Populate {
    Populate::reference("guides", super::user::COLLECTION)
        .select(Projection::exclude([
            "__v",
            "passwordChangedAt",
            "password",
            "active",
        ]))
        .matching(super::user::active_filter())
}

/// Reviews of a tour, each with its author
pub fn reviews_populate() -> Populate {
    Populate::virtual_field("reviews", super::review::COLLECTION, "tour")
        .with_nested(vec![super::review::author_populate()])
}

fn not_secret() -> Filter {
    Filter::new().and("secretTour", Condition::Ne(json!(true)))
}

impl Model for Tour {
    type Patch = TourPatch;

    const HIDDEN_FIELDS: &'static [&'static str] = &["createdAt"];
    const UNIQUE_FIELDS: &'static [&'static [&'static str]] = &[&["name"]];
    const GEO_FIELDS: &'static [&'static str] = &["startLocation"];

    fn normalize(&mut self) {
        trim_opt(&mut self.name);
        trim_opt(&mut self.summary);
        trim_opt(&mut self.description);
        self.ratings_average = self.ratings_average.map(|r| round_decimals(r, 1));
    }

    fn normalize_patch(patch: &mut TourPatch) {
        trim_opt(&mut patch.name);
        trim_opt(&mut patch.summary);
        trim_opt(&mut patch.description);
        patch.ratings_average = patch.ratings_average.map(|r| round_decimals(r, 1));
    }

    fn before_persist(&mut self) -> ApiResult<()> {
        self.slug = self.name.as_deref().map(slugify);
        self.ratings_average.get_or_insert(4.5);
        self.ratings_quantity.get_or_insert(0);
        self.secret_tour.get_or_insert(false);
        Ok(())
    }

    fn default_filter() -> Filter {
        not_secret()
    }

    fn default_populate() -> Vec<Populate> {
        vec![guides_populate()]
    }

    fn derive_fields(doc: &mut Map<String, Value>) {
        if let Some(duration) = doc.get("duration").and_then(Value::as_f64) {
            doc.insert("durationWeeks".to_string(), json!(duration / 7.0));
        }
    }

    fn before_aggregate(pipeline: Pipeline) -> Pipeline {
        match pipeline.first() {
            Some(Stage::GeoNear { .. }) => pipeline,
            _ => pipeline.prepend(Stage::Match(not_secret())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ValidationError as FieldErrors;
    use crate::core::filter::GeoPoint;

    fn valid() -> Tour {
        serde_json::from_value(json!({
            "name": "  The Forest Hiker  ",
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "easy",
            "price": 397,
            "summary": " Breathtaking hike through the Canadian Banff National Park ",
            "imageCover": "tour-1-cover.jpg",
            "ratingsAverage": 4.66666
        }))
        .unwrap()
    }

    #[test]
    fn test_normalize_then_validate() {
        let mut tour = valid();
        tour.normalize();
        assert_eq!(tour.name.as_deref(), Some("The Forest Hiker"));
        assert_eq!(tour.ratings_average, Some(4.7));
        assert!(tour.check().is_ok());
    }

    #[test]
    fn test_before_persist_sets_slug_and_defaults() {
        let mut tour = valid();
        tour.normalize();
        tour.ratings_average = None;
        tour.before_persist().unwrap();
        assert_eq!(tour.slug.as_deref(), Some("the-forest-hiker"));
        assert_eq!(tour.ratings_average, Some(4.5));
        assert_eq!(tour.secret_tour, Some(false));
    }

    #[test]
    fn test_missing_required_fields() {
        let tour: Tour = serde_json::from_value(json!({"name": "Short"})).unwrap();
        let err = tour.check().unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Invalid input data."));
        assert!(message.contains("A tour must have a price"));
        assert!(message.contains("A tour name must have between 10 and 40 characters"));
    }

    #[test]
    fn test_invalid_difficulty() {
        let mut tour = valid();
        tour.difficulty = Some("extreme".into());
        let err = tour.check().unwrap_err();
        assert!(matches!(&err, FieldErrors::FieldErrors(_)));
        assert!(err.to_string().contains(DIFFICULTY_MESSAGE));
    }

    #[test]
    fn test_discount_must_be_below_price() {
        let mut tour = valid();
        tour.price_discount = Some(500.0);
        let err = tour.check().unwrap_err();
        assert!(err.to_string().contains("Discount price (500) should be below regular price"));
    }

    #[test]
    fn test_patch_validation() {
        let patch: TourPatch = serde_json::from_value(json!({"difficulty": "hard"})).unwrap();
        assert!(Tour::check_patch(&patch).is_err());

        let patch: TourPatch = serde_json::from_value(json!({"price": 1})).unwrap();
        assert!(Tour::check_patch(&patch).is_ok());
    }

    #[test]
    fn test_location_defaults_to_point() {
        let location: Location =
            serde_json::from_value(json!({"coordinates": [-80.1, 25.7]})).unwrap();
        assert_eq!(location.kind, GeoKind::Point);
        let value = serde_json::to_value(&location).unwrap();
        assert_eq!(value["type"], "Point");
        assert_eq!(
            GeoPoint::from_geojson(&value),
            Some(GeoPoint::new(-80.1, 25.7))
        );
    }

    #[test]
    fn test_aggregate_hides_secret_tours_unless_geo_near() {
        let pipeline = Tour::before_aggregate(Pipeline::new().limit(1));
        assert!(matches!(pipeline.first(), Some(Stage::Match(_))));

        let geo = Pipeline::new().geo_near(GeoPoint::new(0.0, 0.0), "distance", 0.001, "startLocation");
        let pipeline = Tour::before_aggregate(geo.clone());
        assert_eq!(pipeline, geo);
    }

    #[test]
    fn test_duration_weeks() {
        let mut doc = json!({"duration": 14}).as_object().unwrap().clone();
        Tour::derive_fields(&mut doc);
        assert_eq!(doc["durationWeeks"], json!(2.0));
    }
}
