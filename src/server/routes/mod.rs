//! `/api/v1` routes, one module per resource

pub mod bookings;
pub mod reviews;
pub mod tours;
pub mod users;

use serde::Deserialize;

/// `{id}` path segment
#[derive(Debug, Deserialize)]
pub struct IdPath {
    pub id: String,
}

/// `{tourId}` path segment
#[derive(Debug, Deserialize)]
pub struct TourPath {
    #[serde(rename = "tourId")]
    pub tour_id: String,
}
