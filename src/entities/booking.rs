//! Bookings of a tour by a user

use crate::core::error::ApiResult;
use crate::core::filter::{Populate, Projection};
use crate::core::model::Model;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const COLLECTION: &str = "bookings";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[validate(required(message = "Booking must belong to a Tour!"))]
    pub tour: Option<String>,
    #[validate(required(message = "Booking must belong to a User!"))]
    pub user: Option<String>,
    #[validate(
        required(message = "Booking must have a price."),
        range(min = 0.0, message = "Booking price can not be negative")
    )]
    pub price: Option<f64>,
    pub paid: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct BookingPatch {
    #[validate(range(min = 0.0, message = "Booking price can not be negative"))]
    pub price: Option<f64>,
    pub paid: Option<bool>,
}

impl Model for Booking {
    type Patch = BookingPatch;

    fn before_persist(&mut self) -> ApiResult<()> {
        self.paid.get_or_insert(true);
        Ok(())
    }

    fn default_populate() -> Vec<Populate> {
        vec![
            Populate::reference("user", super::user::COLLECTION)
                .select(Projection::include_list("name,email,photo")),
            Populate::reference("tour", super::tour::COLLECTION)
                .select(Projection::include_list("name")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paid_defaults_to_true() {
        let mut booking: Booking =
            serde_json::from_value(json!({"tour": "t", "user": "u", "price": 497})).unwrap();
        assert!(booking.check().is_ok());
        booking.before_persist().unwrap();
        assert_eq!(booking.paid, Some(true));
    }

    #[test]
    fn test_price_is_required() {
        let booking: Booking = serde_json::from_value(json!({"tour": "t", "user": "u"})).unwrap();
        assert!(booking.check().unwrap_err().to_string().contains("Booking must have a price."));
    }
}
