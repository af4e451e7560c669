//! Reviews: one per user and tour

use crate::core::filter::{Filter, Populate, Projection};
use crate::core::model::Model;
use crate::core::pipeline::{Accumulator, Expr, Pipeline};
use crate::core::validation::filters::trim_opt;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const COLLECTION: &str = "reviews";

/// Rating a tour gets while it has no reviews
pub const DEFAULT_RATING: f64 = 4.5;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[validate(required(message = "Review can not be empty!"))]
    pub review: Option<String>,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: Option<f64>,
    #[validate(required(message = "Review must belong to a tour."))]
    pub tour: Option<String>,
    #[validate(required(message = "Review must belong to a user."))]
    pub user: Option<String>,
}

/// Only the text and rating of a review can change
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ReviewPatch {
    pub review: Option<String>,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be between 1 and 5"))]
    pub rating: Option<f64>,
}

/// The review's author, name and photo only
pub fn author_populate() -> Populate {
    Populate::reference("user", super::user::COLLECTION).select(Projection::include_list("name,photo"))
}

/// Count and mean rating of the reviews of one tour
pub fn rating_stats(tour_id: &str) -> Pipeline {
    Pipeline::new()
        .match_(Filter::eq("tour", tour_id))
        .group(
            Expr::field("tour"),
            vec![
                ("nRating".to_string(), Accumulator::count()),
                ("avgRating".to_string(), Accumulator::Avg(Expr::field("rating"))),
            ],
        )
}

impl Model for Review {
    type Patch = ReviewPatch;

    const UNIQUE_FIELDS: &'static [&'static [&'static str]] = &[&["tour", "user"]];

    fn normalize(&mut self) {
        trim_opt(&mut self.review);
    }

    fn normalize_patch(patch: &mut ReviewPatch) {
        trim_opt(&mut patch.review);
    }

    fn default_populate() -> Vec<Populate> {
        vec![author_populate()]
    }
}
