//! The natours resources: each is a [`Model`](crate::core::model::Model)
//! stored in its own collection

pub mod booking;
pub mod review;
pub mod tour;
pub mod user;

pub use booking::{Booking, BookingPatch};
pub use review::{Review, ReviewPatch};
pub use tour::{Location, Tour, TourPatch};
pub use user::{PasswordChange, User, UserPatch};
