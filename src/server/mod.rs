//! HTTP server: shared state, middleware, routes and the [`ServerBuilder`]
//!
//! Every resource lives under `/api/v1`; unknown paths fall through to a
//! `RouteNotFound` error envelope.

pub mod builder;
pub mod middleware;
pub mod payments;
pub mod routes;
pub mod state;
pub mod uploads;

pub use builder::{ServerBuilder, router};
pub use payments::{CheckoutRequest, CheckoutSession, PaymentGateway};
pub use state::AppState;
pub use uploads::{DiskImageStore, ImageStore};
