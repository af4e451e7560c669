//! Resource handler factory and response envelopes

pub mod factory;
pub mod response;

pub use factory::{ParentScope, ResourceHandlers};
pub use response::ApiResponse;
