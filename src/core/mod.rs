//! Core module: the resource layer every natours resource is built from

pub mod auth;
pub mod error;
pub mod extractors;
pub mod features;
pub mod filter;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod resource;
pub mod service;
pub mod validation;

pub use auth::{Principal, Role, TokenService};
pub use error::{ApiError, ApiResult, StorageError, ValidationError};
pub use features::QueryFeatures;
pub use filter::{Condition, Filter, Populate, Projection, SortSpec};
pub use model::Model;
pub use pipeline::Pipeline;
pub use query::QuerySpec;
pub use resource::{ModelResource, ResourceDescriptor};
pub use service::DocumentStore;
