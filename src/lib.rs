//! # natours
//!
//! A tour-booking REST API built on a small generic resource layer.
//!
//! ## Features
//!
//! - **Resource handler factory**: create / get / list / update / delete for
//!   any [`Model`](core::model::Model), with one envelope format
//! - **Query features**: filter, sort, field selection and pagination from
//!   the query string (`?price[gte]=100&sort=-price&fields=name&page=2`)
//! - **Lifecycle stages**: default filters, population of references, hidden
//!   fields and aggregation stages declared per model
//! - **Authentication**: HS256 tokens, argon2 password hashes, role checks
//! - **Storage**: in-memory store for development and tests, MongoDB behind
//!   the `mongodb_backend` feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use natours::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     ServerBuilder::new()
//!         .with_config(config)
//!         .with_store(Arc::new(InMemoryStore::new()))
//!         .serve()
//!         .await
//! }
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod handlers;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{Principal, Role, TokenService},
        error::{ApiError, ApiResult, StorageError, ValidationError},
        features::QueryFeatures,
        filter::{Condition, Filter, FindQuery, Populate, Projection, SortSpec},
        model::Model,
        pipeline::Pipeline,
        query::QuerySpec,
        resource::{ModelResource, ResourceDescriptor},
        service::DocumentStore,
    };

    // === Resources ===
    pub use crate::entities::{Booking, Review, Tour, User};
    pub use crate::handlers::{ApiResponse, ResourceHandlers};

    // === Storage ===
    pub use crate::storage::InMemoryStore;
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoStore;

    // === Config ===
    pub use crate::config::{AppConfig, Backend, Environment};

    // === Server ===
    pub use crate::server::{AppState, ServerBuilder};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
