//! Model seam: what a record type declares about itself
//!
//! A [`Model`] is the typed shape of a create payload. It owns its validation
//! rules (through `validator`), the shape of a partial update
//! ([`Model::Patch`]) and the lifecycle stages the resource layer runs around
//! each store call.
//!
//! # Example
//!
//! ```rust,ignore
//! impl Model for Review {
//!     type Patch = ReviewPatch;
//!
//!     const UNIQUE_FIELDS: &'static [&'static [&'static str]] = &[&["tour", "user"]];
//!
//!     fn default_populate() -> Vec<Populate> {
//!         vec![Populate::reference("user", "users").select(Projection::include_list("name,photo"))]
//!     }
//! }
//! ```

use crate::core::error::{ApiResult, ValidationError};
use crate::core::filter::{Filter, Populate};
use crate::core::pipeline::Pipeline;
use crate::core::service::Index;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use validator::Validate;

/// A record type stored in one collection
pub trait Model: Serialize + DeserializeOwned + Validate + Send + Sync + 'static {
    /// Partial update payload; `None` fields are left untouched
    type Patch: Serialize + DeserializeOwned + Validate + Send + Sync;

    /// Fields stripped from every response
    const HIDDEN_FIELDS: &'static [&'static str] = &[];

    /// Field sets whose combined value is unique in the collection
    const UNIQUE_FIELDS: &'static [&'static [&'static str]] = &[];

    /// GeoJSON point fields queried with geo operators
    const GEO_FIELDS: &'static [&'static str] = &[];

    /// Normalize field values (trim, lower-case, round) before validation
    fn normalize(&mut self) {}

    /// Normalize a patch before validation
    fn normalize_patch(_patch: &mut Self::Patch) {}

    /// Validate a create payload
    fn check(&self) -> Result<(), ValidationError> {
        self.validate().map_err(ValidationError::from)
    }

    /// Validate an update payload
    fn check_patch(patch: &Self::Patch) -> Result<(), ValidationError> {
        patch.validate().map_err(ValidationError::from)
    }

    /// Runs after validation, before the record is first stored
    fn before_persist(&mut self) -> ApiResult<()> {
        Ok(())
    }

    /// Runs after validation, before a patch is applied
    fn before_update(_patch: &mut Self::Patch) -> ApiResult<()> {
        Ok(())
    }

    /// Clauses AND-ed into every find
    fn default_filter() -> Filter {
        Filter::new()
    }

    /// Relations expanded on every find
    fn default_populate() -> Vec<Populate> {
        Vec::new()
    }

    /// Add derived fields to an outgoing record
    fn derive_fields(_doc: &mut Map<String, Value>) {}

    /// Rewrite a pipeline before it reaches the store
    fn before_aggregate(pipeline: Pipeline) -> Pipeline {
        pipeline
    }

    /// Indexes derived from the unique and geo declarations
    fn indexes() -> Vec<Index> {
        Self::UNIQUE_FIELDS
            .iter()
            .map(|fields| Index::unique(fields.iter().copied()))
            .chain(Self::GEO_FIELDS.iter().map(|f| Index::Geo(f.to_string())))
            .collect()
    }
}
