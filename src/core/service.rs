//! Storage seam shared by every resource
//!
//! A [`DocumentStore`] keeps JSON documents grouped in named collections.
//! Documents carry their identifier under `id`; backends map it to whatever
//! their native key is. Relation expansion (`FindQuery::populate`) is done by
//! the resource layer, stores ignore it.

use crate::core::error::StorageError;
use crate::core::filter::{Filter, FindQuery};
use crate::core::pipeline::Pipeline;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Result type of storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Index declared on a collection at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    /// The combination of these fields is unique across the collection
    Unique(Vec<String>),
    /// Spherical geo index over a GeoJSON point field
    Geo(String),
}

impl Index {
    pub fn unique<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Index::Unique(fields.into_iter().map(Into::into).collect())
    }
}

/// Document storage used by resource descriptors
///
/// Every method is one atomic operation against one collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document (which already carries its `id`)
    async fn insert(&self, collection: &str, doc: Value) -> StorageResult<Value>;

    /// Run a find query: filter, sort, skip, limit, then projection
    async fn find(&self, collection: &str, query: &FindQuery) -> StorageResult<Vec<Value>>;

    /// Fetch by identifier without any filter applied
    async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Value>>;

    /// Set `patch` on the first document matching `filter`; returns the updated document
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Map<String, Value>,
    ) -> StorageResult<Option<Value>>;

    /// Remove the first document matching `filter`; returns the removed document
    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> StorageResult<Option<Value>>;

    /// Run an aggregation pipeline
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> StorageResult<Vec<Value>>;

    /// Declare indexes; repeated calls are harmless
    async fn ensure_indexes(&self, collection: &str, indexes: &[Index]) -> StorageResult<()>;
}
