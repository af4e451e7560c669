//! Resource descriptors: one collection of uniform records
//!
//! The handler factory is generic over [`ResourceDescriptor`]. The provided
//! implementation, [`ModelResource`], binds a [`Model`] to a collection of a
//! [`DocumentStore`] and runs the model's lifecycle stages around each call.

use crate::core::error::{ApiError, ApiResult};
use crate::core::filter::{
    CREATED_AT_FIELD, Condition, Filter, FindQuery, ID_FIELD, Populate, Relation, VERSION_FIELD,
};
use crate::core::model::Model;
use crate::core::pipeline::Pipeline;
use crate::core::service::{DocumentStore, StorageResult};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Capability set the handler factory needs from a resource
#[async_trait]
pub trait ResourceDescriptor: Send + Sync + 'static {
    /// Collection name, also the key of list responses
    fn collection(&self) -> &str;

    /// Base find query: the resource's default clauses AND `filter`
    fn find(&self, filter: Filter) -> FindQuery;

    /// Execute a find query built from [`find`](Self::find)
    async fn execute(&self, query: FindQuery) -> ApiResult<Vec<Value>>;

    /// Validate and store a new record
    async fn create(&self, body: Value) -> ApiResult<Value>;

    async fn find_by_id(&self, id: &str, populate: &[Populate]) -> ApiResult<Option<Value>>;

    /// Validate `body` as a partial update and apply it atomically
    async fn find_by_id_and_update(&self, id: &str, body: Value) -> ApiResult<Option<Value>>;

    async fn find_by_id_and_delete(&self, id: &str) -> ApiResult<Option<Value>>;

    async fn aggregate(&self, pipeline: Pipeline) -> ApiResult<Vec<Value>>;
}

/// Check that `id` is a well-formed record identifier
pub fn parse_id(id: &str) -> ApiResult<String> {
    Uuid::parse_str(id)
        .map(|uuid| uuid.to_string())
        .map_err(|_| ApiError::InvalidId {
            value: id.to_string(),
        })
}

/// Identifier of a stored document
pub fn id_of(doc: &Value) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// A [`Model`] stored in one collection
pub struct ModelResource<M> {
    store: Arc<dyn DocumentStore>,
    collection: String,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> ModelResource<M> {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            _model: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Declare the model's indexes on the collection
    pub async fn ensure_indexes(&self) -> StorageResult<()> {
        self.store
            .ensure_indexes(&self.collection, &M::indexes())
            .await
    }

    /// First record matching `filter` with hidden fields kept
    pub async fn find_one_with_hidden(&self, filter: Filter) -> ApiResult<Option<Value>> {
        let query = FindQuery::new(M::default_filter()).where_(filter).limit(1);
        let docs = self.store.find(&self.collection, &query).await?;
        Ok(docs.into_iter().next())
    }

    /// Set fields directly, bypassing patch validation
    pub async fn update_fields(
        &self,
        id: &str,
        fields: Map<String, Value>,
    ) -> ApiResult<Option<Value>> {
        let filter = self.scoped(id)?;
        let updated = self
            .store
            .find_one_and_update(&self.collection, &filter, fields)
            .await?;
        Ok(updated.map(|doc| self.present(doc)))
    }

    fn scoped(&self, id: &str) -> ApiResult<Filter> {
        let id = parse_id(id)?;
        Ok(M::default_filter().and(ID_FIELD, Condition::Eq(Value::String(id))))
    }

    /// Strip hidden fields and add derived ones
    fn present(&self, mut doc: Value) -> Value {
        if let Some(map) = doc.as_object_mut() {
            for field in M::HIDDEN_FIELDS {
                map.remove(*field);
            }
            M::derive_fields(map);
        }
        doc
    }

    async fn expand(&self, doc: Value) -> ApiResult<Value> {
        let mut docs = vec![doc];
        populate_documents(self.store.as_ref(), &mut docs, &M::default_populate()).await?;
        let doc = docs.pop().unwrap_or(Value::Null);
        Ok(self.present(doc))
    }
}

#[async_trait]
impl<M: Model> ResourceDescriptor for ModelResource<M> {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn find(&self, filter: Filter) -> FindQuery {
        M::default_populate().into_iter().fold(
            FindQuery::new(M::default_filter()).where_(filter),
            FindQuery::populate,
        )
    }

    async fn execute(&self, query: FindQuery) -> ApiResult<Vec<Value>> {
        let mut docs = self.store.find(&self.collection, &query).await?;
        populate_documents(self.store.as_ref(), &mut docs, &query.populate).await?;
        Ok(docs.into_iter().map(|doc| self.present(doc)).collect())
    }

    async fn create(&self, body: Value) -> ApiResult<Value> {
        let mut model: M = serde_json::from_value(body)?;
        model.normalize();
        model.check()?;
        model.before_persist()?;

        let mut doc = to_fields(&model)?;
        doc.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
        doc.entry(CREATED_AT_FIELD)
            .or_insert_with(|| Value::String(timestamp()));
        doc.insert(VERSION_FIELD.to_string(), Value::from(0));

        let stored = self.store.insert(&self.collection, Value::Object(doc)).await?;
        tracing::debug!(collection = %self.collection, id = ?id_of(&stored), "record created");
        Ok(self.present(stored))
    }

    async fn find_by_id(&self, id: &str, populate: &[Populate]) -> ApiResult<Option<Value>> {
        let id = parse_id(id)?;
        let query = populate.iter().cloned().fold(
            self.find(Filter::eq(ID_FIELD, id)).limit(1),
            FindQuery::populate,
        );
        Ok(self.execute(query).await?.into_iter().next())
    }

    async fn find_by_id_and_update(&self, id: &str, body: Value) -> ApiResult<Option<Value>> {
        let filter = self.scoped(id)?;
        let mut patch: M::Patch = serde_json::from_value(body)?;
        M::normalize_patch(&mut patch);
        M::check_patch(&patch)?;
        M::before_update(&mut patch)?;

        let fields = to_fields(&patch)?;
        let updated = self
            .store
            .find_one_and_update(&self.collection, &filter, fields)
            .await?;

        match updated {
            Some(doc) => Ok(Some(self.expand(doc).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_id_and_delete(&self, id: &str) -> ApiResult<Option<Value>> {
        let filter = self.scoped(id)?;
        let removed = self
            .store
            .find_one_and_delete(&self.collection, &filter)
            .await?;
        Ok(removed.map(|doc| self.present(doc)))
    }

    async fn aggregate(&self, pipeline: Pipeline) -> ApiResult<Vec<Value>> {
        let pipeline = M::before_aggregate(pipeline);
        Ok(self.store.aggregate(&self.collection, &pipeline).await?)
    }
}

/// Current time in the format stored on records
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serialize to a field map, dropping absent values
fn to_fields<T: Serialize>(value: &T) -> ApiResult<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(mut map) => {
            map.retain(|_, v| !v.is_null());
            Ok(map)
        }
        other => Err(ApiError::Internal(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

// =============================================================================
// Relation expansion
// =============================================================================

/// Replace stored references with the related documents, recursively
pub fn populate_documents<'a>(
    store: &'a dyn DocumentStore,
    docs: &'a mut [Value],
    populates: &'a [Populate],
) -> BoxFuture<'a, StorageResult<()>> {
    async move {
        if docs.is_empty() {
            return Ok(());
        }
        for populate in populates {
            match &populate.relation {
                Relation::Reference => populate_reference(store, docs, populate).await?,
                Relation::Virtual { foreign_field } => {
                    populate_virtual(store, docs, populate, foreign_field).await?
                }
            }
        }
        Ok(())
    }
    .boxed()
}

async fn load_related(
    store: &dyn DocumentStore,
    populate: &Populate,
    filter: Filter,
) -> StorageResult<Vec<Value>> {
    let mut query = FindQuery::new(populate.filter.clone()).where_(filter);
    if let Some(select) = &populate.select {
        query = query.select(select.clone());
    }
    let mut related = store.find(&populate.collection, &query).await?;
    populate_documents(store, &mut related, &populate.nested).await?;
    Ok(related)
}

async fn populate_reference(
    store: &dyn DocumentStore,
    docs: &mut [Value],
    populate: &Populate,
) -> StorageResult<()> {
    let mut ids: Vec<Value> = Vec::new();
    for doc in docs.iter() {
        let refs = match doc.get(&populate.path) {
            Some(Value::String(id)) => vec![id.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect(),
            _ => continue,
        };
        for id in refs {
            let id = Value::String(id);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    if ids.is_empty() {
        return Ok(());
    }

    let related = load_related(store, populate, Filter::new().and(ID_FIELD, Condition::In(ids))).await?;
    let by_id: HashMap<String, Value> = related
        .into_iter()
        .filter_map(|r| id_of(&r).map(String::from).map(|id| (id, r)))
        .collect();

    for doc in docs.iter_mut() {
        let replacement = match doc.get(&populate.path) {
            Some(Value::String(id)) => by_id.get(id).cloned().unwrap_or(Value::Null),
            Some(Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .filter_map(|i| i.as_str().and_then(|id| by_id.get(id)).cloned())
                    .collect(),
            ),
            _ => continue,
        };
        if let Some(map) = doc.as_object_mut() {
            map.insert(populate.path.clone(), replacement);
        }
    }
    Ok(())
}

async fn populate_virtual(
    store: &dyn DocumentStore,
    docs: &mut [Value],
    populate: &Populate,
    foreign_field: &str,
) -> StorageResult<()> {
    let ids: Vec<Value> = docs
        .iter()
        .filter_map(|d| id_of(d).map(|id| Value::String(id.to_string())))
        .collect();

    let related = load_related(
        store,
        populate,
        Filter::new().and(foreign_field, Condition::In(ids)),
    )
    .await?;

    let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
    for r in related {
        let owner = match r.get(foreign_field) {
            Some(Value::String(id)) => id.clone(),
            Some(other) => match id_of(other) {
                Some(id) => id.to_string(),
                None => continue,
            },
            None => continue,
        };
        grouped.entry(owner).or_default().push(r);
    }

    for doc in docs.iter_mut() {
        let items = id_of(doc)
            .and_then(|id| grouped.remove(id))
            .unwrap_or_default();
        if let Some(map) = doc.as_object_mut() {
            map.insert(populate.path.clone(), Value::Array(items));
        }
    }
    Ok(())
}
