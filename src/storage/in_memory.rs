//! In-memory implementation of DocumentStore for testing and development

use crate::core::error::StorageError;
use crate::core::filter::{Filter, FindQuery, ID_FIELD};
use crate::core::pipeline::Pipeline;
use crate::core::service::{DocumentStore, Index, StorageResult};
use crate::storage::eval::{lookup, matches, run_pipeline, sort_documents};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const BACKEND: &str = "memory";

#[derive(Default)]
struct Collection {
    /// Documents by id, in insertion order
    docs: IndexMap<String, Value>,
    unique: Vec<Vec<String>>,
}

impl Collection {
    /// Reject `candidate` if it collides with another document on a unique index
    fn check_unique(&self, candidate: &Value, own_id: &str) -> StorageResult<()> {
        for fields in &self.unique {
            let Some(key) = unique_key(candidate, fields) else {
                continue;
            };
            let clash = self
                .docs
                .iter()
                .filter(|(id, _)| id.as_str() != own_id)
                .any(|(_, doc)| unique_key(doc, fields).as_ref() == Some(&key));
            if clash {
                return Err(StorageError::DuplicateKey {
                    field: fields.join(", "),
                    value: key.iter().map(display_value).collect::<Vec<_>>().join(", "),
                });
            }
        }
        Ok(())
    }

    fn first_match(&self, filter: &Filter) -> Option<String> {
        self.docs
            .iter()
            .find(|(_, doc)| matches(doc, filter))
            .map(|(id, _)| id.clone())
    }
}

fn unique_key(doc: &Value, fields: &[String]) -> Option<Vec<Value>> {
    fields
        .iter()
        .map(|f| lookup(doc, f).filter(|v| !v.is_null()).cloned())
        .collect()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// In-memory document store
///
/// Useful for testing and development. Uses RwLock for thread-safe access;
/// every operation takes the lock once.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error(e: impl std::fmt::Display) -> StorageError {
        StorageError::QueryError {
            backend: BACKEND.to_string(),
            message: format!("Failed to acquire lock: {}", e),
        }
    }

    fn read<R>(&self, collection: &str, f: impl FnOnce(Option<&Collection>) -> R) -> StorageResult<R> {
        let collections = self.collections.read().map_err(Self::lock_error)?;
        Ok(f(collections.get(collection)))
    }

    fn write<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Collection) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let mut collections = self.collections.write().map_err(Self::lock_error)?;
        f(collections.entry(collection.to_string()).or_default())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert(&self, collection: &str, doc: Value) -> StorageResult<Value> {
        let id = doc
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| StorageError::Serialization {
                message: "document has no string id".to_string(),
            })?;

        self.write(collection, |coll| {
            coll.check_unique(&doc, &id)?;
            coll.docs.insert(id, doc.clone());
            Ok(doc)
        })
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> StorageResult<Vec<Value>> {
        let mut docs = self.read(collection, |coll| {
            coll.map(|c| {
                c.docs
                    .values()
                    .filter(|doc| matches(doc, &query.filter))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
        })?;

        sort_documents(&mut docs, &query.sort);

        let docs = docs
            .into_iter()
            .skip(usize::try_from(query.skip).unwrap_or(usize::MAX))
            .take(query.limit.and_then(|l| usize::try_from(l).ok()).unwrap_or(usize::MAX));

        Ok(match &query.projection {
            Some(projection) => docs.map(|doc| projection.apply(doc)).collect(),
            None => docs.collect(),
        })
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Value>> {
        self.read(collection, |coll| coll.and_then(|c| c.docs.get(id).cloned()))
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Map<String, Value>,
    ) -> StorageResult<Option<Value>> {
        self.write(collection, |coll| {
            let Some(id) = coll.first_match(filter) else {
                return Ok(None);
            };

            let mut updated = coll.docs.get(&id).cloned().unwrap_or(Value::Null);
            if let Some(map) = updated.as_object_mut() {
                map.extend(patch);
            }
            coll.check_unique(&updated, &id)?;
            coll.docs.insert(id, updated.clone());
            Ok(Some(updated))
        })
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> StorageResult<Option<Value>> {
        self.write(collection, |coll| {
            Ok(coll
                .first_match(filter)
                .and_then(|id| coll.docs.shift_remove(&id)))
        })
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> StorageResult<Vec<Value>> {
        let docs = self.read(collection, |coll| {
            coll.map(|c| c.docs.values().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        })?;
        run_pipeline(docs, pipeline)
    }

    async fn ensure_indexes(&self, collection: &str, indexes: &[Index]) -> StorageResult<()> {
        self.write(collection, |coll| {
            for index in indexes {
                if let Index::Unique(fields) = index
                    && !coll.unique.contains(fields)
                {
                    coll.unique.push(fields.clone());
                }
            }
            Ok(())
        })
    }
}
