//! MongoDB storage backend using the official MongoDB async driver.
//!
//! Provides `MongoStore`, a [`DocumentStore`] backed by a `mongodb::Database`.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag:
//! ```toml
//! [dependencies]
//! natours = { version = "0.1", features = ["mongodb_backend"] }
//! ```
//!
//! # Storage model
//!
//! One MongoDB collection per resource collection. Documents are converted
//! through `serde_json::Value`, so identifiers and dates are stored as
//! strings. The `id` field is mapped to MongoDB's `_id` convention, in
//! documents as well as in filters, sorts, projections and pipelines.
//!
//! Query-string literals arrive as strings. Equality clauses match the string
//! and its native variants (`"5"` also matches `5`); comparison clauses use
//! the numeric value when the literal parses as a number.

use crate::core::error::StorageError;
use crate::core::filter::{Clause, Condition, Direction, Filter, FindQuery, ID_FIELD, Projection, SortSpec};
use crate::core::pipeline::{Accumulator, Expr, GROUP_KEY, Pipeline, Stage};
use crate::core::service::{DocumentStore, Index, StorageResult};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Database, IndexModel};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

const BACKEND: &str = "MongoDB";

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn query_error(context: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::QueryError {
        backend: BACKEND.to_string(),
        message: format!("{}: {}", context, e),
    }
}

/// Map a driver error, recognizing unique index violations
fn write_error(context: &str, e: mongodb::error::Error) -> StorageError {
    let message = e.to_string();
    if !message.contains("E11000") {
        return query_error(context, message);
    }

    static FIELD: OnceLock<Regex> = OnceLock::new();
    static VALUE: OnceLock<Regex> = OnceLock::new();
    let field = FIELD
        .get_or_init(|| Regex::new(r"dup key: \{ ?([^:\s]+)\s*:").expect("valid regex"))
        .captures(&message)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let value = VALUE
        .get_or_init(|| Regex::new(r#"dup key: \{[^"]*"((?:[^"\\]|\\.)*)""#).expect("valid regex"))
        .captures(&message)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    StorageError::DuplicateKey { field, value }
}

/// Document field name for a record field
fn mongo_field(field: &str) -> &str {
    if field == ID_FIELD { "_id" } else { field }
}

/// Convert a serde_json::Value into BSON
fn to_bson(value: &Value) -> StorageResult<Bson> {
    mongodb::bson::to_bson(value).map_err(|e| StorageError::Serialization {
        message: format!("Failed to convert JSON to BSON: {}", e),
    })
}

/// Convert a serde_json::Value (expected to be an Object) into a BSON Document,
/// renaming `id` → `_id` for MongoDB convention.
fn json_to_document(json: Value) -> StorageResult<Document> {
    let mut doc = match to_bson(&json)? {
        Bson::Document(d) => d,
        _ => {
            return Err(StorageError::Serialization {
                message: "Expected BSON document, got non-object".to_string(),
            });
        }
    };

    if let Some(id) = doc.remove(ID_FIELD) {
        doc.insert("_id", id);
    }

    Ok(doc)
}

/// Convert a BSON Document back into a serde_json::Value,
/// renaming `_id` → `id` for record convention.
fn document_to_json(mut doc: Document) -> Value {
    if let Some(id) = doc.remove("_id") {
        doc.insert(ID_FIELD, id);
    }

    Bson::Document(doc).into_relaxed_extjson()
}

/// Native variants a query-string literal may be stored as
fn literal_variants(value: &str) -> Vec<Bson> {
    let mut variants: Vec<Bson> = vec![Bson::String(value.to_string())];

    match value {
        "true" => variants.push(Bson::Boolean(true)),
        "false" => variants.push(Bson::Boolean(false)),
        _ => {
            if let Ok(i) = value.parse::<i64>() {
                variants.push(Bson::Int64(i));
                variants.push(Bson::Double(i as f64));
            } else if let Ok(f) = value.parse::<f64>() {
                variants.push(Bson::Double(f));
            }
        }
    }

    variants
}

/// Comparison operand: numeric when the literal is a number
fn comparable(value: &Value) -> StorageResult<Bson> {
    if let Value::String(s) = value
        && let Ok(f) = s.trim().parse::<f64>()
    {
        return Ok(Bson::Double(f));
    }
    to_bson(value)
}

fn clause_to_document(clause: &Clause) -> StorageResult<Document> {
    let field = mongo_field(&clause.field);
    let condition = match &clause.condition {
        Condition::Eq(Value::String(s)) => {
            let mut variants = literal_variants(s);
            if variants.len() == 1 {
                variants.remove(0)
            } else {
                Bson::Document(doc! { "$in": variants })
            }
        }
        Condition::Eq(value) => to_bson(value)?,
        Condition::Ne(value) => Bson::Document(doc! { "$ne": to_bson(value)? }),
        Condition::Compare(op, value) => {
            let operator = op.operator();
            Bson::Document(doc! { operator: comparable(value)? })
        }
        Condition::In(values) => {
            let values = values.iter().map(to_bson).collect::<StorageResult<Vec<_>>>()?;
            Bson::Document(doc! { "$in": values })
        }
        Condition::GeoWithin { center, radius } => Bson::Document(doc! {
            "$geoWithin": { "$centerSphere": [[center.lng, center.lat], *radius] }
        }),
    };
    Ok(doc! { field: condition })
}

fn filter_to_document(filter: &Filter) -> StorageResult<Document> {
    let mut clauses = filter
        .clauses()
        .iter()
        .map(clause_to_document)
        .collect::<StorageResult<Vec<_>>>()?;

    Ok(match clauses.len() {
        0 => Document::new(),
        1 => clauses.remove(0),
        _ => doc! { "$and": clauses },
    })
}

fn sort_to_document(sort: &SortSpec) -> Document {
    let mut doc = Document::new();
    for key in sort.keys() {
        let direction = match key.direction {
            Direction::Ascending => 1,
            Direction::Descending => -1,
        };
        doc.insert(mongo_field(&key.field), direction);
    }
    doc
}

fn projection_to_document(projection: &Projection) -> Document {
    let (fields, flag) = match projection {
        Projection::Include(fields) => (fields, 1),
        Projection::Exclude(fields) => (fields, 0),
    };
    fields
        .iter()
        .map(|f| (mongo_field(f).to_string(), Bson::Int32(flag)))
        .collect()
}

fn expr_to_bson(expr: &Expr) -> StorageResult<Bson> {
    Ok(match expr {
        Expr::Field(field) => Bson::String(format!("${}", mongo_field(field))),
        Expr::Literal(value) => Bson::Document(doc! { "$literal": to_bson(value)? }),
        Expr::ToUpper(inner) => Bson::Document(doc! { "$toUpper": expr_to_bson(inner)? }),
        Expr::Month(inner) => {
            Bson::Document(doc! { "$month": { "$toDate": expr_to_bson(inner)? } })
        }
        Expr::Null => Bson::Null,
    })
}

fn accumulator_to_document(acc: &Accumulator) -> StorageResult<Document> {
    Ok(match acc {
        Accumulator::Sum(e) => doc! { "$sum": expr_to_bson(e)? },
        Accumulator::Avg(e) => doc! { "$avg": expr_to_bson(e)? },
        Accumulator::Min(e) => doc! { "$min": expr_to_bson(e)? },
        Accumulator::Max(e) => doc! { "$max": expr_to_bson(e)? },
        Accumulator::Push(e) => doc! { "$push": expr_to_bson(e)? },
    })
}

fn stage_to_document(stage: &Stage) -> StorageResult<Document> {
    Ok(match stage {
        Stage::Match(filter) => doc! { "$match": filter_to_document(filter)? },
        Stage::GeoNear {
            near,
            distance_field,
            distance_multiplier,
            key,
        } => doc! {
            "$geoNear": {
                "near": { "type": "Point", "coordinates": [near.lng, near.lat] },
                "distanceField": distance_field.as_str(),
                "distanceMultiplier": *distance_multiplier,
                "key": key.as_str(),
                "spherical": true,
            }
        },
        Stage::Group { id, fields } => {
            let mut group = doc! { "_id": expr_to_bson(id)? };
            for (name, acc) in fields {
                group.insert(name.as_str(), accumulator_to_document(acc)?);
            }
            doc! { "$group": group }
        }
        Stage::Sort(sort) => doc! { "$sort": sort_to_document(sort) },
        Stage::Unwind(field) => doc! { "$unwind": format!("${}", mongo_field(field)) },
        Stage::AddFields(fields) => {
            let mut added = Document::new();
            for (name, expr) in fields {
                added.insert(mongo_field(name), expr_to_bson(expr)?);
            }
            doc! { "$addFields": added }
        }
        Stage::Project(projection) => doc! { "$project": projection_to_document(projection) },
        Stage::Limit(limit) => doc! { "$limit": i64::try_from(*limit).unwrap_or(i64::MAX) },
    })
}

/// Render a pipeline into MongoDB stage documents
pub fn pipeline_to_documents(pipeline: &Pipeline) -> StorageResult<Vec<Document>> {
    pipeline.stages().iter().map(stage_to_document).collect()
}

// ---------------------------------------------------------------------------
// MongoStore
// ---------------------------------------------------------------------------

/// Document store backed by MongoDB.
///
/// # Example
///
/// ```rust,ignore
/// use mongodb::Client;
/// use natours::storage::MongoStore;
///
/// let client = Client::with_uri_str("mongodb://localhost:27017").await?;
/// let store = MongoStore::new(client.database("natours"));
/// let tours = ModelResource::<Tour>::new(Arc::new(store), "tours");
/// ```
#[derive(Clone, Debug)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Create a new `MongoStore` with the given database handle.
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Connect to `uri` and use `database`.
    pub async fn connect(uri: &str, database: &str) -> StorageResult<Self> {
        let client = mongodb::Client::with_uri_str(uri)
            .await
            .map_err(|e| StorageError::ConnectionError {
                backend: BACKEND.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::new(client.database(database)))
    }

    /// Get a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.database.collection(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert(&self, collection: &str, doc: Value) -> StorageResult<Value> {
        let document = json_to_document(doc)?;

        self.collection(collection)
            .insert_one(document.clone())
            .await
            .map_err(|e| write_error("Failed to insert document", e))?;

        Ok(document_to_json(document))
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> StorageResult<Vec<Value>> {
        let mut find = self
            .collection(collection)
            .find(filter_to_document(&query.filter)?)
            .sort(sort_to_document(&query.sort))
            .skip(query.skip);

        if let Some(limit) = query.limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(projection) = &query.projection {
            find = find.projection(projection_to_document(projection));
        }

        let docs: Vec<Document> = find
            .await
            .map_err(|e| query_error("Failed to find documents", e))?
            .try_collect()
            .await
            .map_err(|e| query_error("Failed to collect documents", e))?;

        Ok(docs.into_iter().map(document_to_json).collect())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Value>> {
        let doc = self
            .collection(collection)
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| query_error("Failed to get document", e))?;

        Ok(doc.map(document_to_json))
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Map<String, Value>,
    ) -> StorageResult<Option<Value>> {
        let filter = filter_to_document(filter)?;

        // `$set` rejects an empty document
        if patch.is_empty() {
            let doc = self
                .collection(collection)
                .find_one(filter)
                .await
                .map_err(|e| query_error("Failed to get document", e))?;
            return Ok(doc.map(document_to_json));
        }

        let set = json_to_document(Value::Object(patch))?;
        let doc = self
            .collection(collection)
            .find_one_and_update(filter, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| write_error("Failed to update document", e))?;

        Ok(doc.map(document_to_json))
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> StorageResult<Option<Value>> {
        let doc = self
            .collection(collection)
            .find_one_and_delete(filter_to_document(filter)?)
            .await
            .map_err(|e| query_error("Failed to delete document", e))?;

        Ok(doc.map(document_to_json))
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> StorageResult<Vec<Value>> {
        let stages = pipeline_to_documents(pipeline)?;

        let docs: Vec<Document> = self
            .collection(collection)
            .aggregate(stages)
            .await
            .map_err(|e| query_error("Failed to run aggregation", e))?
            .try_collect()
            .await
            .map_err(|e| query_error("Failed to collect aggregation results", e))?;

        Ok(docs.into_iter().map(document_to_json).collect())
    }

    /// Create the declared indexes.
    ///
    /// Unique indexes become compound ascending indexes with `unique: true`;
    /// geo indexes are `2dsphere`.
    async fn ensure_indexes(&self, collection: &str, indexes: &[Index]) -> StorageResult<()> {
        if indexes.is_empty() {
            return Ok(());
        }

        let models: Vec<IndexModel> = indexes
            .iter()
            .map(|index| match index {
                Index::Unique(fields) => {
                    let keys: Document = fields
                        .iter()
                        .map(|f| (mongo_field(f).to_string(), Bson::Int32(1)))
                        .collect();
                    IndexModel::builder()
                        .keys(keys)
                        .options(IndexOptions::builder().unique(true).build())
                        .build()
                }
                Index::Geo(field) => {
                    let key = mongo_field(field);
                    IndexModel::builder().keys(doc! { key: "2dsphere" }).build()
                }
            })
            .collect();

        self.collection(collection)
            .create_indexes(models)
            .await
            .map_err(|e| query_error("Failed to create indexes", e))?;

        tracing::debug!(collection, count = indexes.len(), "indexes ensured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::{Comparison, GeoPoint};
    use serde_json::json;

    #[test]
    fn test_id_is_mapped_both_ways() {
        let doc = json_to_document(json!({"id": "abc", "name": "x"})).unwrap();
        assert_eq!(doc.get_str("_id").unwrap(), "abc");
        assert!(doc.get("id").is_none());

        let back = document_to_json(doc);
        assert_eq!(back["id"], json!("abc"));
    }

    #[test]
    fn test_equality_literal_matches_native_types() {
        let doc = filter_to_document(&Filter::eq("duration", "5")).unwrap();
        let variants = doc.get_document("duration").unwrap().get_array("$in").unwrap();
        assert!(variants.contains(&Bson::String("5".into())));
        assert!(variants.contains(&Bson::Int64(5)));
    }

    #[test]
    fn test_plain_string_stays_scalar() {
        let doc = filter_to_document(&Filter::eq("difficulty", "easy")).unwrap();
        assert_eq!(doc, doc! { "difficulty": "easy" });
    }

    #[test]
    fn test_comparison_is_numeric() {
        let filter = Filter::new()
            .and("price", Condition::Compare(Comparison::Gte, json!("100")))
            .and("price", Condition::Compare(Comparison::Lt, json!("500")));
        let doc = filter_to_document(&filter).unwrap();
        assert_eq!(
            doc,
            doc! { "$and": [ { "price": { "$gte": 100.0 } }, { "price": { "$lt": 500.0 } } ] }
        );
    }

    #[test]
    fn test_sort_and_projection_map_id() {
        assert_eq!(
            sort_to_document(&SortSpec::newest_first()),
            doc! { "createdAt": -1, "_id": 1 }
        );
        assert_eq!(
            projection_to_document(&Projection::exclude(["id"])),
            doc! { "_id": 0 }
        );
    }

    #[test]
    fn test_pipeline_rendering() {
        let pipeline = Pipeline::new()
            .geo_near(GeoPoint::new(-118.1, 34.1), "distance", 0.001, "startLocation")
            .group(Expr::month(Expr::field("startDates")), vec![("n".into(), Accumulator::count())]);
        let stages = pipeline_to_documents(&pipeline).unwrap();
        assert!(stages[0].contains_key("$geoNear"));
        let group = stages[1].get_document("$group").unwrap();
        assert_eq!(
            group.get_document("_id").unwrap(),
            &doc! { "$month": { "$toDate": "$startDates" } }
        );
        assert_eq!(GROUP_KEY, ID_FIELD);
    }
}
