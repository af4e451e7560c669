//! Generic resource handlers
//!
//! [`ResourceHandlers`] turns any [`ResourceDescriptor`] into the standard
//! create / get-one / get-all / update / delete operations plus an ownership
//! gate. Route modules call these from thin axum handlers.
//!
//! # Example
//!
//! ```rust,ignore
//! let tours = ResourceHandlers::new(ModelResource::<Tour>::new(store, "tours"));
//!
//! // GET /api/v1/tours?difficulty=easy&sort=-price&page=2
//! let response = tours.get_all(&spec, None).await?;
//! ```

use crate::core::auth::Principal;
use crate::core::error::{ApiError, ApiResult};
use crate::core::features::QueryFeatures;
use crate::core::filter::{Filter, Populate};
use crate::core::query::QuerySpec;
use crate::core::resource::{ResourceDescriptor, id_of};
use crate::handlers::response::ApiResponse;
use serde_json::Value;
use std::sync::Arc;

/// Restricts a list to the records of one parent, e.g. the reviews of
/// `/tours/{tourId}/reviews`
#[derive(Debug, Clone, Copy)]
pub struct ParentScope<'a> {
    /// Field on the listed records holding the parent id
    pub field: &'a str,
    /// Parent id taken from the path
    pub value: &'a str,
}

/// Standard operations over one resource
pub struct ResourceHandlers<R> {
    resource: Arc<R>,
}

impl<R> Clone for ResourceHandlers<R> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

impl<R: ResourceDescriptor> ResourceHandlers<R> {
    pub fn new(resource: R) -> Self {
        Self {
            resource: Arc::new(resource),
        }
    }

    /// The underlying resource, for operations outside the standard set
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Validate and store `body`; `201`
    pub async fn create_one(&self, body: Value) -> ApiResult<ApiResponse> {
        let record = self.resource.create(body).await?;
        Ok(ApiResponse::created(record))
    }

    /// Record by id, with `populate` expanded
    pub async fn get_one(&self, id: &str, populate: &[Populate]) -> ApiResult<ApiResponse> {
        let record = self
            .resource
            .find_by_id(id, populate)
            .await?
            .ok_or(ApiError::NotFound)?;
        Ok(ApiResponse::ok(record))
    }

    /// Filtered, sorted, projected and paginated list keyed by the collection name
    pub async fn get_all(
        &self,
        spec: &QuerySpec,
        parent: Option<ParentScope<'_>>,
    ) -> ApiResult<ApiResponse> {
        let base = parent
            .map(|p| Filter::eq(p.field, p.value))
            .unwrap_or_default();

        let query = QueryFeatures::new(self.resource.find(base), spec)
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .into_query();

        let records = self.resource.execute(query).await?;
        tracing::debug!(
            collection = self.resource.collection(),
            results = records.len(),
            "listed records"
        );
        Ok(ApiResponse::list(self.resource.collection(), records))
    }

    /// Apply a validated partial update; the updated record is returned
    pub async fn update_one(&self, id: &str, body: Value) -> ApiResult<ApiResponse> {
        let record = self
            .resource
            .find_by_id_and_update(id, body)
            .await?
            .ok_or(ApiError::NotFound)?;
        Ok(ApiResponse::ok(record))
    }

    /// Remove a record; `204`
    pub async fn delete_one(&self, id: &str) -> ApiResult<ApiResponse> {
        self.resource
            .find_by_id_and_delete(id)
            .await?
            .ok_or(ApiError::NotFound)?;
        Ok(ApiResponse::NoContent)
    }

    /// Succeeds only when `principal` owns the record through `owner_field`.
    ///
    /// The owner field may hold the owner's id or the populated owner record.
    pub async fn is_owner(
        &self,
        id: &str,
        principal: &Principal,
        owner_field: &str,
    ) -> ApiResult<()> {
        let record = self
            .resource
            .find_by_id(id, &[])
            .await?
            .ok_or(ApiError::NotFound)?;

        let owner = record
            .get(owner_field)
            .and_then(|value| value.as_str().or_else(|| id_of(value)));

        if owner == Some(principal.id.as_str()) {
            Ok(())
        } else {
            tracing::debug!(id, user = %principal.id, "ownership check failed");
            Err(ApiError::Forbidden {
                message: "You can only modify your own documents".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::Role;
    use crate::core::model::Model;
    use crate::core::resource::ModelResource;
    use crate::storage::InMemoryStore;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use validator::Validate;

    #[derive(Debug, Serialize, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    struct Item {
        #[validate(required(message = "An item must have a name"))]
        name: Option<String>,
        price: Option<f64>,
        difficulty: Option<String>,
        owner: Option<String>,
        created_at: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize, Validate)]
    struct ItemPatch {
        name: Option<String>,
        price: Option<f64>,
    }

    impl Model for Item {
        type Patch = ItemPatch;
    }

    fn handlers() -> ResourceHandlers<ModelResource<Item>> {
        ResourceHandlers::new(ModelResource::new(Arc::new(InMemoryStore::new()), "items"))
    }

    fn data(response: &ApiResponse) -> Value {
        response.body().unwrap()["data"]["data"].clone()
    }

    fn listed(response: &ApiResponse) -> Vec<Value> {
        response.body().unwrap()["data"]["items"]
            .as_array()
            .cloned()
            .unwrap_or_default()
    }

    async fn seed(handlers: &ResourceHandlers<ModelResource<Item>>, count: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for i in 0..count {
            let created = handlers
                .create_one(json!({
                    "name": format!("item-{:02}", i),
                    "price": (i * 10) as f64,
                    "difficulty": if i % 2 == 0 { "easy" } else { "medium" },
                    "owner": "owner-1",
                    "createdAt": format!("2024-01-01T00:00:{:02}.000Z", i),
                }))
                .await
                .unwrap();
            ids.push(data(&created)["id"].as_str().unwrap().to_string());
        }
        ids
    }

    #[tokio::test]
    async fn test_create_returns_201_with_metadata() {
        let handlers = handlers();
        let response = handlers.create_one(json!({"name": "solo"})).await.unwrap();
        assert_eq!(response.status_code(), axum::http::StatusCode::CREATED);
        let record = data(&response);
        assert_eq!(record["name"], "solo");
        assert_eq!(record["__v"], 0);
        assert!(record["id"].is_string());
    }

    #[tokio::test]
    async fn test_create_validation_failure() {
        let err = handlers().create_one(json!({"price": 1})).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(err.to_string(), "Invalid input data. An item must have a name");
    }

    #[tokio::test]
    async fn test_get_one_and_not_found() {
        let handlers = handlers();
        let ids = seed(&handlers, 3).await;

        let response = handlers.get_one(&ids[1], &[]).await.unwrap();
        assert_eq!(data(&response)["name"], "item-01");

        let missing = uuid::Uuid::new_v4().to_string();
        let err = handlers.get_one(&missing, &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn test_get_all_default_order_is_newest_first() {
        let handlers = handlers();
        seed(&handlers, 3).await;
        let response = handlers.get_all(&QuerySpec::new(), None).await.unwrap();
        let names: Vec<_> = listed(&response).iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("item-02"), json!("item-01"), json!("item-00")]);
        assert!(listed(&response).iter().all(|r| r.get("__v").is_none()));
    }

    #[tokio::test]
    async fn test_get_all_sort_and_projection() {
        let handlers = handlers();
        seed(&handlers, 4).await;
        let spec = QuerySpec::new()
            .with("sort", "-price")
            .with("fields", "name,price");
        let records = listed(&handlers.get_all(&spec, None).await.unwrap());

        let prices: Vec<f64> = records.iter().map(|r| r["price"].as_f64().unwrap()).collect();
        assert_eq!(prices, vec![30.0, 20.0, 10.0, 0.0]);
        let keys: Vec<_> = records[0].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 3);
        assert!(records[0].get("id").is_some());
        assert!(records[0].get("difficulty").is_none());
    }

    #[tokio::test]
    async fn test_get_all_pagination() {
        let handlers = handlers();
        seed(&handlers, 25).await;

        let spec = QuerySpec::new()
            .with("sort", "price")
            .with("page", "2")
            .with("limit", "10");
        let records = listed(&handlers.get_all(&spec, None).await.unwrap());
        assert_eq!(records.len(), 10);
        assert_eq!(records[0]["name"], "item-10");
        assert_eq!(records[9]["name"], "item-19");

        let spec = QuerySpec::new().with("page", "100").with("limit", "10");
        let response = handlers.get_all(&spec, None).await.unwrap();
        assert_eq!(response.body().unwrap()["results"], 0);
    }

    #[tokio::test]
    async fn test_get_all_filters() {
        let handlers = handlers();
        seed(&handlers, 6).await;

        let spec = QuerySpec::new().with("price[gte]", "30");
        let records = listed(&handlers.get_all(&spec, None).await.unwrap());
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r["price"].as_f64().unwrap() >= 30.0));

        let spec = QuerySpec::new().with("difficulty", "easy");
        let records = listed(&handlers.get_all(&spec, None).await.unwrap());
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r["difficulty"] == "easy"));
    }

    #[tokio::test]
    async fn test_get_all_repeated_key_matches_any_value() {
        let handlers = handlers();
        seed(&handlers, 6).await;
        handlers
            .create_one(json!({"name": "steep", "difficulty": "difficult"}))
            .await
            .unwrap();

        let spec = QuerySpec::from_pairs(
            [("difficulty", "easy"), ("difficulty", "medium")],
            &["difficulty".to_string()],
        );
        let records = listed(&handlers.get_all(&spec, None).await.unwrap());
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r["difficulty"] != "difficult"));
    }

    #[tokio::test]
    async fn test_get_all_huge_pagination_is_empty_or_whole() {
        let handlers = handlers();
        seed(&handlers, 3).await;

        let spec = QuerySpec::new().with("limit", "18446744073709551615");
        let records = listed(&handlers.get_all(&spec, None).await.unwrap());
        assert_eq!(records.len(), 3);

        let spec = QuerySpec::new().with("page", "18446744073709551615");
        let records = listed(&handlers.get_all(&spec, None).await.unwrap());
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_get_all_parent_scope() {
        let handlers = handlers();
        seed(&handlers, 2).await;
        handlers
            .create_one(json!({"name": "other", "owner": "owner-2"}))
            .await
            .unwrap();

        let scope = ParentScope {
            field: "owner",
            value: "owner-2",
        };
        let records = listed(&handlers.get_all(&QuerySpec::new(), Some(scope)).await.unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "other");
    }

    #[tokio::test]
    async fn test_update_one() {
        let handlers = handlers();
        let ids = seed(&handlers, 1).await;

        let response = handlers
            .update_one(&ids[0], json!({"price": 99, "owner": "intruder"}))
            .await
            .unwrap();
        let record = data(&response);
        assert_eq!(record["price"].as_f64(), Some(99.0));
        assert_eq!(record["owner"], "owner-1");

        let missing = uuid::Uuid::new_v4().to_string();
        let err = handlers.update_one(&missing, json!({"price": 1})).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let handlers = handlers();
        let ids = seed(&handlers, 1).await;

        let response = handlers.delete_one(&ids[0]).await.unwrap();
        assert_eq!(response, ApiResponse::NoContent);

        let err = handlers.delete_one(&ids[0]).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn test_invalid_id() {
        let err = handlers().get_one("not-a-uuid", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidId { .. }));
    }

    #[tokio::test]
    async fn test_is_owner_gates_the_next_step() {
        let handlers = handlers();
        let ids = seed(&handlers, 1).await;
        let owner = Principal {
            id: "owner-1".into(),
            role: Role::User,
        };
        let stranger = Principal {
            id: "owner-2".into(),
            role: Role::Admin,
        };

        let mut ran = 0;
        if handlers.is_owner(&ids[0], &owner, "owner").await.is_ok() {
            ran += 1;
        }
        let denied = handlers.is_owner(&ids[0], &stranger, "owner").await;
        if denied.is_ok() {
            ran += 1;
        }

        assert_eq!(ran, 1);
        let err = denied.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden { .. }));
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }
}
