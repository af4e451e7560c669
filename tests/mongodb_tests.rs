//! Integration tests for the MongoDB store.
//!
//! # Requirements
//!
//! - Docker must be running (testcontainers launches a MongoDB container)
//! - Feature flag `mongodb_backend` must be enabled
//!
//! # Running
//!
//! ```sh
//! cargo test --features mongodb_backend --test mongodb_tests -- --test-threads=1
//! ```
//!
//! All tests share a single MongoDB container (via `OnceLock`); each test
//! gets its own database.

#![cfg(feature = "mongodb_backend")]

use natours::core::error::ApiError;
use natours::core::query::QuerySpec;
use natours::core::resource::ResourceDescriptor;
use natours::entities::Tour;
use natours::handlers::{ApiResponse, ResourceHandlers};
use natours::prelude::*;
use natours::server::routes::tours::stats_pipeline;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mongo::Mongo;

// ---------------------------------------------------------------------------
// Shared test environment
// ---------------------------------------------------------------------------

struct MongoTestEnv {
    /// Container handle; dropping this stops the MongoDB container.
    _container: testcontainers::ContainerAsync<Mongo>,
    connection_url: String,
}

static TEST_ENV: OnceLock<MongoTestEnv> = OnceLock::new();

async fn init_mongo_env() -> &'static MongoTestEnv {
    if let Some(env) = TEST_ENV.get() {
        return env;
    }

    let container = Mongo::default()
        .start()
        .await
        .expect("Failed to start MongoDB container; is Docker running?");

    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(27017).await.unwrap();
    let url = format!("mongodb://{}:{}", host, port);

    let _ = TEST_ENV.set(MongoTestEnv {
        _container: container,
        connection_url: url,
    });
    TEST_ENV.get().unwrap()
}

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Tour resource over a fresh database
async fn tours() -> ResourceHandlers<ModelResource<Tour>> {
    let env = init_mongo_env().await;
    let n = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let store = MongoStore::connect(&env.connection_url, &format!("natours_test_{}", n))
        .await
        .expect("connect");

    let resource = ModelResource::<Tour>::new(Arc::new(store), "tours");
    resource.ensure_indexes().await.expect("indexes");
    ResourceHandlers::new(resource)
}

fn tour(name: &str, price: u32, difficulty: &str) -> Value {
    json!({
        "name": name,
        "duration": 5,
        "maxGroupSize": 10,
        "difficulty": difficulty,
        "price": price,
        "summary": "A tour stored in MongoDB",
        "imageCover": "tour-cover.jpg",
        "startLocation": {"type": "Point", "coordinates": [-80.18, 25.77]}
    })
}

fn records(response: ApiResponse) -> Vec<Value> {
    match response {
        ApiResponse::List { records, .. } => records,
        other => panic!("expected a list, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_and_get_one() {
    let tours = tours().await;
    let created = tours
        .resource()
        .create(tour("The Forest Hiker", 397, "easy"))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let found = tours.resource().find_by_id(id, &[]).await.unwrap().unwrap();
    assert_eq!(found["name"], "The Forest Hiker");
    assert_eq!(found["slug"], "the-forest-hiker");
    assert!(found.get("_id").is_none());
}

#[tokio::test]
async fn test_unique_name_is_enforced() {
    let tours = tours().await;
    tours
        .resource()
        .create(tour("The Sea Explorer", 497, "medium"))
        .await
        .unwrap();

    let err = tours
        .resource()
        .create(tour("The Sea Explorer", 597, "medium"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Duplicate { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_get_all_filters_sorts_and_paginates() {
    let tours = tours().await;
    for (i, price) in [300, 100, 500, 200, 400].into_iter().enumerate() {
        tours
            .resource()
            .create(tour(&format!("Mongo Test Tour {}", i), price, "easy"))
            .await
            .unwrap();
    }

    let spec = QuerySpec::from_pairs(
        [("price[gte]", "200"), ("sort", "-price"), ("limit", "2"), ("page", "1")],
        &[],
    );
    let found = records(tours.get_all(&spec, None).await.unwrap());
    let prices: Vec<f64> = found.iter().map(|t| t["price"].as_f64().unwrap()).collect();
    assert_eq!(prices, vec![500.0, 400.0]);
}

#[tokio::test]
async fn test_secret_tours_are_hidden() {
    let tours = tours().await;
    let mut secret = tour("The Secret Hideaway", 997, "difficult");
    secret["secretTour"] = json!(true);
    let created = tours.resource().create(secret).await.unwrap();
    let id = created["id"].as_str().unwrap();

    assert!(tours.resource().find_by_id(id, &[]).await.unwrap().is_none());
    let found = records(tours.get_all(&QuerySpec::new(), None).await.unwrap());
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_update_and_delete() {
    let tours = tours().await;
    let created = tours
        .resource()
        .create(tour("The Forest Hiker", 397, "easy"))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let updated = tours
        .resource()
        .find_by_id_and_update(id, json!({"price": 450}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated["price"].as_f64(), Some(450.0));

    let response = tours.delete_one(id).await.unwrap();
    assert_eq!(response, ApiResponse::NoContent);
    assert!(matches!(
        tours.delete_one(id).await.unwrap_err(),
        ApiError::NotFound
    ));
}

#[tokio::test]
async fn test_tour_stats_pipeline() {
    let tours = tours().await;
    tours.resource().create(tour("The Forest Hiker", 400, "easy")).await.unwrap();
    tours.resource().create(tour("The Sea Explorer", 600, "easy")).await.unwrap();
    tours
        .resource()
        .create(tour("The Snow Adventurer", 1000, "difficult"))
        .await
        .unwrap();

    let stats = tours.resource().aggregate(stats_pipeline()).await.unwrap();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0]["id"], "EASY");
    assert_eq!(stats[0]["avgPrice"].as_f64(), Some(500.0));
    assert_eq!(stats[1]["id"], "DIFFICULT");
}
