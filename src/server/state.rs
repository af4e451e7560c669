//! Shared application state

use crate::core::auth::TokenService;
use crate::core::extractors::QueryParams;
use crate::core::query::QuerySpec;
use crate::core::resource::ModelResource;
use crate::core::service::{DocumentStore, StorageResult};
use crate::entities::{Booking, Review, Tour, User, booking, review, tour, user};
use crate::handlers::ResourceHandlers;
use crate::server::payments::PaymentGateway;
use crate::server::uploads::{DiskImageStore, ImageStore};
use std::sync::Arc;

pub type Tours = ResourceHandlers<ModelResource<Tour>>;
pub type Users = ResourceHandlers<ModelResource<User>>;
pub type Reviews = ResourceHandlers<ModelResource<Review>>;
pub type Bookings = ResourceHandlers<ModelResource<Booking>>;

/// Session cookie settings
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub max_age_days: i64,
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            max_age_days: 90,
            secure: false,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub tours: Tours,
    pub users: Users,
    pub reviews: Reviews,
    pub bookings: Bookings,
    pub tokens: TokenService,
    pub cookies: CookieSettings,
    pub images: Arc<dyn ImageStore>,
    /// Absent when no payment provider is configured
    pub payments: Option<Arc<dyn PaymentGateway>>,
    /// Base URL for checkout redirects; the request host is used when absent
    pub public_url: Option<String>,
    /// Base URL tour images are served from, for checkout line items
    pub image_base_url: Option<String>,
    query_whitelist: Arc<[String]>,
}

impl AppState {
    /// State over `store` with default collaborators
    pub fn new(store: Arc<dyn DocumentStore>, tokens: TokenService) -> Self {
        Self {
            tours: ResourceHandlers::new(ModelResource::new(store.clone(), tour::COLLECTION)),
            users: ResourceHandlers::new(ModelResource::new(store.clone(), user::COLLECTION)),
            reviews: ResourceHandlers::new(ModelResource::new(store.clone(), review::COLLECTION)),
            bookings: ResourceHandlers::new(ModelResource::new(store, booking::COLLECTION)),
            tokens,
            cookies: CookieSettings::default(),
            images: Arc::new(DiskImageStore::new("public/img/tours")),
            payments: None,
            public_url: None,
            image_base_url: None,
            query_whitelist: Arc::from(Vec::new()),
        }
    }

    pub fn with_query_whitelist(mut self, keys: Vec<String>) -> Self {
        self.query_whitelist = Arc::from(keys);
        self
    }

    /// Build the [`QuerySpec`] of a request
    pub fn query_spec(&self, params: QueryParams) -> QuerySpec {
        params.into_spec(&self.query_whitelist)
    }

    /// Declare every resource's indexes
    pub async fn ensure_indexes(&self) -> StorageResult<()> {
        self.tours.resource().ensure_indexes().await?;
        self.users.resource().ensure_indexes().await?;
        self.reviews.resource().ensure_indexes().await?;
        self.bookings.resource().ensure_indexes().await?;
        Ok(())
    }
}
