//! ServerBuilder for fluent API to build the natours HTTP server

use super::payments::PaymentGateway;
use super::routes::{bookings, reviews, tours, users};
use super::state::{AppState, CookieSettings};
use super::uploads::{DiskImageStore, ImageStore};
use crate::config::{AppConfig, Environment};
use crate::core::auth::TokenService;
use crate::core::error::ApiError;
use crate::core::service::DocumentStore;
use anyhow::Result;
use axum::http::Uri;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builder for the API router
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(AppConfig::load()?)
///     .with_store(Arc::new(InMemoryStore::new()))
///     .build()
///     .await?;
/// ```
pub struct ServerBuilder {
    config: AppConfig,
    store: Option<Arc<dyn DocumentStore>>,
    image_store: Option<Arc<dyn ImageStore>>,
    payments: Option<Arc<dyn PaymentGateway>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            store: None,
            image_store: None,
            payments: None,
            custom_routes: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the document store (required)
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the on-disk image store
    pub fn with_image_store(mut self, images: Arc<dyn ImageStore>) -> Self {
        self.image_store = Some(images);
        self
    }

    /// Enable checkout sessions
    pub fn with_payment_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(gateway);
        self
    }

    /// Add routes outside `/api/v1`, such as views or webhooks
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Assemble the shared state without touching the store
    pub fn build_state(&mut self) -> Result<AppState> {
        let store = self
            .store
            .take()
            .ok_or_else(|| anyhow::anyhow!("DocumentStore is required. Call .with_store()"))?;

        let config = &self.config;
        let tokens = TokenService::new(&config.auth.jwt_secret, config.auth.jwt_expires_in_days);

        let mut state = AppState::new(store, tokens)
            .with_query_whitelist(config.query_whitelist.clone());
        state.cookies = CookieSettings {
            max_age_days: config.auth.cookie_expires_in_days,
            secure: config.env == Environment::Production,
        };
        state.images = match self.image_store.take() {
            Some(images) => images,
            None => Arc::new(DiskImageStore::new(config.uploads.tour_image_dir.clone())),
        };
        state.payments = self.payments.take();
        state.public_url = config.payments.public_url.clone();
        state.image_base_url = config.payments.image_base_url.clone();
        Ok(state)
    }

    /// Build the router; declares the store's indexes first
    pub async fn build(mut self) -> Result<Router> {
        let state = self.build_state()?;
        state.ensure_indexes().await?;

        let mut app = router(state);
        for custom in std::mem::take(&mut self.custom_routes) {
            app = app.merge(custom);
        }
        Ok(app)
    }

    /// Serve the application with graceful shutdown
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.bind_address();
        let env = self.config.env;
        let app = self.build().await?;
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!(env = ?env, "Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The `/api/v1` API over `state`, with the 404 fallback and HTTP layers
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/tours", tours::routes(&state))
        .nest("/users", users::routes(&state))
        .nest("/reviews", reviews::routes(&state))
        .nest("/bookings", bookings::routes(&state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .fallback(route_not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "natours"
    }))
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::RouteNotFound {
        url: uri.to_string(),
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "builder-test-secret".to_string();
        config
    }

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = ServerBuilder::new();
        assert!(builder.store.is_none());
        assert!(builder.payments.is_none());
        assert!(builder.custom_routes.is_empty());
    }

    #[test]
    fn test_build_state_without_store_fails() {
        let err = ServerBuilder::new().build_state().err().expect("should be Err");
        assert!(err.to_string().contains("DocumentStore is required"));
    }

    #[test]
    fn test_build_state_applies_config() {
        let mut config = config();
        config.env = Environment::Production;
        config.auth.cookie_expires_in_days = 7;
        config.payments.public_url = Some("https://natours.example".to_string());

        let state = ServerBuilder::new()
            .with_config(config)
            .with_store(Arc::new(InMemoryStore::new()))
            .build_state()
            .expect("state should build");

        assert!(state.cookies.secure);
        assert_eq!(state.cookies.max_age_days, 7);
        assert_eq!(state.public_url.as_deref(), Some("https://natours.example"));
        assert!(state.payments.is_none());
    }

    #[test]
    fn test_with_custom_routes_appends_router() {
        let builder = ServerBuilder::new()
            .with_custom_routes(Router::new())
            .with_custom_routes(Router::new());
        assert_eq!(builder.custom_routes.len(), 2);
    }

    #[tokio::test]
    async fn test_build_produces_router() {
        let router = ServerBuilder::new()
            .with_config(config())
            .with_store(Arc::new(InMemoryStore::new()))
            .with_custom_routes(Router::new().route("/custom", get(|| async { "ok" })))
            .build()
            .await
            .expect("build should produce a Router");
        let _ = router;
    }
}
