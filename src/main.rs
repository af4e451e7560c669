use anyhow::Result;
use natours::config::{AppConfig, Backend};
use natours::core::error::set_error_mode;
use natours::core::service::DocumentStore;
use natours::server::ServerBuilder;
use natours::storage::InMemoryStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("natours=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::load()?;
    set_error_mode(config.env.error_mode());

    let store = connect(&config).await?;
    ServerBuilder::new()
        .with_config(config)
        .with_store(store)
        .serve()
        .await
}

async fn connect(config: &AppConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.storage.backend {
        Backend::InMemory => {
            tracing::warn!("using the in-memory store, data is lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
        #[cfg(feature = "mongodb_backend")]
        Backend::Mongodb => {
            let uri = config.storage.connection_uri()?;
            let store =
                natours::storage::MongoStore::connect(&uri, &config.storage.database).await?;
            tracing::info!(database = %config.storage.database, "DB connection successful!");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongodb_backend"))]
        Backend::Mongodb => {
            anyhow::bail!("the mongodb backend requires the `mongodb_backend` feature")
        }
    }
}
