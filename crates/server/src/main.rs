use std::{future::Future, sync::Arc, time::Duration};

use db::{DbErr, DbService};
use server::{AppState, http};
use services::services::{
    backend::create_backend,
    config::{Config, ConfigError},
    gallery::GalleryService,
    image_store::ImageStore,
};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, prelude::*};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum PromptGalleryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn spawn_background<F>(task: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(task)
}

#[tokio::main]
async fn main() -> Result<(), PromptGalleryError> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,server={level},services={level},db={level},utils={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string).expect("Failed to create tracing filter");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let config = Config::from_env()?;

    let store = ImageStore::new(config.images_dir.clone());
    store.init().await?;

    let db = DbService::new(&config.database_url).await?;

    let backend = create_backend(config.backend, &config)?;
    let fallback = config
        .fallback_backend
        .map(|kind| create_backend(kind, &config))
        .transpose()?;
    tracing::info!(
        backend = backend.name(),
        fallback = fallback.as_ref().map(|b| b.name()),
        "Image backends ready"
    );

    let gallery = Arc::new(GalleryService::new(backend, fallback, store));

    if let Some(days) = config.cleanup_after_days {
        let cleanup_db = db.clone();
        let cleanup_gallery = gallery.clone();
        spawn_background(async move {
            tracing::info!(threshold_days = days, "Starting image retention job");
            loop {
                match cleanup_gallery.cleanup(&cleanup_db.conn, days).await {
                    Ok(removed) if removed > 0 => {
                        tracing::info!(removed, "Expired images removed")
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "Cleanup pass failed"),
                }
                tokio::time::sleep(CLEANUP_INTERVAL).await;
            }
        });
    }

    let state = AppState::new(db, gallery, Arc::new(config.clone()));
    let app_router = http::router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;
    let actual_port = listener.local_addr()?.port();
    tracing::info!("Server running on http://{}:{actual_port}", config.host);

    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {e}");
        return;
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
