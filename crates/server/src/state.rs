use std::sync::Arc;

use db::DbService;
use services::services::{config::Config, gallery::GalleryService};

/// Shared handler state: the database handle, the gallery orchestration
/// service and the immutable startup configuration.
#[derive(Clone)]
pub struct AppState {
    db: DbService,
    gallery: Arc<GalleryService>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(db: DbService, gallery: Arc<GalleryService>, config: Arc<Config>) -> Self {
        Self {
            db,
            gallery,
            config,
        }
    }

    pub fn db(&self) -> &DbService {
        &self.db
    }

    pub fn gallery(&self) -> &GalleryService {
        &self.gallery
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
