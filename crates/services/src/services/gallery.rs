use std::sync::Arc;

use chrono::{Duration, Utc};
use db::{
    DbConn, DbErr,
    models::image::{CreateImage, Image},
};
use thiserror::Error;
use uuid::Uuid;

use super::{
    backend::{BackendError, ImageBackend},
    image_store::ImageStore,
};

#[derive(Debug, Error)]
pub enum GalleryServiceError {
    #[error("image generation failed: {0}")]
    Generation(#[source] BackendError),
    #[error("failed to persist generated image: {0}")]
    Persistence(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("prompt must not be empty")]
    EmptyPrompt,
}

pub type Result<T> = std::result::Result<T, GalleryServiceError>;

/// A freshly generated image: the persisted record plus the raw bytes for
/// immediate display.
#[derive(Debug)]
pub struct GeneratedImage {
    pub record: Image,
    pub bytes: Vec<u8>,
}

/// Orchestrates backend generation, file persistence and record bookkeeping.
/// The record row is authoritative for whether an image exists; file
/// operations around deletion are best-effort.
#[derive(Clone)]
pub struct GalleryService {
    backend: Arc<dyn ImageBackend>,
    fallback: Option<Arc<dyn ImageBackend>>,
    store: ImageStore,
}

impl GalleryService {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        fallback: Option<Arc<dyn ImageBackend>>,
        store: ImageStore,
    ) -> Self {
        Self {
            backend,
            fallback,
            store,
        }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Generate an image and persist it: backend call (with at most one
    /// fallback attempt), file write, then record insert. If the insert
    /// fails the just-written file is removed so no unreferenced file is
    /// left behind by this path.
    pub async fn generate(
        &self,
        conn: &DbConn,
        prompt: &str,
        width: u32,
        height: u32,
    ) -> Result<GeneratedImage> {
        if prompt.trim().is_empty() {
            return Err(GalleryServiceError::EmptyPrompt);
        }

        let bytes = match self.backend.generate(prompt, width, height).await {
            Ok(bytes) => bytes,
            Err(primary_err) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        backend = self.backend.name(),
                        error = %primary_err,
                        "Primary image backend failed, trying fallback"
                    );
                    fallback
                        .generate(prompt, width, height)
                        .await
                        .map_err(GalleryServiceError::Generation)?
                }
                None => return Err(GalleryServiceError::Generation(primary_err)),
            },
        };

        let filename = self.store.save(&bytes).await?;

        let data = CreateImage {
            prompt: prompt.to_string(),
            filename: filename.clone(),
            size_bytes: bytes.len() as i64,
            width: width as i32,
            height: height as i32,
        };
        let record = match Image::create(conn, &data).await {
            Ok(record) => record,
            Err(err) => {
                if let Err(cleanup_err) = self.store.delete(&filename).await {
                    tracing::warn!(
                        filename,
                        error = %cleanup_err,
                        "Failed to remove orphaned image file"
                    );
                }
                return Err(GalleryServiceError::Database(err));
            }
        };

        tracing::info!(
            image_id = %record.id,
            filename = %record.filename,
            size_bytes = record.size_bytes,
            "Generated image stored"
        );
        Ok(GeneratedImage { record, bytes })
    }

    pub async fn list(&self, conn: &DbConn, skip: u64, limit: u64) -> Result<Vec<Image>> {
        Ok(Image::list(conn, skip, limit).await?)
    }

    pub async fn get(&self, conn: &DbConn, id: Uuid) -> Result<Option<Image>> {
        Ok(Image::find_by_id(conn, id).await?)
    }

    /// Delete one record and its file. The filename is fetched while the row
    /// still exists; the row deletion is the authoritative step and a failed
    /// file removal is only logged.
    pub async fn delete(&self, conn: &DbConn, id: Uuid) -> Result<bool> {
        let Some(record) = Image::find_by_id(conn, id).await? else {
            return Ok(false);
        };

        let removed = Image::delete_by_id(conn, id).await?;
        if removed {
            match self.store.delete(&record.filename).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(filename = %record.filename, "Image file was already gone")
                }
                Err(err) => {
                    tracing::warn!(
                        filename = %record.filename,
                        error = %err,
                        "Failed to delete image file"
                    );
                }
            }
            tracing::info!(image_id = %id, "Image deleted");
        }
        Ok(removed)
    }

    /// Expire everything older than `threshold_days`. Rows go first in one
    /// statement, then each backing file best-effort; a file failure never
    /// aborts the sweep. Returns how many records were removed.
    pub async fn cleanup(&self, conn: &DbConn, threshold_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(threshold_days);
        let removed = Image::delete_older_than(conn, cutoff).await?;

        for record in &removed {
            if let Err(err) = self.store.delete(&record.filename).await {
                tracing::warn!(
                    filename = %record.filename,
                    error = %err,
                    "Failed to delete expired image file"
                );
            }
        }

        if !removed.is_empty() {
            tracing::info!(count = removed.len(), threshold_days, "Expired images cleaned up");
        }
        Ok(removed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use db::{ConnectionTrait, DbService};

    use super::*;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfakeimagedata";

    struct FixedBackend;

    #[async_trait]
    impl ImageBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _width: u32,
            _height: u32,
        ) -> std::result::Result<Vec<u8>, BackendError> {
            Ok(PNG_BYTES.to_vec())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl ImageBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _width: u32,
            _height: u32,
        ) -> std::result::Result<Vec<u8>, BackendError> {
            Err(BackendError::Api {
                status: 503,
                message: "model unavailable".to_string(),
            })
        }
    }

    async fn setup() -> (tempfile::TempDir, DbService, ImageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("images"));
        store.init().await.unwrap();
        let db = DbService::new("sqlite::memory:").await.unwrap();
        (dir, db, store)
    }

    #[tokio::test]
    async fn generate_creates_exactly_one_file_and_record() {
        let (_dir, db, store) = setup().await;
        let service = GalleryService::new(Arc::new(FixedBackend), None, store.clone());

        let generated = service
            .generate(&db.conn, "a red apple", 512, 512)
            .await
            .unwrap();

        assert_eq!(generated.bytes, PNG_BYTES);
        assert_eq!(generated.record.prompt, "a red apple");
        assert_eq!(generated.record.size_bytes, PNG_BYTES.len() as i64);
        assert!(generated.record.filename.ends_with(".png"));

        let on_disk = store.read(&generated.record.filename).await.unwrap().unwrap();
        assert_eq!(on_disk.len() as i64, generated.record.size_bytes);
        assert_eq!(Image::count(&db.conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn generate_rejects_empty_prompts() {
        let (_dir, db, store) = setup().await;
        let service = GalleryService::new(Arc::new(FixedBackend), None, store);

        let err = service.generate(&db.conn, "   ", 512, 512).await.unwrap_err();
        assert!(matches!(err, GalleryServiceError::EmptyPrompt));
        assert_eq!(Image::count(&db.conn).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fallback_is_used_when_the_primary_fails() {
        let (_dir, db, store) = setup().await;
        let service = GalleryService::new(
            Arc::new(FailingBackend),
            Some(Arc::new(FixedBackend)),
            store,
        );

        let generated = service
            .generate(&db.conn, "a red apple", 512, 512)
            .await
            .unwrap();
        assert_eq!(generated.bytes, PNG_BYTES);
    }

    #[tokio::test]
    async fn generation_fails_when_both_backends_fail() {
        let (_dir, db, store) = setup().await;
        let service = GalleryService::new(
            Arc::new(FailingBackend),
            Some(Arc::new(FailingBackend)),
            store,
        );

        let err = service
            .generate(&db.conn, "a red apple", 512, 512)
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryServiceError::Generation(_)));
        assert_eq!(Image::count(&db.conn).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn record_failure_removes_the_orphaned_file() {
        let (_dir, db, store) = setup().await;
        let service = GalleryService::new(Arc::new(FixedBackend), None, store.clone());

        // Break the record table so the insert after the file write fails.
        db.conn
            .execute_unprepared("DROP TABLE images")
            .await
            .unwrap();

        let err = service
            .generate(&db.conn, "a red apple", 512, 512)
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryServiceError::Database(_)));

        // The just-written file was rolled back, leaving the store empty.
        let leftovers = std::fs::read_dir(store.root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn delete_removes_row_and_file_and_is_then_not_found() {
        let (_dir, db, store) = setup().await;
        let service = GalleryService::new(Arc::new(FixedBackend), None, store.clone());

        let generated = service
            .generate(&db.conn, "a red apple", 512, 512)
            .await
            .unwrap();
        let id = generated.record.id;
        let filename = generated.record.filename.clone();

        assert!(service.delete(&db.conn, id).await.unwrap());
        assert!(!store.exists(&filename).await);
        assert!(service.get(&db.conn, id).await.unwrap().is_none());

        // Second delete is a no-op, not an error.
        assert!(!service.delete(&db.conn, id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_survives_a_missing_file() {
        let (_dir, db, store) = setup().await;
        let service = GalleryService::new(Arc::new(FixedBackend), None, store.clone());

        let generated = service
            .generate(&db.conn, "a red apple", 512, 512)
            .await
            .unwrap();
        store.delete(&generated.record.filename).await.unwrap();

        // Row deletion is authoritative even with the file already gone.
        assert!(service.delete(&db.conn, generated.record.id).await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let (_dir, db, store) = setup().await;
        let service = GalleryService::new(Arc::new(FixedBackend), None, store);

        service
            .generate(&db.conn, "a red apple", 512, 512)
            .await
            .unwrap();

        // Fresh records are inside any positive threshold.
        assert_eq!(service.cleanup(&db.conn, 30).await.unwrap(), 0);
        assert_eq!(Image::count(&db.conn).await.unwrap(), 1);

        // A zero-day threshold expires everything created before now.
        assert_eq!(service.cleanup(&db.conn, 0).await.unwrap(), 1);
        assert_eq!(service.cleanup(&db.conn, 0).await.unwrap(), 0);
        assert_eq!(Image::count(&db.conn).await.unwrap(), 0);
    }
}
