use std::{
    io,
    path::{Path, PathBuf},
};

use chrono::Utc;
use tokio::fs;

/// Filesystem home of the generated images, one flat directory of uniquely
/// named files. The store never touches the record table; ownership of a
/// file belongs to whichever record carries its filename.
#[derive(Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the images directory if it does not exist yet.
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a filename inside the store. Rejects anything that could
    /// escape the root: separators, parent components, empty names.
    pub fn path_for(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.contains("..") {
            return None;
        }
        Some(self.root.join(filename))
    }

    /// Write image bytes under a fresh timestamped filename and return it.
    /// Millisecond precision plus a counter keeps rapid successive calls
    /// from colliding. The file is fully written before this returns, so a
    /// record created afterwards never points at a partial file.
    pub async fn save(&self, bytes: &[u8]) -> io::Result<String> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let mut filename = format!("image_{stamp}.png");
        let mut seq = 1u32;
        while fs::try_exists(self.root.join(&filename)).await? {
            filename = format!("image_{stamp}_{seq}.png");
            seq += 1;
        }
        fs::write(self.root.join(&filename), bytes).await?;
        Ok(filename)
    }

    /// Remove a file. A missing file returns `Ok(false)`: cleanup has to
    /// tolerate files already removed out-of-band.
    pub async fn delete(&self, filename: &str) -> io::Result<bool> {
        let Some(path) = self.path_for(filename) else {
            return Ok(false);
        };
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn exists(&self, filename: &str) -> bool {
        match self.path_for(filename) {
            Some(path) => fs::try_exists(path).await.unwrap_or(false),
            None => false,
        }
    }

    /// Read a file's bytes, `None` when absent (or the name is invalid).
    pub async fn read(&self, filename: &str) -> io::Result<Option<Vec<u8>>> {
        let Some(path) = self.path_for(filename) else {
            return Ok(None);
        };
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, ImageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("images"));
        store.init().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn save_returns_readable_png_filename() {
        let (_dir, store) = temp_store().await;

        let filename = store.save(b"not really a png").await.unwrap();
        assert!(filename.starts_with("image_"));
        assert!(filename.ends_with(".png"));

        let bytes = store.read(&filename).await.unwrap().unwrap();
        assert_eq!(bytes, b"not really a png");
        assert!(store.exists(&filename).await);
    }

    #[tokio::test]
    async fn rapid_saves_get_distinct_filenames() {
        let (_dir, store) = temp_store().await;

        let mut names = std::collections::HashSet::new();
        for i in 0..10u8 {
            names.insert(store.save(&[i]).await.unwrap());
        }
        assert_eq!(names.len(), 10);
    }

    #[tokio::test]
    async fn delete_is_false_for_missing_files() {
        let (_dir, store) = temp_store().await;

        let filename = store.save(b"x").await.unwrap();
        assert!(store.delete(&filename).await.unwrap());
        assert!(!store.delete(&filename).await.unwrap());
        assert!(!store.exists(&filename).await);
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let (_dir, store) = temp_store().await;

        assert!(store.path_for("../escape.png").is_none());
        assert!(store.path_for("a/b.png").is_none());
        assert!(store.path_for("a\\b.png").is_none());
        assert!(store.path_for("").is_none());
        assert!(store.read("../../etc/passwd").await.unwrap().is_none());
    }
}
