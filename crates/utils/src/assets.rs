use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");
const DATA_DIR_ENV: &str = "GALLERY_DATA_DIR";

/// Root directory for everything the service persists (database file,
/// generated images). Overridable through `GALLERY_DATA_DIR`.
pub fn data_dir() -> std::path::PathBuf {
    if let Ok(override_dir) = std::env::var(DATA_DIR_ENV) {
        let override_dir = override_dir.trim();
        if !override_dir.is_empty() {
            let path = std::path::PathBuf::from(override_dir);
            if !path.exists() {
                std::fs::create_dir_all(&path).expect("Failed to create data directory");
            }
            return path;
        }
    }

    let path = if cfg!(debug_assertions) {
        std::path::PathBuf::from(PROJECT_ROOT).join("../../dev_assets")
    } else {
        ProjectDirs::from("dev", "prompt-gallery", "prompt-gallery")
            .expect("OS didn't give us a home directory")
            .data_dir()
            .to_path_buf()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).expect("Failed to create data directory");
    }

    path
}

pub fn default_images_dir() -> std::path::PathBuf {
    data_dir().join("generated_images")
}

pub fn default_database_url() -> String {
    format!(
        "sqlite://{}?mode=rwc",
        data_dir().join("gallery.sqlite").to_string_lossy()
    )
}

#[cfg(test)]
mod tests {
    use super::default_database_url;

    #[test]
    fn database_url_is_sqlite_with_create_mode() {
        let url = default_database_url();
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("?mode=rwc"));
    }
}
