use std::{path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;
use utils::assets::{default_database_url, default_images_dir};

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown image backend '{0}' (expected stability, pollinations or local)")]
    UnknownBackend(String),
    #[error("{backend} backend selected but {var} is not set")]
    MissingCredential {
        backend: &'static str,
        var: &'static str,
    },
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Which image generation capability the service talks to. The fallback, if
/// configured, is tried exactly once when the primary fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Stability,
    Pollinations,
    LocalDiffusion,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stability" => Ok(BackendKind::Stability),
            "pollinations" => Ok(BackendKind::Pollinations),
            "local" | "local-diffusion" => Ok(BackendKind::LocalDiffusion),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Startup configuration. Every option is read from the environment exactly
/// once; changing any of them requires a restart.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub images_dir: PathBuf,
    pub backend: BackendKind,
    pub fallback_backend: Option<BackendKind>,
    pub stability_api_key: Option<String>,
    pub sd_api_url: Option<String>,
    pub generation_timeout: Duration,
    /// Records older than this many days are expired; `None` disables the
    /// cleanup job entirely.
    pub cleanup_after_days: Option<i64>,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = read_parsed("PORT", DEFAULT_PORT);

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| default_database_url());
        let images_dir = std::env::var("IMAGES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_images_dir());

        let backend = match std::env::var("IMAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => BackendKind::Pollinations,
        };
        let fallback_backend = match std::env::var("IMAGE_FALLBACK_BACKEND") {
            Ok(value) => Some(value.parse()?),
            Err(_) => None,
        };

        let stability_api_key = non_empty_var("STABILITY_API_KEY");
        let sd_api_url = non_empty_var("SD_API_URL");

        let generation_timeout = Duration::from_secs(read_parsed(
            "GENERATION_TIMEOUT_SECS",
            DEFAULT_GENERATION_TIMEOUT_SECS,
        ));
        let cleanup_after_days = read_cleanup_days();

        let config = Config {
            host,
            port,
            database_url,
            images_dir,
            backend,
            fallback_backend,
            stability_api_key,
            sd_api_url,
            generation_timeout,
            cleanup_after_days,
        };
        config.validate()?;
        Ok(config)
    }

    /// Credentials are validated up front: a selected backend without its
    /// key or endpoint is a startup error, never a hardcoded default.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut kinds = vec![self.backend];
        kinds.extend(self.fallback_backend);
        for kind in kinds {
            match kind {
                BackendKind::Stability if self.stability_api_key.is_none() => {
                    return Err(ConfigError::MissingCredential {
                        backend: "stability",
                        var: "STABILITY_API_KEY",
                    });
                }
                BackendKind::LocalDiffusion if self.sd_api_url.is_none() => {
                    return Err(ConfigError::MissingCredential {
                        backend: "local-diffusion",
                        var: "SD_API_URL",
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_parsed<T: FromStr + Copy>(name: &str, default: T) -> T {
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(value = raw.trim(), "Invalid {name}; using default");
            default
        }
    }
}

fn read_cleanup_days() -> Option<i64> {
    let raw = std::env::var("CLEANUP_AFTER_DAYS").ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<i64>() {
        Ok(days) if days > 0 => Some(days),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(value = trimmed, error = %err, "Invalid CLEANUP_AFTER_DAYS; cleanup disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_known_names() {
        assert_eq!("stability".parse::<BackendKind>().unwrap(), BackendKind::Stability);
        assert_eq!("Pollinations".parse::<BackendKind>().unwrap(), BackendKind::Pollinations);
        assert_eq!("local".parse::<BackendKind>().unwrap(), BackendKind::LocalDiffusion);
        assert!("dall-e".parse::<BackendKind>().is_err());
    }

    #[test]
    fn stability_without_key_is_rejected() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            database_url: "sqlite::memory:".to_string(),
            images_dir: PathBuf::from("generated_images"),
            backend: BackendKind::Stability,
            fallback_backend: None,
            stability_api_key: None,
            sd_api_url: None,
            generation_timeout: Duration::from_secs(60),
            cleanup_after_days: None,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredential { backend: "stability", .. })
        ));
    }

    #[test]
    fn fallback_credentials_are_validated_too() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            database_url: "sqlite::memory:".to_string(),
            images_dir: PathBuf::from("generated_images"),
            backend: BackendKind::Pollinations,
            fallback_backend: Some(BackendKind::LocalDiffusion),
            stability_api_key: None,
            sd_api_url: None,
            generation_timeout: Duration::from_secs(60),
            cleanup_after_days: Some(30),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredential { backend: "local-diffusion", .. })
        ));
    }
}
