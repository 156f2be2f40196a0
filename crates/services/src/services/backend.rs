use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use super::config::{BackendKind, Config, ConfigError};

const STABILITY_API_URL: &str =
    "https://api.stability.ai/v1/generation/stable-diffusion-v1-6/text-to-image";
const POLLINATIONS_API_URL: &str = "https://image.pollinations.ai/prompt";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("image generation timed out")]
    Timeout,
    #[error("image backend returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("image backend request failed: {0}")]
    Transport(reqwest::Error),
    #[error("image backend returned an unusable payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Transport(err)
        }
    }
}

/// Capability that turns a prompt into raw image bytes. Implementations are
/// external network or compute calls; the gallery only sees bytes or an
/// error.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, BackendError>;
}

/// Build the backend selected by configuration. Credentials were checked at
/// config load, but absence is still an error here rather than a panic.
pub fn create_backend(
    kind: BackendKind,
    config: &Config,
) -> Result<Arc<dyn ImageBackend>, ConfigError> {
    let backend: Arc<dyn ImageBackend> = match kind {
        BackendKind::Stability => {
            let api_key =
                config
                    .stability_api_key
                    .clone()
                    .ok_or(ConfigError::MissingCredential {
                        backend: "stability",
                        var: "STABILITY_API_KEY",
                    })?;
            Arc::new(StabilityBackend::new(api_key, config.generation_timeout)?)
        }
        BackendKind::Pollinations => {
            Arc::new(PollinationsBackend::new(config.generation_timeout)?)
        }
        BackendKind::LocalDiffusion => {
            let base_url = config
                .sd_api_url
                .clone()
                .ok_or(ConfigError::MissingCredential {
                    backend: "local-diffusion",
                    var: "SD_API_URL",
                })?;
            Arc::new(LocalDiffusionBackend::new(
                base_url,
                config.generation_timeout,
            )?)
        }
    };
    Ok(backend)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Stability AI text-to-image REST API.
pub struct StabilityBackend {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct StabilityArtifact {
    base64: String,
}

#[derive(Debug, Deserialize)]
struct StabilityResponse {
    artifacts: Vec<StabilityArtifact>,
}

impl StabilityBackend {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
        })
    }
}

#[async_trait]
impl ImageBackend for StabilityBackend {
    fn name(&self) -> &'static str {
        "stability"
    }

    async fn generate(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, BackendError> {
        let body = json!({
            "text_prompts": [{ "text": prompt }],
            "cfg_scale": 7.0,
            "width": width,
            "height": height,
            "steps": 30,
            "samples": 1,
        });

        let response = self
            .client
            .post(STABILITY_API_URL)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: StabilityResponse = response.json().await?;
        let artifact = payload
            .artifacts
            .first()
            .ok_or_else(|| BackendError::Decode("no artifacts in response".to_string()))?;
        BASE64
            .decode(&artifact.base64)
            .map_err(|e| BackendError::Decode(format!("invalid base64 artifact: {e}")))
    }
}

/// Pollinations free image API; the prompt is part of the URL path.
pub struct PollinationsBackend {
    client: reqwest::Client,
}

impl PollinationsBackend {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }

    fn prompt_url(prompt: &str, width: u32, height: u32) -> String {
        let encoded = utf8_percent_encode(prompt, NON_ALPHANUMERIC);
        format!("{POLLINATIONS_API_URL}/{encoded}?width={width}&height={height}")
    }
}

#[async_trait]
impl ImageBackend for PollinationsBackend {
    fn name(&self) -> &'static str {
        "pollinations"
    }

    async fn generate(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, BackendError> {
        let response = self
            .client
            .get(Self::prompt_url(prompt, width, height))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(BackendError::Decode("empty image body".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

/// A locally hosted Stable Diffusion server speaking the txt2img HTTP API.
pub struct LocalDiffusionBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    images: Vec<String>,
}

impl LocalDiffusionBackend {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ImageBackend for LocalDiffusionBackend {
    fn name(&self) -> &'static str {
        "local-diffusion"
    }

    async fn generate(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, BackendError> {
        let body = json!({
            "prompt": prompt,
            "width": width,
            "height": height,
            "steps": 20,
        });

        let response = self
            .client
            .post(format!("{}/sdapi/v1/txt2img", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Txt2ImgResponse = response.json().await?;
        let image = payload
            .images
            .first()
            .ok_or_else(|| BackendError::Decode("no images in response".to_string()))?;
        BASE64
            .decode(image)
            .map_err(|e| BackendError::Decode(format!("invalid base64 image: {e}")))
    }
}
