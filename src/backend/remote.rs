use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::{BackendError, BackendHealth, GeneratedImage, GenerationJob, ImageBackend};
use crate::image_processing::detect_mime_type;

const CONNECT_TIMEOUT_MS: u64 = 5_000;
const HEALTH_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: Option<String>,
    model_loaded: Option<bool>,
    available_models: Option<u64>,
}

/// Client for an img2img inference server exposing `/img2img`, `/health`
/// and `/models`.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: Client,
    base_url: String,
}

async fn assert_ok_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status { status, body })
}

impl RemoteBackend {
    pub fn new(base_url: &Url) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn build_form(job: &GenerationJob) -> Result<Form, BackendError> {
        let image = Part::bytes(job.image.bytes.to_vec())
            .file_name(job.image.file_name_or_default())
            .mime_str(&job.image.mime_type)?;
        let settings = &job.settings;
        Ok(Form::new()
            .part("image", image)
            .text("cfg_scale", settings.cfg_scale.to_string())
            .text("steps", settings.steps.to_string())
            .text("strength", settings.denoise_strength.to_string())
            .text("prompt", "")
            .text("negative_prompt", ""))
    }
}

#[async_trait]
impl ImageBackend for RemoteBackend {
    fn kind(&self) -> &'static str {
        "remote"
    }

    async fn generate(&self, job: &GenerationJob) -> Result<GeneratedImage, BackendError> {
        info!(
            generation_id = %job.generation_id,
            cfg_scale = job.settings.cfg_scale,
            steps = job.settings.steps,
            strength = job.settings.denoise_strength,
            "sending img2img request"
        );
        let response = self
            .client
            .post(self.endpoint("img2img"))
            .multipart(Self::build_form(job)?)
            .send()
            .await?;
        let response = assert_ok_response(response).await?;

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
        let data = response.bytes().await?.to_vec();
        if data.is_empty() {
            return Err(BackendError::EmptyImage);
        }
        let mime_type = detect_mime_type(&data)
            .map(str::to_string)
            .or(header_mime)
            .unwrap_or_else(|| "image/png".to_string());
        debug!(
            generation_id = %job.generation_id,
            bytes = data.len(),
            mime_type = %mime_type,
            "img2img response received"
        );
        Ok(GeneratedImage::Bytes { data, mime_type })
    }

    async fn health(&self) -> BackendHealth {
        let result = async {
            let response = self
                .client
                .get(self.endpoint("health"))
                .timeout(Duration::from_millis(HEALTH_TIMEOUT_MS))
                .send()
                .await?;
            let response = assert_ok_response(response).await?;
            Ok::<HealthResponse, BackendError>(response.json().await?)
        }
        .await;

        match result {
            Ok(payload) => BackendHealth {
                reachable: true,
                model_loaded: payload.model_loaded,
                available_models: payload.available_models,
                detail: payload.status,
            },
            Err(err) => {
                warn!(error = %err, "backend health check failed");
                BackendHealth {
                    reachable: false,
                    model_loaded: None,
                    available_models: None,
                    detail: Some(err.to_string()),
                }
            }
        }
    }

    async fn models(&self) -> Result<Vec<String>, BackendError> {
        let response = self
            .client
            .get(self.endpoint("models"))
            .timeout(Duration::from_millis(HEALTH_TIMEOUT_MS))
            .send()
            .await?;
        let response = assert_ok_response(response).await?;
        Ok(response.json().await?)
    }
}
