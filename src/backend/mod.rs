//! Image generation backends.
//!
//! The generation service only sees [`ImageBackend`]; whether the work is a
//! fixed-delay simulation or a call to a remote img2img server is decided at
//! startup from configuration.

pub mod remote;
pub mod simulated;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::generation::settings::{GenerationSettings, KNOWN_MODELS};
use crate::image_processing::UploadedImage;

pub use remote::RemoteBackend;
pub use simulated::SimulatedBackend;

#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub generation_id: Uuid,
    pub image: UploadedImage,
    pub settings: GenerationSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedImage {
    /// The backend already hosts the result.
    Url(String),
    /// Raw image bytes that still need a public URL.
    Bytes { data: Vec<u8>, mime_type: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendHealth {
    pub reachable: bool,
    pub model_loaded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_models: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend returned an empty image")]
    EmptyImage,
    #[error("backend did not finish within {0:?}")]
    Timeout(Duration),
    #[error("generation cancelled")]
    Cancelled,
}

#[async_trait]
pub trait ImageBackend: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn generate(&self, job: &GenerationJob) -> Result<GeneratedImage, BackendError>;

    async fn health(&self) -> BackendHealth;

    async fn models(&self) -> Result<Vec<String>, BackendError> {
        Ok(KNOWN_MODELS.iter().map(|model| model.to_string()).collect())
    }
}
