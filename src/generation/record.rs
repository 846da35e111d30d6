use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::settings::GenerationSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Processing => "processing",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub input_image_url: String,
    pub output_image_url: Option<String>,
    pub model: String,
    pub sampler: String,
    pub cfg_scale: f64,
    pub steps: u32,
    pub denoise_strength: f64,
    pub status: GenerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GenerationRecord {
    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            model: self.model.clone(),
            sampler: self.sampler.clone(),
            cfg_scale: self.cfg_scale,
            steps: self.steps,
            denoise_strength: self.denoise_strength,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub input_image_url: String,
    pub settings: GenerationSettings,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationUpdate {
    pub status: Option<GenerationStatus>,
    pub output_image_url: Option<String>,
    pub error: Option<String>,
}

impl GenerationUpdate {
    pub fn processing() -> Self {
        Self {
            status: Some(GenerationStatus::Processing),
            ..Default::default()
        }
    }

    pub fn completed(output_image_url: String) -> Self {
        Self {
            status: Some(GenerationStatus::Completed),
            output_image_url: Some(output_image_url),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(GenerationStatus::Failed),
            output_image_url: None,
            error: Some(error.into()),
        }
    }
}
