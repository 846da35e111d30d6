use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;

use super::{BackendError, BackendHealth, GeneratedImage, GenerationJob, ImageBackend};

pub const DEFAULT_PLACEHOLDER_URL: &str = concat!(
    "https://images.unsplash.com/photo-1541961017774-22349e4a1262",
    "?ixlib=rb-4.0.3&auto=format&fit=crop&w=800&h=600"
);

/// Stand-in for a real inference server: waits a fixed delay and resolves
/// with a placeholder image URL.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    delay: Duration,
    output_url: String,
}

impl SimulatedBackend {
    pub fn new(delay: Duration, output_url: String) -> Self {
        Self { delay, output_url }
    }
}

#[async_trait]
impl ImageBackend for SimulatedBackend {
    fn kind(&self) -> &'static str {
        "simulated"
    }

    async fn generate(&self, job: &GenerationJob) -> Result<GeneratedImage, BackendError> {
        debug!(
            generation_id = %job.generation_id,
            delay_ms = self.delay.as_millis() as u64,
            "simulating generation"
        );
        sleep(self.delay).await;
        Ok(GeneratedImage::Url(self.output_url.clone()))
    }

    async fn health(&self) -> BackendHealth {
        BackendHealth {
            reachable: true,
            model_loaded: Some(true),
            available_models: None,
            detail: None,
        }
    }
}
