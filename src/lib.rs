pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod generation;
pub mod image_processing;
pub mod outputs;
pub mod web_pages;

use std::sync::Arc;

use backend::{BackendError, ImageBackend, RemoteBackend, SimulatedBackend};
use config::AppConfig;
use generation::{GenerationService, GenerationStore};
use outputs::OutputStore;

/// Picks the remote backend when `BACKEND_URL` is configured, otherwise the
/// fixed-delay simulation.
pub fn build_backend(config: &AppConfig) -> Result<Arc<dyn ImageBackend>, BackendError> {
    Ok(match &config.backend_url {
        Some(url) => Arc::new(RemoteBackend::new(url)?),
        None => Arc::new(SimulatedBackend::new(
            config.processing_delay,
            config.placeholder_output_url.clone(),
        )),
    })
}

pub fn build_service(config: &AppConfig, backend: Arc<dyn ImageBackend>) -> GenerationService {
    GenerationService::new(
        GenerationStore::new(),
        backend,
        OutputStore::new(config.public_base_url.clone()),
        config.generation_timeout,
    )
}
