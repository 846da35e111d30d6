use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::record::{GenerationRecord, GenerationUpdate, NewGeneration};
use super::settings::GenerationSettings;
use super::store::{GenerationStore, StoreError};
use crate::backend::{BackendError, GeneratedImage, GenerationJob, ImageBackend};
use crate::image_processing::UploadedImage;
use crate::outputs::OutputStore;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Drives a generation record from `pending` to exactly one terminal state.
///
/// The backend call runs in its own task, bounded by `timeout` and by the
/// service-wide cancellation token, so the record settles even when the
/// submitting request goes away.
#[derive(Clone)]
pub struct GenerationService {
    store: GenerationStore,
    backend: Arc<dyn ImageBackend>,
    outputs: OutputStore,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl GenerationService {
    pub fn new(
        store: GenerationStore,
        backend: Arc<dyn ImageBackend>,
        outputs: OutputStore,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            outputs,
            timeout,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &GenerationStore {
        &self.store
    }

    pub fn outputs(&self) -> &OutputStore {
        &self.outputs
    }

    pub fn backend(&self) -> &Arc<dyn ImageBackend> {
        &self.backend
    }

    pub async fn submit(
        &self,
        image: UploadedImage,
        settings: GenerationSettings,
    ) -> Result<GenerationRecord, ServiceError> {
        let record = self
            .store
            .create(NewGeneration {
                input_image_url: image.to_data_url(),
                settings: settings.clone(),
                user_id: None,
            })
            .await;
        let id = record.id;
        info!(
            generation_id = %id,
            model = %settings.model,
            sampler = %settings.sampler,
            backend = self.backend.kind(),
            "generation submitted"
        );
        self.store.update(&id, GenerationUpdate::processing()).await?;

        let job = GenerationJob {
            generation_id: id,
            image,
            settings,
        };
        let task = tokio::spawn(self.clone().run(job));
        match task.await {
            Ok(result) => result,
            Err(join_err) => {
                error!(generation_id = %id, error = %join_err, "generation task aborted");
                let detail = format!("generation task aborted: {join_err}");
                Ok(self.fail(&id, detail).await?)
            }
        }
    }

    pub fn shutdown(&self) {
        info!("cancelling in-flight generations");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn run(self, job: GenerationJob) -> Result<GenerationRecord, ServiceError> {
        let id = job.generation_id;
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(BackendError::Cancelled),
            result = timeout(self.timeout, self.backend.generate(&job)) => {
                result.unwrap_or(Err(BackendError::Timeout(self.timeout)))
            }
        };

        let update = match outcome {
            Ok(GeneratedImage::Url(url)) => GenerationUpdate::completed(url),
            Ok(GeneratedImage::Bytes { data, mime_type }) => {
                let key = self.outputs.put(data, &mime_type).await;
                GenerationUpdate::completed(self.outputs.get_public_url(&key))
            }
            Err(err) => {
                warn!(generation_id = %id, error = %err, "generation failed");
                GenerationUpdate::failed(err.to_string())
            }
        };

        match self.store.update(&id, update).await {
            Ok(record) => {
                info!(generation_id = %id, status = %record.status, "generation finished");
                Ok(record)
            }
            Err(err) => {
                error!(generation_id = %id, error = %err, "failed to record generation outcome");
                let detail = format!("could not record generation outcome: {err}");
                Ok(self.fail(&id, detail).await?)
            }
        }
    }

    async fn fail(&self, id: &Uuid, detail: String) -> Result<GenerationRecord, StoreError> {
        self.store.update(id, GenerationUpdate::failed(detail)).await
    }
}
