use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::record::{GenerationRecord, GenerationStatus, GenerationUpdate, NewGeneration};

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("generation {0} not found")]
    NotFound(Uuid),
    #[error("generation {id} is already {status} and cannot change")]
    Terminal { id: Uuid, status: GenerationStatus },
    #[error("generation {id}: {reason}")]
    InvalidTransition { id: Uuid, reason: String },
}

/// Process-lifetime map of generation records. Clones share the same map.
#[derive(Clone, Default)]
pub struct GenerationStore {
    records: Arc<RwLock<HashMap<Uuid, GenerationRecord>>>,
}

impl GenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, new: NewGeneration) -> GenerationRecord {
        let mut records = self.records.write().await;
        let mut id = Uuid::new_v4();
        while records.contains_key(&id) {
            id = Uuid::new_v4();
        }
        let settings = new.settings;
        let record = GenerationRecord {
            id,
            user_id: new.user_id,
            input_image_url: new.input_image_url,
            output_image_url: None,
            model: settings.model,
            sampler: settings.sampler,
            cfg_scale: settings.cfg_scale,
            steps: settings.steps,
            denoise_strength: settings.denoise_strength,
            status: GenerationStatus::Pending,
            error: None,
            created_at: Utc::now(),
        };
        records.insert(id, record.clone());
        debug!(generation_id = %id, "generation record created");
        record
    }

    pub async fn get(&self, id: &Uuid) -> Option<GenerationRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn update(
        &self,
        id: &Uuid,
        update: GenerationUpdate,
    ) -> Result<GenerationRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        apply_update(record, update)?;
        debug!(generation_id = %id, status = %record.status, "generation record updated");
        Ok(record.clone())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn apply_update(
    record: &mut GenerationRecord,
    update: GenerationUpdate,
) -> Result<(), StoreError> {
    let id = record.id;
    if record.status.is_terminal() {
        return Err(StoreError::Terminal {
            id,
            status: record.status,
        });
    }

    let next = update.status.unwrap_or(record.status);
    let invalid = |reason: &str| StoreError::InvalidTransition {
        id,
        reason: reason.to_string(),
    };
    if next == GenerationStatus::Pending && record.status != GenerationStatus::Pending {
        return Err(invalid("cannot return to pending"));
    }
    if update.output_image_url.is_some() && next != GenerationStatus::Completed {
        return Err(invalid("output image is only set on completion"));
    }
    match update.output_image_url.as_deref() {
        None if next == GenerationStatus::Completed => {
            return Err(invalid("completion requires an output image"));
        }
        Some(url) if url.trim().is_empty() => return Err(invalid("output image url is empty")),
        _ => {}
    }
    if update.error.is_some() && next != GenerationStatus::Failed {
        return Err(invalid("error detail is only set on failure"));
    }

    record.status = next;
    if let Some(output) = update.output_image_url {
        record.output_image_url = Some(output);
    }
    if let Some(error) = update.error {
        record.error = Some(error);
    }
    Ok(())
}
