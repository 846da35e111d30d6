pub mod record;
pub mod service;
pub mod settings;
pub mod store;

pub use record::{GenerationRecord, GenerationStatus, GenerationUpdate, NewGeneration};
pub use service::{GenerationService, ServiceError};
pub use settings::{FieldError, GenerationSettings};
pub use store::{GenerationStore, StoreError};
