use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use uuid::Uuid;

use crate::{
    backend::BackendHealth,
    error::ApiError,
    generation::{
        GenerationRecord, GenerationService, GenerationSettings, GenerationStatus,
        settings::{
            CFG_SCALE_RANGE, DENOISE_STRENGTH_RANGE, KNOWN_MODELS, KNOWN_SAMPLERS, STEPS_RANGE,
        },
    },
    image_processing::{UploadError, validate_upload},
    outputs::store::OUTPUTS_ROUTE,
    web_pages,
};

/// Room for the multipart envelope and the settings field on top of the image cap.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: GenerationService,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(service: GenerationService, max_upload_bytes: usize) -> Self {
        Self {
            service,
            max_upload_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub id: Uuid,
    pub output_url: String,
    pub status: GenerationStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Bound<T> {
    pub min: T,
    pub max: T,
    pub step: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsBounds {
    pub cfg_scale: Bound<f64>,
    pub steps: Bound<u32>,
    pub denoise_strength: Bound<f64>,
}

#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub models: Vec<String>,
    pub samplers: Vec<String>,
    pub bounds: SettingsBounds,
    pub defaults: GenerationSettings,
}

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub kind: &'static str,
    #[serde(flatten)]
    pub health: BackendHealth,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: BackendStatus,
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES);
    Router::new()
        .route("/", get(web_pages::index_page))
        .route(
            "/api/generate",
            post(submit_generation).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/generation/{id}", get(get_generation))
        .route(&format!("{OUTPUTS_ROUTE}/{{key}}"), get(get_output))
        .route("/api/options", get(get_options))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::Multipart {
        status: err.status(),
        message: err.body_text(),
    }
}

fn multipart_rejection(rejection: MultipartRejection) -> ApiError {
    ApiError::Multipart {
        status: rejection.status(),
        message: rejection.body_text(),
    }
}

pub async fn submit_generation(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let mut multipart = multipart.map_err(multipart_rejection)?;
    let mut image: Option<(Bytes, Option<String>, Option<String>)> = None;
    let mut raw_settings: Option<String> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let content_type = field.content_type().map(str::to_string);
                let file_name = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                image = Some((data, content_type, file_name));
            }
            "settings" => {
                raw_settings = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (bytes, content_type, file_name) = image.ok_or(UploadError::Missing)?;
    let upload = validate_upload(
        bytes,
        content_type.as_deref(),
        file_name,
        state.max_upload_bytes,
    )?;
    let settings = GenerationSettings::parse(raw_settings.as_deref().unwrap_or("{}"))
        .map_err(ApiError::InvalidSettings)?;

    let record = state.service.submit(upload, settings).await?;
    match (record.status, record.output_image_url) {
        (GenerationStatus::Completed, Some(output_url)) => Ok(Json(GenerateResponse {
            id: record.id,
            output_url,
            status: GenerationStatus::Completed,
            message: "Generation completed successfully".to_string(),
        })),
        _ => Err(ApiError::GenerationFailed {
            id: record.id,
            detail: record.error.unwrap_or_else(|| "unknown error".to_string()),
        }),
    }
}

pub async fn get_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GenerationRecord>, ApiError> {
    let id = Uuid::parse_str(id.trim()).map_err(|_| ApiError::NotFound)?;
    state
        .service
        .store()
        .get(&id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn get_output(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let output = state
        .service
        .outputs()
        .get(&key)
        .await
        .ok_or(ApiError::OutputNotFound)?;
    Ok(([(header::CONTENT_TYPE, output.mime_type)], output.bytes).into_response())
}

pub async fn get_options(State(state): State<AppState>) -> Json<OptionsResponse> {
    let models = match state.service.backend().models().await {
        Ok(models) if !models.is_empty() => models,
        Ok(_) => KNOWN_MODELS.iter().map(|model| model.to_string()).collect(),
        Err(err) => {
            warn!(error = %err, "could not list backend models, using built-in catalog");
            KNOWN_MODELS.iter().map(|model| model.to_string()).collect()
        }
    };
    Json(OptionsResponse {
        models,
        samplers: KNOWN_SAMPLERS.iter().map(|sampler| sampler.to_string()).collect(),
        bounds: SettingsBounds {
            cfg_scale: Bound {
                min: CFG_SCALE_RANGE.0,
                max: CFG_SCALE_RANGE.1,
                step: 0.5,
            },
            steps: Bound {
                min: STEPS_RANGE.0,
                max: STEPS_RANGE.1,
                step: 1,
            },
            denoise_strength: Bound {
                min: DENOISE_STRENGTH_RANGE.0,
                max: DENOISE_STRENGTH_RANGE.1,
                step: 0.05,
            },
        },
        defaults: GenerationSettings::default(),
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = state.service.backend();
    Json(HealthResponse {
        status: "ok",
        backend: BackendStatus {
            kind: backend.kind(),
            health: backend.health().await,
        },
    })
}
