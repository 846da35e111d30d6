//! Router-level tests for the generation API.
//!
//! Requests go through `create_app` with `tower::ServiceExt::oneshot`, using
//! hand-built multipart bodies and PNGs encoded on the fly.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use image::{DynamicImage, ImageFormat, RgbaImage};
use img2img_studio::{
    api::{AppState, create_app},
    backend::{
        BackendError, BackendHealth, GeneratedImage, GenerationJob, ImageBackend,
        SimulatedBackend,
    },
    generation::{GenerationService, GenerationStore},
    outputs::OutputStore,
};
use serde_json::Value;
use tower::util::ServiceExt;

const BOUNDARY: &str = "img2img-test-boundary";
const PLACEHOLDER: &str = "http://placeholder.test/out.png";
const VALID_SETTINGS: &str = r#"{
    "model": "stable-diffusion-xl",
    "sampler": "euler-a",
    "cfgScale": 7.5,
    "steps": 20,
    "denoiseStrength": 0.75
}"#;

struct BrokenBackend;

#[async_trait]
impl ImageBackend for BrokenBackend {
    fn kind(&self) -> &'static str {
        "broken"
    }

    async fn generate(&self, _job: &GenerationJob) -> Result<GeneratedImage, BackendError> {
        Err(BackendError::Status {
            status: 503,
            body: "model not loaded".to_string(),
        })
    }

    async fn health(&self) -> BackendHealth {
        BackendHealth {
            reachable: false,
            model_loaded: Some(false),
            available_models: None,
            detail: Some("down".to_string()),
        }
    }
}

fn service_with(backend: Arc<dyn ImageBackend>) -> GenerationService {
    GenerationService::new(
        GenerationStore::new(),
        backend,
        OutputStore::new("http://localhost:5000".to_string()),
        Duration::from_secs(5),
    )
}

fn simulated_service() -> GenerationService {
    service_with(Arc::new(SimulatedBackend::new(
        Duration::from_millis(10),
        PLACEHOLDER.to_string(),
    )))
}

fn app(service: &GenerationService, max_upload_bytes: usize) -> Router {
    create_app(AppState::new(service.clone(), max_upload_bytes))
}

fn png_bytes() -> Vec<u8> {
    let mut output = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(8, 8))
        .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
        .unwrap();
    output
}

fn multipart_body(image: Option<(&str, &[u8])>, settings: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((content_type, data)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"image\"; filename=\"input.png\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(settings) = settings {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"settings\"\r\n\r\n{settings}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn generate_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/generate")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn error_fields(body: &Value) -> Vec<String> {
    body["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .map(|err| err["field"].as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_valid_submission_completes_and_is_fetchable() {
    let service = simulated_service();
    let png = png_bytes();
    let (status, body) = send(
        app(&service, 10 * 1024 * 1024),
        generate_request(multipart_body(Some(("image/png", &png)), Some(VALID_SETTINGS))),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["outputUrl"], PLACEHOLDER);
    assert_eq!(body["message"], "Generation completed successfully");
    let id = body["id"].as_str().unwrap().to_string();

    let (status, record) = send(
        app(&service, 10 * 1024 * 1024),
        get_request(&format!("/api/generation/{id}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["id"], id.as_str());
    assert_eq!(record["status"], "completed");
    assert_eq!(record["outputImageUrl"], PLACEHOLDER);
    assert_eq!(record["model"], "stable-diffusion-xl");
    assert_eq!(record["sampler"], "euler-a");
    assert_eq!(record["cfgScale"], 7.5);
    assert_eq!(record["steps"], 20);
    assert_eq!(record["denoiseStrength"], 0.75);
    assert_eq!(record["userId"], Value::Null);
    assert!(record["inputImageUrl"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
    assert!(record["createdAt"].is_string());
}

#[tokio::test]
async fn test_out_of_range_cfg_scale_is_rejected_without_record() {
    let service = simulated_service();
    let png = png_bytes();
    let settings = VALID_SETTINGS.replace("\"cfgScale\": 7.5", "\"cfgScale\": 20");
    let (status, body) = send(
        app(&service, 10 * 1024 * 1024),
        generate_request(multipart_body(Some(("image/png", &png)), Some(&settings))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid settings");
    assert_eq!(error_fields(&body), vec!["cfgScale".to_string()]);
    assert!(service.store().is_empty().await);
}

#[tokio::test]
async fn test_out_of_range_steps_and_denoise_are_rejected() {
    let service = simulated_service();
    let png = png_bytes();
    let settings = r#"{"model":"m","sampler":"s","cfgScale":7,"steps":0,"denoiseStrength":1.01}"#;
    let (status, body) = send(
        app(&service, 10 * 1024 * 1024),
        generate_request(multipart_body(Some(("image/png", &png)), Some(settings))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        error_fields(&body),
        vec!["steps".to_string(), "denoiseStrength".to_string()]
    );
    assert!(service.store().is_empty().await);
}

#[tokio::test]
async fn test_missing_settings_field_is_rejected() {
    let service = simulated_service();
    let png = png_bytes();
    let (status, body) = send(
        app(&service, 10 * 1024 * 1024),
        generate_request(multipart_body(Some(("image/png", &png)), None)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&body).len(), 5);
    assert!(service.store().is_empty().await);
}

#[tokio::test]
async fn test_non_image_upload_is_rejected_without_record() {
    let service = simulated_service();
    let (status, body) = send(
        app(&service, 10 * 1024 * 1024),
        generate_request(multipart_body(
            Some(("text/plain", b"hello world")),
            Some(VALID_SETTINGS),
        )),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&body), vec!["image".to_string()]);
    assert!(service.store().is_empty().await);

    let (status, _) = send(
        app(&service, 10 * 1024 * 1024),
        generate_request(multipart_body(
            Some(("image/png", b"not really a png")),
            Some(VALID_SETTINGS),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(service.store().is_empty().await);
}

#[tokio::test]
async fn test_missing_image_is_rejected() {
    let service = simulated_service();
    let (status, body) = send(
        app(&service, 10 * 1024 * 1024),
        generate_request(multipart_body(None, Some(VALID_SETTINGS))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No image file provided");
    assert!(service.store().is_empty().await);
}

#[tokio::test]
async fn test_oversized_image_is_rejected() {
    let service = simulated_service();
    let png = png_bytes();
    let (status, body) = send(
        app(&service, 16),
        generate_request(multipart_body(Some(("image/png", &png)), Some(VALID_SETTINGS))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&body), vec!["image".to_string()]);
    assert!(service.store().is_empty().await);
}

#[tokio::test]
async fn test_non_multipart_request_gets_json_error() {
    let service = simulated_service();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app(&service, 10 * 1024 * 1024)
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid form data"));
    assert!(service.store().is_empty().await);
}

#[tokio::test]
async fn test_multipart_without_boundary_gets_json_error() {
    let service = simulated_service();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/generate")
        .header(header::CONTENT_TYPE, "multipart/form-data")
        .body(Body::from(multipart_body(None, Some(VALID_SETTINGS))))
        .unwrap();
    let (status, body) = send(app(&service, 10 * 1024 * 1024), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string(), "body: {body}");
    assert!(service.store().is_empty().await);
}

#[tokio::test]
async fn test_unknown_generation_returns_404() {
    let service = simulated_service();
    let (status, body) = send(
        app(&service, 10 * 1024 * 1024),
        get_request(&format!("/api/generation/{}", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Generation not found");

    let (status, body) = send(
        app(&service, 10 * 1024 * 1024),
        get_request("/api/generation/not-a-uuid"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Generation not found");
}

#[tokio::test]
async fn test_backend_failure_returns_500_and_records_failed() {
    let service = service_with(Arc::new(BrokenBackend));
    let png = png_bytes();
    let (status, body) = send(
        app(&service, 10 * 1024 * 1024),
        generate_request(multipart_body(Some(("image/png", &png)), Some(VALID_SETTINGS))),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Generation failed");
    let id = body["id"].as_str().unwrap().to_string();

    let (status, record) = send(
        app(&service, 10 * 1024 * 1024),
        get_request(&format!("/api/generation/{id}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "failed");
    assert_eq!(record["outputImageUrl"], Value::Null);
    assert!(record["error"].as_str().unwrap().contains("model not loaded"));
}

#[tokio::test]
async fn test_concurrent_submissions_get_distinct_ids() {
    let service = simulated_service();
    let png = png_bytes();
    let mut handles = Vec::new();
    for _ in 0..16 {
        let app = app(&service, 10 * 1024 * 1024);
        let body = multipart_body(Some(("image/png", &png)), Some(VALID_SETTINGS));
        handles.push(tokio::spawn(async move { send(app, generate_request(body)).await }));
    }

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        ids.insert(body["id"].as_str().unwrap().to_string());
    }
    assert_eq!(ids.len(), 16);
    assert_eq!(service.store().len().await, 16);
}

#[tokio::test]
async fn test_options_and_health() {
    let service = simulated_service();
    let (status, options) = send(
        app(&service, 10 * 1024 * 1024),
        get_request("/api/options"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(options["models"]
        .as_array()
        .unwrap()
        .contains(&Value::from("stable-diffusion-xl-base-1.0")));
    assert!(options["samplers"].as_array().unwrap().contains(&Value::from("euler-a")));
    assert_eq!(options["bounds"]["cfgScale"]["max"], 15.0);
    assert_eq!(options["bounds"]["steps"]["min"], 1);
    assert_eq!(options["bounds"]["denoiseStrength"]["max"], 1.0);
    assert_eq!(options["defaults"]["steps"], 20);

    let (status, health) = send(
        app(&service, 10 * 1024 * 1024),
        get_request("/api/health"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["backend"]["kind"], "simulated");
    assert_eq!(health["backend"]["reachable"], true);
}

#[tokio::test]
async fn test_index_page_and_missing_output() {
    let service = simulated_service();
    let response = app(&service, 10 * 1024 * 1024)
        .oneshot(get_request("/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("/api/generate"));

    let (status, body) = send(
        app(&service, 10 * 1024 * 1024),
        get_request("/api/outputs/deadbeef.png"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Output not found");
}
