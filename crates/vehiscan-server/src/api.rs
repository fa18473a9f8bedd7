use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use base64::Engine as _;
use vehiscan_core::{DetectError, DetectOptions, ImageResult};
use vehiscan_detect::DetectInput;
use vehiscan_pipeline::DetectPipeline;

/// Shared application state.
pub struct AppState {
    pub pipeline: Mutex<DetectPipeline>,
    pub start_time: Instant,
}

/// POST /detect request body.
#[derive(Deserialize)]
pub struct DetectRequest {
    /// Base64-encoded image payloads.
    pub images: Vec<String>,
    /// Detection options; every field may be omitted.
    #[serde(flatten)]
    pub options: DetectOptions,
}

/// POST /detect response.
#[derive(Serialize)]
pub struct DetectResponse {
    pub results: Vec<ImageResult>,
}

/// GET /health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: f64,
    pub gpu_ready: bool,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/detect", post(detect))
        .route("/health", get(health))
        .with_state(state)
}

/// POST /detect: decodes base64 images and runs the pipeline.
async fn detect(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, (StatusCode, Json<ErrorResponse>)> {
    let started = Instant::now();

    let mut images = Vec::with_capacity(req.images.len());
    for (index, payload) in req.images.iter().enumerate() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| bad_request(format!("image {index}: invalid base64: {e}")))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| bad_request(format!("image {index}: decode failed: {e}")))?;
        images.push(image.to_rgb8());
    }
    let input = DetectInput::from_images(images);

    let pipeline = state.pipeline.lock();
    let results = pipeline
        .detect(&input, &req.options)
        .map_err(error_response)?;

    metrics::counter!("detect_requests_total").increment(1);
    metrics::histogram!("detect_latency_ms").record(started.elapsed().as_millis() as f64);

    Ok(Json(DetectResponse { results }))
}

/// GET /health: liveness + readiness check.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs_f64(),
        gpu_ready: state.pipeline.lock().gpu_ready(),
    })
}

fn error_response(err: DetectError) -> (StatusCode, Json<ErrorResponse>) {
    metrics::counter!("detect_errors_total").increment(1);
    match err {
        DetectError::GpuConfig(_) | DetectError::InvalidInput(_) | DetectError::ImageDecode(_) => {
            bad_request(err.to_string())
        }
        _ => internal_error(err.to_string()),
    }
}

fn bad_request(msg: String) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: msg }))
}

fn internal_error(msg: String) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!(error = %msg, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: msg }),
    )
}
