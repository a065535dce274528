use crate::config::Config;
use crate::error::CaptchaError;
use crate::preprocessing::{Pipeline, StepTiming};
use crate::raster::RasterBuffer;
use crate::segmentation::{BoundingBox, SegmentationResult, Segmenter};
use crate::style::{StyleConfig, StyleStore};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub styles: Arc<StyleStore>,
    pub config: Arc<Config>,
}

/// Segmentation response
#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    pub success: bool,
    pub style: String,
    pub boxes: Vec<BoundingBox>,
    pub threshold: f64,
    pub steps: Vec<StepTiming>,
    pub processing_time_ms: u64,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One entry of the styles listing
#[derive(Serialize)]
pub struct StyleInfo {
    pub name: String,
    pub folder: String,
    pub captcha_length: [usize; 2],
    pub threshold: Option<f64>,
    pub functions: Vec<String>,
}

/// Styles listing response
#[derive(Serialize)]
pub struct StylesResponse {
    pub version: String,
    pub styles: Vec<StyleInfo>,
    pub max_file_size_bytes: usize,
}

pub fn router(styles: StyleStore, config: Config) -> Router {
    let max_file_size = config.max_file_size;
    let state = AppState {
        styles: Arc::new(styles),
        config: Arc::new(config),
    };

    Router::new()
        .route("/segment", post(handle_segment))
        .route("/styles", get(handle_styles))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let styles = StyleStore::load_dir(&config.styles_dir)?;
    let addr = config.addr();
    let app = router(styles, config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Handle segmentation requests
async fn handle_segment(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SegmentResponse>, CaptchaError> {
    let start = Instant::now();

    let mut file_data: Option<Bytes> = None;
    let mut style_name: Option<String> = None;

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CaptchaError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                file_data = Some(field.bytes().await.map_err(|e| {
                    CaptchaError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?);
            }
            "style" => {
                style_name = Some(field.text().await.map_err(|e| {
                    CaptchaError::InvalidRequest(format!("Invalid style: {}", e))
                })?);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = file_data.ok_or(CaptchaError::MissingFile)?;
    if data.len() > state.config.max_file_size {
        return Err(CaptchaError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    let style_name = style_name
        .ok_or_else(|| CaptchaError::InvalidRequest("Missing style field".to_string()))?;
    let style = state
        .styles
        .get(style_name.trim())
        .map_err(|e| CaptchaError::InvalidRequest(e.to_string()))?
        .clone();

    let (result, threshold, steps) = tokio::task::spawn_blocking(move || segment_bytes(&style, &data))
        .await
        .map_err(|e| CaptchaError::Internal(format!("Segmentation task failed: {}", e)))??;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    let boxes = match result {
        SegmentationResult::Success(boxes) => boxes,
        SegmentationResult::Failure => Vec::new(),
    };

    tracing::info!(
        style = %style_name,
        success = !boxes.is_empty(),
        boxes = boxes.len(),
        "Segmentation completed in {}ms",
        processing_time_ms
    );

    Ok(Json(SegmentResponse {
        success: !boxes.is_empty(),
        style: style_name,
        boxes,
        threshold,
        steps,
        processing_time_ms,
    }))
}

fn segment_bytes(
    style: &StyleConfig,
    data: &[u8],
) -> Result<(SegmentationResult, f64, Vec<StepTiming>), CaptchaError> {
    let threshold = style.require_threshold()?;
    let buffer = RasterBuffer::from_bytes(data)?;

    let cleaned = style.pipeline().process(buffer)?;
    let prepared = Pipeline::pre_segmentation().process(cleaned.buffer)?;

    let mut steps = cleaned.steps;
    steps.extend(prepared.steps);

    let result = Segmenter::new(style.captcha_length(), threshold).segment(&prepared.buffer)?;
    Ok((result, threshold, steps))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle styles listing requests
async fn handle_styles(State(state): State<AppState>) -> impl IntoResponse {
    let styles = state
        .styles
        .iter()
        .map(|style| StyleInfo {
            name: style.name().to_string(),
            folder: style.folder().to_string(),
            captcha_length: style.captcha_length().into(),
            threshold: style.threshold(),
            functions: style
                .pipeline()
                .steps()
                .iter()
                .map(|step| step.label().to_string())
                .collect(),
        })
        .collect();

    Json(StylesResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        styles,
        max_file_size_bytes: state.config.max_file_size,
    })
}
