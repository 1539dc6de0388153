//! HTTP API: image upload and analysis, health check, static UI.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::config::{check_unit_interval, AppConfig};
use crate::pipeline::{process_image, InferenceBackend};
use crate::response::ErrorResponse;
use crate::types::ModelKind;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn InferenceBackend>,
    pub default_confidence: f32,
}

/// Errors that end a request before inference runs
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::Multipart(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    models_available: Vec<ModelKind>,
    detection_model: String,
    segmentation_model: String,
}

/// Build the application router
pub fn create_router(state: AppState, static_dir: Option<&Path>, max_upload_bytes: usize) -> Router {
    let api = Router::new()
        .route("/api/analyze", post(analyze_handler))
        .route("/api/health", get(health_handler))
        .with_state(state);

    let router = match static_dir {
        Some(dir) if dir.is_dir() => api.fallback_service(ServeDir::new(dir)),
        Some(dir) => {
            warn!("Static directory {} not found; UI disabled", dir.display());
            api
        }
        None => api,
    };

    router
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: &AppConfig, backend: Arc<dyn InferenceBackend>) -> anyhow::Result<()> {
    let available = backend.models_available();
    let state = AppState {
        backend,
        default_confidence: config.inference.default_confidence,
    };
    let router = create_router(
        state,
        Some(config.server.static_dir.as_path()),
        config.server.max_upload_bytes,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Serving on http://{} with models: {:?}",
        listener.local_addr()?,
        available
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

async fn analyze_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;
    let mut model_type = None;
    let mut conf_threshold = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                upload = Some((filename, data));
            }
            Some("model_type") => model_type = Some(field.text().await?),
            Some("conf_threshold") => conf_threshold = Some(field.text().await?),
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let (filename, data) = upload.ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;
    if filename.is_empty() {
        return Err(ApiError::BadRequest("No file selected".into()));
    }
    if !allowed_file(&filename) {
        return Err(ApiError::BadRequest("Invalid file type".into()));
    }

    let requested = match model_type.as_deref() {
        Some(value) => value.parse().unwrap_or_else(|_| {
            debug!("Unknown model_type {:?}, using detection", value);
            ModelKind::Detection
        }),
        None => ModelKind::Detection,
    };
    let confidence = match conf_threshold {
        Some(raw) => raw
            .trim()
            .parse::<f32>()
            .map_err(|e| ApiError::Internal(format!("could not convert conf_threshold {:?}: {}", raw, e)))?,
        None => state.default_confidence,
    };
    check_unit_interval("conf_threshold", confidence)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    info!(
        "Analyzing {} ({} bytes) with {} model, conf {}",
        filename,
        data.len(),
        requested,
        confidence
    );

    let backend = state.backend.clone();
    let result = tokio::task::spawn_blocking(move || {
        let image = image::load_from_memory(&data)
            .map_err(|e| anyhow::anyhow!("Failed to decode image {}: {}", filename, e))?;
        process_image(backend.as_ref(), &image, requested, confidence)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Inference task failed: {}", e)))?;

    Ok(match result {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            warn!("Analysis failed: {:#}", e);
            Json(ErrorResponse::new(format!("{:#}", e))).into_response()
        }
    })
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let describe = |kind| {
        state
            .backend
            .model_path(kind)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "Not loaded".to_string())
    };

    Json(HealthResponse {
        status: "healthy",
        models_available: state.backend.models_available(),
        detection_model: describe(ModelKind::Detection),
        segmentation_model: describe(ModelKind::Segmentation),
    })
}
