//! API handlers for the intake server
//!
//! Provides REST endpoints for:
//! - PDF upload (`POST /excavation/process-pdf`)
//! - Delivery of text extracted elsewhere (`POST /excavation/process-text`)
//! - Status polling (`GET /excavation/process-pdf/status/:process_id`)

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use pdf_text_core::FileInfo;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::pipeline::{Upload, UploadMetadata};
use crate::status::{ProcessStatus, StatusSnapshot};
use crate::AppState;

pub const PDF_MIME: &str = "application/pdf";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdf-intake-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Success envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Returned when a job has been accepted
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedData {
    pub process_id: String,
    pub status: ProcessStatus,
    pub file_info: FileInfo,
    #[serde(default)]
    pub metadata: UploadMetadata,
}

/// Leading bytes of formats that are commonly mislabeled as PDF
const FOREIGN_SIGNATURES: &[(&[u8], &str)] = &[
    (b"PK\x03\x04", "zip container (docx/xlsx)"),
    (b"\xD0\xCF\x11\xE0", "legacy office document"),
    (b"\x89PNG", "PNG image"),
    (b"\xFF\xD8\xFF", "JPEG image"),
];

fn sniff_foreign(data: &[u8]) -> Option<&'static str> {
    FOREIGN_SIGNATURES
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|(_, name)| *name)
}

/// Handler: POST /excavation/process-pdf
pub async fn handle_process_pdf(
    State(state): State<Arc<AppState>>,
    _auth: Authenticated,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<AcceptedData>>), ApiError> {
    let limit = state.config.max_file_size;
    let mut pdf: Option<(String, bytes::Bytes)> = None;
    let mut metadata = UploadMetadata::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pdf" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if content_type != PDF_MIME {
                    return Err(ApiError::InvalidFileType(format!(
                        "expected {PDF_MIME}, got '{content_type}'"
                    )));
                }
                let file_name = field.file_name().unwrap_or("document.pdf").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, limit))?;
                pdf = Some((file_name, data));
            }
            "projectPhaseId" | "pdfType" | "description" | "notes" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::from_multipart(e, limit))?;
                let slot = match name.as_str() {
                    "projectPhaseId" => &mut metadata.project_phase_id,
                    "pdfType" => &mut metadata.pdf_type,
                    "description" => &mut metadata.description,
                    _ => &mut metadata.notes,
                };
                *slot = Some(value).filter(|v| !v.trim().is_empty());
            }
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let (file_name, data) =
        pdf.ok_or_else(|| ApiError::InvalidRequest("missing 'pdf' file field".into()))?;

    if data.len() > limit {
        return Err(ApiError::FileTooLarge { limit });
    }
    if let Some(format) = sniff_foreign(&data) {
        return Err(ApiError::InvalidFileType(format!(
            "content looks like a {format}"
        )));
    }

    let record = state
        .pipeline
        .submit_upload(Upload {
            file_name,
            data,
            metadata: metadata.clone(),
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        ApiResponse::ok(AcceptedData {
            process_id: record.process_id,
            status: record.status,
            file_info: record.file_info,
            metadata,
        }),
    ))
}

/// Request: text already extracted by another system
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverTextRequest {
    pub text: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Handler: POST /excavation/process-text
pub async fn handle_process_text(
    State(state): State<Arc<AppState>>,
    _auth: Authenticated,
    Json(request): Json<DeliverTextRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AcceptedData>>), ApiError> {
    if request.file_name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("fileName must not be empty".into()));
    }

    let size = request.file_size.unwrap_or(request.text.len() as u64);
    let record = state
        .pipeline
        .submit_for_delivery(request.text, FileInfo::new(request.file_name, size))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        ApiResponse::ok(AcceptedData {
            process_id: record.process_id,
            status: record.status,
            file_info: record.file_info,
            metadata: UploadMetadata::default(),
        }),
    ))
}

/// Handler: GET /excavation/process-pdf/status/:process_id
pub async fn handle_status(
    State(state): State<Arc<AppState>>,
    _auth: Authenticated,
    Path(process_id): Path<String>,
) -> Result<Json<ApiResponse<StatusSnapshot>>, ApiError> {
    let record = state.pipeline.store().get(&process_id).await?;
    info!(
        process_id = %process_id,
        status = ?record.status,
        progress = record.progress,
        "Status polled"
    );
    Ok(ApiResponse::ok(StatusSnapshot::from(record)))
}

/// Router with every route and the shared middleware. Rate limiting is
/// added by the binary since it needs the peer address.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/excavation/process-pdf", post(handle_process_pdf))
        .route("/excavation/process-text", post(handle_process_text))
        .route(
            "/excavation/process-pdf/status/:process_id",
            get(handle_status),
        )
        .layer(DefaultBodyLimit::max(state.config.body_limit()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
