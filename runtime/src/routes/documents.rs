use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::info;
use uuid::Uuid;

use super::types::{ChunkPreviewRequest, ChunkPreviewResponse, JobsResponse, UploadResponse};
use crate::{
    AppState,
    error::{AppError, AppResult},
    pipeline::{AnalysisJob, ChunkConfig, JobState},
};

pub fn document_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/documents/upload", post(upload_document))
        .route("/api/documents/jobs", get(list_jobs))
        .route("/api/documents/chunk-preview", post(chunk_preview))
        .route("/api/documents/{id}/status", get(job_status))
}

struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let mut file: Option<UploadedFile> = None;
    let mut document_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::validation(format!("invalid multipart payload: {err}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::validation("uploaded file missing filename"))?;
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|err| {
                    AppError::validation(format!("failed to read upload field: {err}"))
                })?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("documentId") => {
                let value = field.text().await.map_err(|err| {
                    AppError::validation(format!("failed to read documentId: {err}"))
                })?;
                document_id = Some(value.trim().to_string()).filter(|id| !id.is_empty());
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::validation("missing file field in multipart payload"))?;
    let size = file.bytes.len() as u64;
    let filename = state
        .uploads
        .validate(&file.filename, file.content_type.as_deref(), size)?;
    if !state.analyzer.supports(&filename) {
        return Err(AppError::validation(format!(
            "No text extractor is available for '{filename}'"
        )));
    }

    let document_id = match document_id {
        Some(id) if id.contains(['/', '\\']) => {
            return Err(AppError::validation(format!("Invalid document id '{id}'")));
        }
        Some(id) => id,
        None => format!("doc-{}", Uuid::new_v4().simple()),
    };

    state
        .analyzer
        .submit(document_id.clone(), filename.clone(), file.bytes)
        .await?;
    state.suggestions_cache.remove(&document_id).await;
    info!(%document_id, %filename, size, "document uploaded");

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            document_id,
            filename,
            size,
            status: JobState::Processing,
        }),
    ))
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<JobsResponse> {
    let jobs = state.analyzer.active_jobs().await;
    Json(JobsResponse {
        total: jobs.len(),
        jobs,
    })
}

async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> AppResult<Json<AnalysisJob>> {
    state
        .analyzer
        .job_status(&document_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("No analysis job for document {document_id}")))
}

async fn chunk_preview(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChunkPreviewRequest>,
) -> AppResult<Json<ChunkPreviewResponse>> {
    if body.content.trim().is_empty() {
        return Err(AppError::validation("Content cannot be empty"));
    }

    let defaults = &state.config.chunking;
    let config = ChunkConfig {
        max_tokens: body.max_tokens.unwrap_or(defaults.max_tokens),
        overlap_tokens: body.overlap_tokens.unwrap_or(defaults.overlap_tokens),
        split_by: body.split_by,
    };
    let chunks = state
        .chunker
        .chunk(&body.content, &config)
        .map_err(|err| AppError::validation(err.to_string()))?;

    Ok(Json(ChunkPreviewResponse {
        total_chunks: chunks.len(),
        total_tokens: chunks.iter().map(|chunk| chunk.token_count).sum(),
        chunks,
    }))
}
