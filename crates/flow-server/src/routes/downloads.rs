use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use flow_core::export::WorkflowExport;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/agents/download/{agent_type}/{file_id} — a registered report file.
pub async fn download_report(
    State(app): State<AppState>,
    Path((agent_type, file_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let path = app
        .registry
        .resolve(&file_id)
        .map_err(|_| AppError::not_found("Requested report file not found or expired."))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError::not_found("Requested report file not found or expired."))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_id.clone());
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    debug!(agent_type = %agent_type, file_id = %file_id, "serving report");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

/// GET /api/agents/export/workflow/{workflow_id}?format=json|text
pub async fn export_workflow(
    Path(workflow_id): Path<String>,
    Query(q): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let export = WorkflowExport::new(&workflow_id);
    match q.format.as_deref().unwrap_or("json") {
        "json" => Ok(Json(export).into_response()),
        "text" => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", export.text_filename()),
                ),
            ],
            export.to_text(),
        )
            .into_response()),
        other => Err(AppError::bad_request(format!(
            "unsupported export format '{other}' (expected json or text)"
        ))),
    }
}
