use axum::extract::State;
use axum::Json;
use flow_core::{AgentResult, StepContext};
use tracing::info;

use super::form::FormData;
use crate::error::AppError;
use crate::state::AppState;

/// POST /api/agents/orchestrate-sdlc — run one workflow step.
///
/// Step failures come back as HTTP 200 with `status: "error"`; only a
/// malformed request is rejected outright.
pub async fn orchestrate_sdlc(
    State(app): State<AppState>,
    form: FormData,
) -> Result<Json<AgentResult>, AppError> {
    let step = match form.field("step") {
        None => 1,
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::bad_request(format!("step must be an integer, got '{raw}'")))?,
    };

    if let Some(token) = form.field("github_token") {
        app.orchestrator.set_token(token);
    }

    let ctx = StepContext {
        query: form.field("query").unwrap_or_default().to_string(),
        github_url: form.field("github_url").map(String::from),
        files: form.files,
    };
    info!(step, files = ctx.files.len(), repository = ?ctx.repository(), "orchestrating step");

    Ok(Json(app.orchestrator.run_step(step, ctx).await))
}
