use axum::extract::{Path, State};
use axum::Json;
use flow_core::catalog::{AgentRecord, ChatReply, ChatRequest, NewAgent};

use super::form::FormData;
use crate::error::AppError;
use crate::state::AppState;

fn parse_id(raw: &str) -> Result<u64, AppError> {
    raw.parse()
        .map_err(|_| AppError::bad_request(format!("invalid agent id '{raw}'")))
}

/// GET /api/agents — all catalog records.
pub async fn list_agents(State(app): State<AppState>) -> Json<Vec<AgentRecord>> {
    Json(app.catalog.list())
}

/// POST /api/agents/create
pub async fn create_agent(
    State(app): State<AppState>,
    Json(body): Json<NewAgent>,
) -> Result<Json<AgentRecord>, AppError> {
    Ok(Json(app.catalog.create(body)?))
}

/// GET /api/agents/{id}
pub async fn get_agent(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgentRecord>, AppError> {
    Ok(Json(app.catalog.get(parse_id(&id)?)?))
}

/// DELETE /api/agents/{id}
pub async fn delete_agent(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    app.catalog.delete(parse_id(&id)?)?;
    Ok(Json(
        serde_json::json!({ "status": "Agent decommissioned successfully" }),
    ))
}

/// POST /api/agents/chat — form `{query, agent_id?}` plus optional files.
pub async fn chat(State(app): State<AppState>, form: FormData) -> Json<ChatReply> {
    let req = ChatRequest {
        query: form.field("query").unwrap_or_default().to_string(),
        agent_id: form.field("agent_id").map(String::from),
        files: form.files,
    };
    Json(app.chat.respond(req).await)
}
