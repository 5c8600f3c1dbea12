use thiserror::Error;

use crate::push::PushError;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid step number: {0}")]
    InvalidStep(i64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error(transparent)]
    Llm(#[from] llm_gateway::LlmError),

    #[error("repository clone failed: {0}")]
    Clone(String),

    #[error(transparent)]
    Push(#[from] PushError),

    #[error("report rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
