pub mod agents;
pub mod artifact;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod io;
pub mod orchestrator;
pub mod paths;
pub mod push;
pub mod render;
pub mod scan;
pub mod templates;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use agents::{default_handlers, HandlerTable, Services, StepHandler};
pub use artifact::ArtifactRegistry;
pub use catalog::{AgentCatalog, ChatRouter};
pub use config::Config;
pub use error::{FlowError, Result};
pub use orchestrator::Orchestrator;
pub use push::{GitHubHost, PushError, RepositoryHost};
pub use types::{AgentOutput, AgentResult, StepContext, UploadedFile, WorkflowStep};
