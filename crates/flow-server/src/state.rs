use flow_core::{
    AgentCatalog, ArtifactRegistry, ChatRouter, Config, GitHubHost, Orchestrator, RepositoryHost,
    Services,
};
use llm_gateway::Gateway;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub chat: Arc<ChatRouter>,
    pub catalog: Arc<AgentCatalog>,
    pub registry: Arc<ArtifactRegistry>,
}

impl AppState {
    /// Wire the standard agents over `services`, publishing through `host`.
    pub fn new(services: Services, host: Arc<dyn RepositoryHost>) -> Self {
        let catalog = Arc::new(AgentCatalog::seeded());
        Self {
            orchestrator: Arc::new(Orchestrator::standard(&services, host)),
            chat: Arc::new(ChatRouter::new(catalog.clone(), services.clone())),
            catalog,
            registry: services.registry,
        }
    }

    /// Production wiring: the configured LLM providers and the GitHub API.
    pub fn from_config(config: &Config) -> Self {
        let gateway = Gateway::new(&config.llm.providers, config.retry_policy());
        if gateway.is_configured() {
            info!(providers = ?gateway.provider_names(), "LLM gateway ready");
        } else {
            warn!("no LLM provider has an API key; agent steps will fail until one is set");
        }

        let token = config.github_token();
        if token.is_none() {
            warn!(env = %config.github.token_env, "no GitHub token; repository pushes are disabled");
        }
        let host = Arc::new(GitHubHost::new(config.github.api_base.clone(), token));

        let registry = Arc::new(ArtifactRegistry::new());
        let services = Services::new(Arc::new(gateway), registry, config);
        Self::new(services, host)
    }
}
