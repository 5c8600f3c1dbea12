//! In-memory agent catalog and free-form chat routing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::agents::{truncate, ArchitectureAgent, Services, UiUxAgent};
use crate::error::{FlowError, Result};
use crate::types::{UploadedFile, WorkflowStep};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRecord {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
}

fn seed(step: WorkflowStep) -> (&'static str, &'static str) {
    match step {
        WorkflowStep::UiUx => (
            "Turns product requirements into UI/UX specifications.",
            "You are a senior UI/UX designer. Answer with concrete, screen-level design guidance.",
        ),
        WorkflowStep::Architecture => (
            "Designs system architecture from requirements and existing repositories.",
            "You are a principal software architect. Answer with clear architecture decisions and trade-offs.",
        ),
        WorkflowStep::ImpactAnalysis => (
            "Assesses technical and business impact of proposed changes.",
            "You are a senior technical analyst. Assess technical and business impact, risks and effort.",
        ),
        WorkflowStep::Coding => (
            "Generates backend and frontend source code.",
            "You are a principal backend engineer. Answer with production-quality code and brief explanations.",
        ),
        WorkflowStep::Testing => (
            "Analyses code and generates automated test suites.",
            "You are a senior QA engineer. Answer with test strategies and concrete pytest examples.",
        ),
        WorkflowStep::SecurityScanning => (
            "Scans source code for security vulnerabilities.",
            "You are a senior security researcher. Identify vulnerabilities and explain fixes.",
        ),
        WorkflowStep::CodeReview => (
            "Reviews generated code for quality, performance and maintainability.",
            "You are a principal engineer doing code review. Give specific, actionable feedback.",
        ),
    }
}

// ---------------------------------------------------------------------------
// AgentCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CatalogInner {
    agents: BTreeMap<u64, AgentRecord>,
    next_id: u64,
}

/// Agent configuration records, ids assigned sequentially from 1.
#[derive(Debug, Default)]
pub struct AgentCatalog {
    inner: RwLock<CatalogInner>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding one record per workflow agent, ids 1 to 7 in step order.
    pub fn seeded() -> Self {
        let catalog = Self::new();
        for step in WorkflowStep::all() {
            let (description, prompt) = seed(*step);
            catalog.insert(NewAgent {
                name: step.agent_name().to_string(),
                description: description.to_string(),
                system_prompt: prompt.to_string(),
            });
        }
        catalog
    }

    fn insert(&self, new: NewAgent) -> AgentRecord {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let record = AgentRecord {
            id: inner.next_id,
            name: new.name,
            description: new.description,
            system_prompt: new.system_prompt,
            created_at: Utc::now(),
        };
        inner.agents.insert(record.id, record.clone());
        record
    }

    pub fn list(&self) -> Vec<AgentRecord> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.agents.values().cloned().collect()
    }

    pub fn create(&self, new: NewAgent) -> Result<AgentRecord> {
        if new.name.trim().is_empty() {
            return Err(FlowError::InvalidInput("agent name is required".to_string()));
        }
        let record = self.insert(new);
        info!(id = record.id, name = %record.name, "agent created");
        Ok(record)
    }

    pub fn get(&self, id: u64) -> Result<AgentRecord> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .agents
            .get(&id)
            .cloned()
            .ok_or_else(|| FlowError::AgentNotFound(id.to_string()))
    }

    pub fn delete(&self, id: u64) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match inner.agents.remove(&id) {
            Some(r) => {
                info!(id, name = %r.name, "agent deleted");
                Ok(())
            }
            None => Err(FlowError::AgentNotFound(id.to_string())),
        }
    }

    fn first(&self) -> Option<AgentRecord> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.agents.values().next().cloned()
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub query: String,
    pub agent_id: Option<String>,
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub status: &'static str,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatReply {
    fn success(response: String, agent: impl Into<String>) -> Self {
        Self {
            status: "success",
            response,
            agent: Some(agent.into()),
            timestamp: Utc::now(),
        }
    }

    fn error(response: impl Into<String>) -> Self {
        Self {
            status: "error",
            response: response.into(),
            agent: None,
            timestamp: Utc::now(),
        }
    }
}

/// Routes chat messages to an agent picked from the catalog.
pub struct ChatRouter {
    catalog: Arc<AgentCatalog>,
    services: Services,
}

impl ChatRouter {
    pub fn new(catalog: Arc<AgentCatalog>, services: Services) -> Self {
        Self { catalog, services }
    }

    /// Answer `req`. Failures are reported in the reply, never returned.
    pub async fn respond(&self, req: ChatRequest) -> ChatReply {
        let query = req.query.trim();
        if query.is_empty() {
            return ChatReply::error("Query is required");
        }

        let agent = match req.agent_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => match self.catalog.first() {
                Some(a) => a,
                None => return ChatReply::error("No agents available"),
            },
            Some(raw) => {
                let Ok(id) = raw.parse::<u64>() else {
                    return ChatReply::error("Invalid agent ID");
                };
                match self.catalog.get(id) {
                    Ok(a) => a,
                    Err(_) => {
                        warn!(agent_id = id, "chat agent not found, using mock response");
                        return ChatReply::success(
                            format!("Mock response for query: {query}. Agent {id} not found in database."),
                            "Mock Agent",
                        );
                    }
                }
            }
        };

        match self.route(&agent, query, &req.files).await {
            Ok(text) => ChatReply::success(text, agent.name),
            Err(e) => {
                warn!(agent = %agent.name, error = %e, "chat failed");
                ChatReply::error(format!("Error: {e}"))
            }
        }
    }

    async fn route(&self, agent: &AgentRecord, query: &str, files: &[UploadedFile]) -> Result<String> {
        if agent.name.contains("UI/UX") {
            info!(files = files.len(), "chat routed to UI/UX agent");
            let prompt = UiUxAgent::build_prompt(query, files)?;
            return self.services.ask(&agent.system_prompt, &prompt).await;
        }

        if agent.name.contains("Architecture") || query.to_lowercase().contains("architecture") {
            if let Some(url) = query.split_whitespace().find(|w| w.contains("github.com")) {
                info!(repository = url, "chat routed to architecture analysis");
                let architect = ArchitectureAgent::new(self.services.clone());
                let analysis = architect.analyze("", Some(url)).await?;
                return Ok(match architect.report(&analysis, Some(url)).await {
                    Some(id) => format!(
                        "Architecture document generated successfully!\n\n\
                         **Download PDF Report:**\n\
                         [Click here to download the Architecture Report]({})\n\n\
                         **Analysis Summary:**\n{}...",
                        WorkflowStep::Architecture.download_url(&id),
                        truncate(&analysis, 500),
                    ),
                    None => "Architecture analysis completed but PDF generation failed. Please check the logs."
                        .to_string(),
                });
            }
        }

        self.services.ask(&agent.system_prompt, query).await
    }
}
