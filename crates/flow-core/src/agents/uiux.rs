use async_trait::async_trait;
use tracing::{debug, info};

use super::{truncate, Services, StepHandler};
use crate::error::{FlowError, Result};
use crate::types::{AgentOutput, StepContext, UploadedFile};

/// Per-file cap on extracted text fed to the LLM.
const MAX_FILE_CHARS: usize = 12_000;

const SYSTEM_PROMPT: &str = "You are Agent-1: Senior UI/UX Designer and Product Analyst.
Turn the product requirements you are given into a UI/UX specification in Markdown.

Cover, in order:
# UI/UX Specification: <product name>
## 1. Product Overview
## 2. User Personas
## 3. User Journeys (numbered flows)
## 4. Information Architecture (screens and navigation)
## 5. Screen Specifications (purpose, layout, components, states for each screen)
## 6. Design System (colour, typography, spacing, components)
## 7. Accessibility Requirements
## 8. Open Questions

Be concrete. Do not invent features the requirements do not imply.";

/// Step 1: requirements text and uploads in, UI/UX specification out.
pub struct UiUxAgent {
    services: Services,
}

impl UiUxAgent {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Assemble the user prompt from the PRD text and any uploaded documents.
    pub fn build_prompt(prd: &str, files: &[UploadedFile]) -> Result<String> {
        let prd = prd.trim();
        if prd.is_empty() && files.is_empty() {
            return Err(FlowError::InvalidInput(
                "PRD text or at least one uploaded file is required".to_string(),
            ));
        }

        let mut prompt = String::from("PRODUCT REQUIREMENTS:\n");
        prompt.push_str(if prd.is_empty() { "(see attached documents)" } else { prd });
        prompt.push('\n');

        for file in files {
            prompt.push_str(&format!("\n--- Attached document: {} ---\n", file.filename));
            match extract_text(file) {
                Some(text) => {
                    prompt.push_str(&truncate(&text, MAX_FILE_CHARS));
                    prompt.push('\n');
                }
                None => prompt.push_str("(binary content, text could not be extracted)\n"),
            }
        }
        Ok(prompt)
    }
}

/// Text of an upload: UTF-8 as-is, PDFs via their text layer.
fn extract_text(file: &UploadedFile) -> Option<String> {
    if let Some(text) = file.text() {
        return Some(text.to_string());
    }
    let is_pdf = file.filename.to_ascii_lowercase().ends_with(".pdf")
        || file.content_type.as_deref() == Some("application/pdf");
    if !is_pdf {
        return None;
    }
    let doc = lopdf::Document::load_mem(&file.bytes).ok()?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    match doc.extract_text(&pages) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            debug!(file = %file.filename, error = %e, "pdf text extraction failed");
            None
        }
    }
}

#[async_trait]
impl StepHandler for UiUxAgent {
    async fn produce(&self, ctx: &StepContext) -> Result<AgentOutput> {
        let prompt = Self::build_prompt(&ctx.query, &ctx.files)?;
        info!(files = ctx.files.len(), "generating UI/UX specification");
        let spec = self.services.ask(SYSTEM_PROMPT, &prompt).await?;
        Ok(AgentOutput::text(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{services_in, services_with, CannedLlm};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn upload(name: &str, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            content_type: None,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn empty_prd_without_files_is_rejected() {
        let err = UiUxAgent::build_prompt("   ", &[]).unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[test]
    fn text_uploads_are_inlined() {
        let prompt =
            UiUxAgent::build_prompt("", &[upload("prd.md", b"# Todo app\nUsers add tasks")]).unwrap();
        assert!(prompt.contains("(see attached documents)"));
        assert!(prompt.contains("--- Attached document: prd.md ---"));
        assert!(prompt.contains("Users add tasks"));
    }

    #[test]
    fn binary_uploads_are_named_only() {
        let prompt =
            UiUxAgent::build_prompt("Build a todo app", &[upload("logo.png", &[0xff, 0xd8, 0x00, 0x9f])])
                .unwrap();
        assert!(prompt.contains("logo.png"));
        assert!(prompt.contains("binary content"));
    }

    #[test]
    fn pdf_uploads_use_text_layer() {
        let pdf = crate::render::render_pdf("# Requirements\n\nShopping cart checkout").unwrap();
        let text = extract_text(&upload("prd.pdf", &pdf)).unwrap();
        assert!(text.contains("Shopping cart checkout"));
    }

    #[tokio::test]
    async fn produce_returns_llm_text() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(CannedLlm::new("# UI/UX Specification: Todo"));
        let agent = UiUxAgent::new(services_with(dir.path(), llm.clone()));
        let out = agent.produce(&StepContext::new("Build a todo app")).await.unwrap();
        assert_eq!(out.text, "# UI/UX Specification: Todo");
        assert_eq!(llm.call_count(), 1);
        assert!(llm.calls()[0].1.contains("Build a todo app"));
    }

    #[tokio::test]
    async fn produce_propagates_llm_failure() {
        let dir = TempDir::new().unwrap();
        let agent = UiUxAgent::new(services_in(dir.path(), CannedLlm::failing()));
        let err = agent.produce(&StepContext::new("x")).await.unwrap_err();
        assert!(matches!(err, FlowError::Llm(_)));
    }
}
