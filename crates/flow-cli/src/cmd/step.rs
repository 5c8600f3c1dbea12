use crate::output::print_json;
use anyhow::{bail, Context, Result};
use flow_core::types::StepStatus;
use flow_core::{StepContext, UploadedFile};
use flow_server::AppState;
use std::path::{Path, PathBuf};

pub struct StepArgs {
    pub step: i64,
    pub query: String,
    pub query_file: Option<PathBuf>,
    pub github_url: Option<String>,
    pub github_token: Option<String>,
    pub files: Vec<PathBuf>,
}

pub fn run(config_path: Option<&Path>, args: StepArgs) -> Result<()> {
    let config = super::load_config(config_path)?;

    let query = match &args.query_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => args.query,
    };
    let files = args
        .files
        .iter()
        .map(|p| read_upload(p))
        .collect::<Result<Vec<_>>>()?;

    let mut ctx = StepContext::new(query);
    ctx.github_url = args.github_url.filter(|u| !u.trim().is_empty());
    ctx.files = files;

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async move {
        let state = AppState::from_config(&config);
        if let Some(token) = &args.github_token {
            state.orchestrator.set_token(token);
        }
        state.orchestrator.run_step(args.step, ctx).await
    });

    print_json(&result)?;
    if result.status == StepStatus::Error {
        bail!("{}", result.message);
    }
    Ok(())
}

fn read_upload(path: &Path) -> Result<UploadedFile> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => Some("application/pdf".to_string()),
        Some("md") | Some("txt") => Some("text/plain".to_string()),
        _ => None,
    };
    Ok(UploadedFile {
        filename,
        content_type,
        bytes,
    })
}
