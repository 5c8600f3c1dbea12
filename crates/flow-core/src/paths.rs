use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CONFIG_DIR: &str = ".sdlc-flow";
pub const CONFIG_FILE: &str = "config.yaml";
pub const CONFIG_ENV: &str = "SDLC_FLOW_CONFIG";

pub const ARCHITECTURE_REPORTS_DIR: &str = "reports/architecture";
pub const ARCHITECTURE_DOC: &str = "docs/architecture_design.md";
pub const CODE_REVIEW_DOC: &str = "docs/code_review.md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<dir>/.sdlc-flow/config.yaml`
pub fn config_path_in(dir: &Path) -> PathBuf {
    dir.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// `~/.sdlc-flow/config.yaml`, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    home::home_dir().map(|h| config_path_in(&h))
}

/// `<output_dir>/<prefix>_<id>.<ext>`
pub fn report_path(output_dir: &Path, prefix: &str, id: &str, ext: &str) -> PathBuf {
    output_dir.join(format!("{prefix}_{id}.{ext}"))
}

/// Target path for the architecture PDF inside the pushed repository.
pub fn architecture_pdf_target(file_id: &str) -> String {
    format!("{ARCHITECTURE_REPORTS_DIR}/architecture_report_{file_id}.pdf")
}

/// Seconds since the epoch, used to name generated repositories and directories.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `<prefix>_<unix_ts>_<8 hex>`, distinct even for calls in the same second.
pub fn unique_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}", unix_timestamp(), &id[..8])
}
