pub mod config;
pub mod serve;
pub mod step;

use anyhow::Context;
use flow_core::Config;
use std::path::Path;

/// Load config from `explicit` or the standard locations.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    Config::load(explicit).with_context(|| match explicit {
        Some(p) => format!("failed to load config from {}", p.display()),
        None => "failed to load config".to_string(),
    })
}
