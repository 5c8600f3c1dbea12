use crate::output::{print_json, print_yaml};
use anyhow::Result;
use clap::Subcommand;
use flow_core::Config;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration (API keys masked)
    Show {
        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
    /// Print which config file is in effect
    Path,
}

pub fn run(config_path: Option<&Path>, subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { json } => {
            let config = masked(super::load_config(config_path)?);
            if json {
                print_json(&config)
            } else {
                print_yaml(&config)
            }
        }
        ConfigSubcommand::Path => {
            match Config::locate(config_path) {
                Some(path) => println!("{}", path.display()),
                None => println!("(defaults)"),
            }
            Ok(())
        }
    }
}

fn masked(mut config: Config) -> Config {
    for provider in &mut config.llm.providers {
        if provider.api_key.is_some() {
            provider.api_key = Some("********".to_string());
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_keys_are_masked() {
        let mut config = Config::default();
        config.llm.providers[0].api_key = Some("gsk_secret".to_string());
        let shown = masked(config);
        assert_eq!(shown.llm.providers[0].api_key.as_deref(), Some("********"));
    }

    #[test]
    fn absent_keys_stay_absent() {
        let shown = masked(Config::default());
        assert!(shown.llm.providers[0].api_key.is_none());
    }
}
