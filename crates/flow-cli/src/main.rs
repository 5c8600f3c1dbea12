mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sdlc-flow",
    about = "Seven-agent SDLC workflow: UI/UX, architecture, impact, code, tests, security, review",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./.sdlc-flow/config.yaml, then ~/.sdlc-flow/config.yaml)
    #[arg(long, global = true, env = "SDLC_FLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a single workflow step in-process and print the result as JSON
    Step {
        /// Step number, 1 (UI/UX) to 7 (Code Review)
        #[arg(long, default_value = "1", allow_negative_numbers = true)]
        step: i64,

        /// Input text; by convention the previous step's output
        #[arg(long, default_value = "")]
        query: String,

        /// Read the input text from a file instead of --query
        #[arg(long, conflicts_with = "query")]
        query_file: Option<PathBuf>,

        /// Repository to analyse or push to
        #[arg(long)]
        github_url: Option<String>,

        /// GitHub token for repository creation and pushes
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: Option<String>,

        /// Attach a document (repeatable)
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(config, port),
        Commands::Step {
            step,
            query,
            query_file,
            github_url,
            github_token,
            files,
        } => cmd::step::run(
            config,
            cmd::step::StepArgs {
                step,
                query,
                query_file,
                github_url,
                github_token,
                files,
            },
        ),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
