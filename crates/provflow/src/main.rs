mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "provflow")]
#[command(about = "Declarative Alibaba Cloud provisioning, one idempotent step at a time", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run handlers in order with one shared context
    Run {
        /// Handler names (e.g. devops.aliyun.vpc.vpc.create)
        #[arg(required = true)]
        handlers: Vec<String>,
        /// Configuration file (defaults to provflow.yaml discovery)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Deployment code (falls back to the top-level `code` key)
        #[arg(long, env = "PROVFLOW_CODE")]
        code: Option<String>,
        /// Write published outputs to this file as JSON
        #[arg(short, long)]
        outputs: Option<PathBuf>,
    },
    /// List registered handlers
    Handlers,
    /// Check configuration and credentials without calling the provider
    Validate {
        /// Configuration file (defaults to provflow.yaml discovery)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries command output, logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run {
            handlers,
            config,
            code,
            outputs,
        } => {
            commands::run::handle(commands::run::RunOptions {
                handlers,
                config,
                code,
                outputs,
            })
            .await?;
        }
        Commands::Handlers => {
            commands::handlers::handle();
        }
        Commands::Validate { config } => {
            commands::validate::handle(config.as_deref())?;
        }
        Commands::Version => {
            println!("provflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
