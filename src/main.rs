//! CLI bootstrap for the permission harvester.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use permission_harvester::{RunConfig, RunError, RunOrchestrator};

/// Harvests Android permission metadata into versioned JSON datasets.
#[derive(Parser, Debug)]
#[command(name = "permission-harvester", version, about)]
struct Cli {
    /// Output directory for datasets (wiped and recreated at run start)
    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,

    /// Cache directory for downloaded SDK platform archives
    #[arg(long, default_value = "download_tmp")]
    download_dir: PathBuf,

    /// Source-tree reference for the unversioned "REL" snapshots
    #[arg(long, default_value = "refs/heads/main")]
    main_ref: String,
}

async fn run(cli: Cli) -> Result<(), RunError> {
    let config = RunConfig::default()
        .with_output_root(cli.output_dir)
        .with_download_root(cli.download_dir)
        .with_main_ref(cli.main_ref);

    RunOrchestrator::new(config)?.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}
