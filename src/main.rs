use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use status_pages::cli::generate_status;
use status_pages::config::StatusConfig;
use status_pages::util::env as env_util;

#[derive(Parser, Debug)]
#[command(
    name = "generate_status",
    version,
    about = "Generate status page JSON straight from the platform database"
)]
struct Cli {
    /// Directory for status_<days>.json (defaults to STATUS_OUTPUT_DIR or ./data)
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Only generate these windows (1, 7, 30, 90); repeatable
    #[arg(long = "window", value_name = "DAYS")]
    windows: Vec<u32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_util::init_env();
    status_pages::tracing::init_tracing("info,sqlx=warn")?;

    let cfg = StatusConfig::from_env(cli.output_dir, &cli.windows)
        .context("invalid status generator configuration")?;
    generate_status::run(cfg).await
}
