mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::Parser;
use statesync_logging::sync_debug;

use crate::commands::Cli;
use crate::config::{apply_overrides, load_config, Overrides};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(
        cli.log,
        logging::level_for_verbosity(cli.verbose),
        cli.log_file.as_deref(),
    );

    let config = apply_overrides(
        load_config(&cli.config)?,
        Overrides {
            base_url: cli.base_url,
            storage_dir: cli.storage_dir,
            cookies: cli.cookie,
        },
    );
    sync_debug!("Effective config: {:?}", config);

    commands::run(cli.command, &config).await
}
