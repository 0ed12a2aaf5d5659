use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::commands::Commands;
use super::env::CliArgs;
use super::runtime::{init_logging, load_config, load_local_env_overrides, load_policy};
use super::{cmd_check, cmd_policy, cmd_serve};

pub async fn run() -> Result<()> {
    // Read before parsing so local.env can feed clap's env fallbacks.
    let local_env = load_local_env_overrides();
    let cli = CliArgs::parse();

    let loaded = load_config(cli.config.as_ref()).await?;
    let _log_guard = init_logging(&cli.log_level, cli.debug, &loaded.config.logging)?;

    info!(
        "Starting Eventra gateway v{} ({} built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_DATE")
    );
    local_env.log();
    loaded.log_source();
    let config = loaded.config;

    let result = match cli.command {
        Commands::Serve(args) => {
            let policy = load_policy(&config)?;
            cmd_serve(args, config, policy).await
        }
        Commands::Policy(args) => {
            let policy = load_policy(&config)?;
            cmd_policy(args, &policy)
        }
        Commands::Check(args) => {
            let policy = load_policy(&config)?;
            cmd_check(args, policy)
        }
    };

    match result {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
