use anyhow::Result;
use clap::Parser;
use log::debug;

use speedprobe::cli::{Cli, SpeedCommandHandler, commands::Commands};
use speedprobe::config::Settings;
use speedprobe::dashboard::Dashboard;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    debug!("Loaded settings: {settings:?}");

    match cli.command {
        Commands::Live => {
            let mut dashboard = Dashboard::new(settings)?;
            dashboard.run().await?;
        }
        Commands::Run { no_history } => {
            SpeedCommandHandler::new(settings)
                .handle_run_command(no_history)
                .await?;
        }
        Commands::Download => {
            SpeedCommandHandler::new(settings)
                .handle_download_command()
                .await?;
        }
        Commands::Upload => {
            SpeedCommandHandler::new(settings)
                .handle_upload_command()
                .await?;
        }
        Commands::Info => {
            SpeedCommandHandler::new(settings)
                .handle_info_command()
                .await?;
        }
        Commands::History { limit } => {
            SpeedCommandHandler::new(settings)
                .handle_history_command(limit)
                .await?;
        }
    }

    Ok(())
}
