mod args;
mod commands;

use args::{Cli, Commands};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    wigo::logging::init(cli.verbose);

    match cli.command {
        Commands::Start { exec } => commands::daemon::cmd_start(exec).await?,
        Commands::Kill => commands::daemon::cmd_kill().await?,
        Commands::Status => commands::daemon::cmd_status().await?,
        Commands::Reload { exec } => commands::daemon::cmd_reload(exec).await?,
        Commands::Notification { command } => {
            commands::notification::cmd_notification(command).await?
        }
    }

    Ok(())
}
