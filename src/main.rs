use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agquota_core::config::{Command, Config};
use agquota_core::Settings;

mod commands;
mod render;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate();

    match cli.command() {
        Command::Status { json } => commands::status(settings, json).await,
        Command::Watch { json } => commands::watch(settings, json).await,
        Command::Locate => commands::locate(settings).await,
    }
}

fn setup_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("agquota=debug,agquota_core=debug")
        } else {
            EnvFilter::new("agquota=info,agquota_core=info")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
