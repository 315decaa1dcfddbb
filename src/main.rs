//! toolauth - per-provider OAuth sessions for remote tool servers
//!
#![doc = "toolauth command-line interface"]
#![doc = "Main entry point for the toolauth binary."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use toolauth::cli::{Cli, Commands};
use toolauth::commands;
use toolauth::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Load and validate configuration
    let config_path = cli.config.as_deref().unwrap_or("toolauth.yaml");
    let config = Config::load(config_path, &cli)?;

    match &cli.command {
        Commands::Authorize {
            provider,
            return_url,
        } => {
            tracing::info!("Starting authorization for provider: {}", provider);
            commands::auth::run_authorize(&config, provider, return_url.as_deref()).await
        }
        Commands::Status { provider } => {
            commands::auth::run_status(&config, provider.as_deref()).await
        }
        Commands::Tools => commands::tools::run_tools(&config).await,
        Commands::Call { tool, args } => {
            tracing::debug!("Calling tool: {}", tool);
            commands::tools::run_call(&config, tool, args).await
        }
        Commands::Disconnect { provider } => {
            commands::auth::run_disconnect(&config, provider).await
        }
        Commands::Logout => commands::auth::run_logout(&config),
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins when set; otherwise `toolauth=info`, or `toolauth=debug`
/// with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "toolauth=debug" } else { "toolauth=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
