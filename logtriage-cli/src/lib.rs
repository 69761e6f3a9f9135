//! logtriage command-line interface
//!
//! The binary in `main.rs` only parses arguments, loads configuration and
//! dispatches; everything else lives here so it can be tested.

pub mod cli;
pub mod commands;
pub mod context;
pub mod error;
pub mod logging;
pub mod output;

use cli::{Cli, Commands, ConfigAction, ConfigArgs};
use error::CliError;
use output::OutputWriter;

/// Run one parsed command line.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let validating = matches!(
        cli.command,
        Commands::Config(ConfigArgs {
            action: ConfigAction::Validate
        })
    );
    // `config validate` reports a broken file itself instead of failing here
    let config = match context::load_config(&cli.config, cli.log_level.as_deref()).await {
        Ok(config) => config,
        Err(_) if validating => logtriage_core::TriageConfig::default(),
        Err(e) => return Err(e),
    };

    // the format is already validated, so this only fails when a subscriber is installed
    if let Err(e) = logging::init_tracing(&config.general) {
        tracing::debug!(error = %e, "tracing already initialised");
    }
    tracing::debug!(config = %cli.config.display(), "logtriage starting");

    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Decode(args) => commands::decode::execute(args, &config, &writer).await,
        Commands::Encrypt(args) => commands::decode::execute_encrypt(args, &writer).await,
        Commands::Rules(args) => commands::rules::execute(args, &config, &writer).await,
        Commands::Analyze(args) => commands::analyze::execute(args, &config, &writer).await,
        Commands::Tasks(args) => commands::tasks::execute(args, &config, &writer).await,
        Commands::Recover => commands::tasks::execute_recover(&config, &writer).await,
        Commands::Config(args) => {
            commands::config::execute(args, &cli.config, &config, &writer).await
        }
    }
}
