//! calendar-mcp-auth CLI entry point.

use std::process::ExitCode;

use calendar_mcp_auth::{TokenManager, TracingConfig, init_tracing};
use clap::Parser;
use tracing::warn;

use calendar_mcp_cli::cli::{Cli, Command};
use calendar_mcp_cli::commands;
use calendar_mcp_cli::config::CliConfig;
use calendar_mcp_cli::error::{CliError, CliResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config.with_format(cli.log_format)) {
        eprintln!("error: {}", CliError::from(e));
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if let Some(hint) = e.remediation() {
                eprintln!("hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let file_config = match &cli.config {
        Some(path) => CliConfig::load_from(path).map_err(CliError::Config)?,
        None => CliConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable configuration file");
            CliConfig::default()
        }),
    };

    let config = file_config.auth_config(&cli);
    config.validate().map_err(CliError::Config)?;

    match cli.command {
        Command::Authorize { force } => {
            let manager = TokenManager::new(config)?;
            commands::authorize::run(&manager, force).await
        }
        Command::Token => {
            let manager = TokenManager::new(config)?;
            commands::token::run(&manager).await
        }
        Command::Status => commands::status::run(&config),
        Command::Logout => commands::logout::run(&config),
    }
}
