//! Command-line interface definition.

use std::path::PathBuf;

use calendar_mcp_auth::TracingOutputFormat;
use clap::{Parser, Subcommand};

/// calendar-mcp-auth - manage the Google OAuth token used by the calendar MCP server
#[derive(Debug, Parser)]
#[command(name = "calendar-mcp-auth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALENDAR_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the OAuth client descriptor (credentials.json)
    #[arg(long, env = "CALENDAR_MCP_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Path to the token record (token.json)
    #[arg(long, env = "CALENDAR_MCP_TOKEN")]
    pub token: Option<PathBuf>,

    /// Loopback port for the OAuth redirect (0 picks a free port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Seconds to wait for the browser redirect
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format on stderr (compact or json)
    #[arg(long, default_value = "compact")]
    pub log_format: TracingOutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the browser consent flow and store the token
    Authorize {
        /// Re-authorize even if a usable token is stored
        #[arg(long, short)]
        force: bool,
    },

    /// Print a valid access token, refreshing it if needed
    Token,

    /// Show the stored token state without contacting Google
    Status,

    /// Delete the stored token
    Logout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "calendar-mcp-auth",
            "--credentials",
            "/tmp/creds.json",
            "--port",
            "0",
            "--log-format",
            "json",
            "authorize",
            "--force",
        ])
        .unwrap();

        assert_eq!(cli.credentials, Some(PathBuf::from("/tmp/creds.json")));
        assert_eq!(cli.port, Some(0));
        assert_eq!(cli.log_format, TracingOutputFormat::Json);
        assert!(matches!(cli.command, Command::Authorize { force: true }));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["calendar-mcp-auth"]).is_err());
    }

    #[test]
    fn rejects_unknown_log_format() {
        let result = Cli::try_parse_from(["calendar-mcp-auth", "--log-format", "xml", "status"]);
        assert!(result.is_err());
    }
}
