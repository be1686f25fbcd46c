//! Command-line front end for the calendar MCP OAuth token lifecycle.
//!
//! This crate provides the `calendar-mcp-auth` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use error::{CliError, CliResult};
