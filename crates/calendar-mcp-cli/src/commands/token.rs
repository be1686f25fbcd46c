//! `token`: print a valid access token.

use calendar_mcp_auth::TokenManager;

use crate::error::CliResult;

/// Prints a valid access token on stdout, refreshing or authorizing first if
/// needed. Nothing else is written to stdout.
pub async fn run(manager: &TokenManager) -> CliResult<()> {
    let token = manager.get_token().await?;
    println!("{}", token);
    Ok(())
}
