//! `authorize`: run the browser consent flow.

use calendar_mcp_auth::{TokenManager, TokenRecord};
use tracing::info;

use crate::error::CliResult;

/// Runs the consent flow unless a refreshable record covering the configured
/// scopes is already stored.
pub async fn run(manager: &TokenManager, force: bool) -> CliResult<()> {
    let token_path = manager.store().token_path().display().to_string();
    let current = manager.current_record().await?;

    if !needs_consent(current.as_ref(), &manager.config().scopes, force) {
        println!("Already authorized; token stored at {}.", token_path);
        println!("Use --force to re-authorize.");
        return Ok(());
    }

    println!("Starting Google authorization...");
    println!();
    println!("A browser window will open for you to grant access.");
    println!("If the browser doesn't open, copy the URL printed below.");
    println!();

    let record = manager.authorize(true).await?;
    info!("authorization successful");

    println!();
    println!("Authorization successful!");
    println!("Token saved to {}", token_path);
    println!();
    println!("Granted scopes:");
    for scope in &record.scopes {
        println!("  - {}", scope);
    }

    if !record.is_refreshable() {
        println!();
        println!("WARNING: Google did not issue a refresh token.");
        println!("Revoke the app's access at https://myaccount.google.com/permissions");
        println!("and run `calendar-mcp-auth authorize --force` again.");
    }

    println!();
    println!("Note: while the OAuth consent screen is in testing mode, Google expires");
    println!("refresh tokens after 7 days and you will need to authorize again.");
    Ok(())
}

/// Returns true unless `record` can be renewed without user interaction and
/// covers every configured scope.
fn needs_consent(record: Option<&TokenRecord>, scopes: &[String], force: bool) -> bool {
    force || !record.is_some_and(|r| r.is_refreshable() && r.has_scopes(scopes))
}
