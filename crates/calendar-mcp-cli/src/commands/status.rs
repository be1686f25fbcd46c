//! `status`: describe the stored token without contacting Google.

use std::fmt;
use std::path::PathBuf;

use calendar_mcp_auth::{AuthConfig, CredentialStore};
use chrono::{DateTime, Utc};

use crate::error::CliResult;

/// What the next `get_token()` call would do with the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    /// Served from the record as is.
    Valid,
    /// Refreshed without user interaction.
    NeedsRefresh,
    /// The browser consent flow runs.
    NeedsAuthorization(String),
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::NeedsRefresh => write!(f, "expired, will be refreshed on next use"),
            Self::NeedsAuthorization(reason) => {
                write!(f, "{}; run `calendar-mcp-auth authorize`", reason)
            }
        }
    }
}

/// Snapshot of the credential files. Holds no secret values.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    /// Client id of the descriptor, or the reason it could not be loaded.
    pub client: Result<String, String>,
    pub record_client_id: Option<String>,
    pub scopes: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
    pub state: TokenState,
}

impl StatusReport {
    /// Inspects the descriptor and token files.
    pub fn inspect(config: &AuthConfig, now: DateTime<Utc>) -> Self {
        let store = CredentialStore::new(&config.credentials_path, &config.token_path);
        let client = store
            .load_client_descriptor()
            .map(|c| c.client_id)
            .map_err(|e| e.to_string());

        let mut report = Self {
            credentials_path: config.credentials_path.clone(),
            token_path: config.token_path.clone(),
            client,
            record_client_id: None,
            scopes: Vec::new(),
            expiry: None,
            has_refresh_token: false,
            state: TokenState::NeedsAuthorization("no token stored".to_string()),
        };

        let record = match store.load_token_record() {
            Ok(Some(record)) => record,
            Ok(None) => return report,
            Err(e) => {
                report.state = TokenState::NeedsAuthorization(format!("token unreadable ({})", e));
                return report;
            }
        };

        report.record_client_id = Some(record.client_id.clone());
        report.scopes = record.scopes.iter().cloned().collect();
        report.expiry = record.expiry;
        report.has_refresh_token = record.is_refreshable();

        let missing: Vec<&str> = config
            .scopes
            .iter()
            .filter(|s| !record.scopes.contains(*s))
            .map(String::as_str)
            .collect();

        report.state = match &report.client {
            Ok(client_id) if *client_id != record.client_id => {
                TokenState::NeedsAuthorization("token was issued to another OAuth client".to_string())
            }
            _ if !missing.is_empty() => {
                TokenState::NeedsAuthorization(format!("missing scopes: {}", missing.join(" ")))
            }
            _ if record.is_fresh(config.refresh_margin, now) => TokenState::Valid,
            _ if record.is_refreshable() => TokenState::NeedsRefresh,
            _ => TokenState::NeedsAuthorization("expired without refresh token".to_string()),
        };
        report
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Credentials:   {}", self.credentials_path.display())?;
        match &self.client {
            Ok(client_id) => writeln!(f, "Client ID:     {}", client_id)?,
            Err(reason) => writeln!(f, "Client:        {}", reason)?,
        }
        writeln!(f, "Token:         {}", self.token_path.display())?;

        if let Some(client_id) = &self.record_client_id {
            writeln!(f, "Issued to:     {}", client_id)?;
            match self.expiry {
                Some(expiry) => writeln!(f, "Expires:       {}", expiry.to_rfc3339())?,
                None => writeln!(f, "Expires:       unknown")?,
            }
            writeln!(
                f,
                "Refresh token: {}",
                if self.has_refresh_token { "present" } else { "missing" }
            )?;
            writeln!(f, "Scopes:")?;
            for scope in &self.scopes {
                writeln!(f, "  - {}", scope)?;
            }
        }
        write!(f, "Status:        {}", self.state)
    }
}

pub fn run(config: &AuthConfig) -> CliResult<()> {
    println!("{}", StatusReport::inspect(config, Utc::now()));
    Ok(())
}
