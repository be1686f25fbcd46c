//! Token manager configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the credential store, the loopback authorization flow
/// and the token manager.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Path to the OAuth client descriptor downloaded from the Cloud Console.
    ///
    /// Defaults to `~/secrets/google-oauth/credentials.json`.
    pub credentials_path: PathBuf,

    /// Path of the persisted token record.
    ///
    /// Defaults to `~/secrets/google-oauth/token.json`.
    pub token_path: PathBuf,

    /// Scopes requested on (re-)authorization.
    pub scopes: Vec<String>,

    /// Loopback port for the redirect listener. `0` picks an ephemeral port.
    pub loopback_port: u16,

    /// How long to wait for the browser redirect.
    pub callback_timeout: Duration,

    /// Access tokens expiring within this margin are refreshed early.
    pub refresh_margin: Duration,

    /// Timeout for token endpoint requests.
    pub http_timeout: Duration,

    /// User agent sent to the token endpoint.
    pub user_agent: String,
}

impl AuthConfig {
    /// Google Calendar read/write scope.
    pub const CALENDAR_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar";

    /// Gmail modify scope.
    pub const GMAIL_SCOPE: &'static str = "https://www.googleapis.com/auth/gmail.modify";

    pub const DEFAULT_LOOPBACK_PORT: u16 = 8080;
    pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 120;
    pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;
    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

    /// Creates a configuration with the default paths and scopes.
    pub fn new() -> Self {
        Self {
            credentials_path: Self::default_secrets_dir().join("credentials.json"),
            token_path: Self::default_secrets_dir().join("token.json"),
            scopes: vec![
                Self::CALENDAR_SCOPE.to_string(),
                Self::GMAIL_SCOPE.to_string(),
            ],
            loopback_port: Self::DEFAULT_LOOPBACK_PORT,
            callback_timeout: Duration::from_secs(Self::DEFAULT_CALLBACK_TIMEOUT_SECS),
            refresh_margin: Duration::from_secs(Self::DEFAULT_REFRESH_MARGIN_SECS),
            http_timeout: Duration::from_secs(Self::DEFAULT_HTTP_TIMEOUT_SECS),
            user_agent: format!("calendar-mcp/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Returns the default directory holding the client descriptor and token.
    pub fn default_secrets_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("secrets")
            .join("google-oauth")
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = path.into();
        self
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_loopback_port(mut self, port: u16) -> Self {
        self.loopback_port = port;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }
        if self.scopes.iter().any(|s| s.trim().is_empty()) {
            return Err("OAuth scopes must not be blank".to_string());
        }
        if self.callback_timeout.is_zero() {
            return Err("callback timeout must be greater than zero".to_string());
        }
        if self.credentials_path == self.token_path {
            return Err("credentials and token paths must differ".to_string());
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AuthConfig::new();
        assert_eq!(config.loopback_port, 8080);
        assert_eq!(config.callback_timeout, Duration::from_secs(120));
        assert_eq!(config.refresh_margin, Duration::from_secs(60));
        assert_eq!(
            config.scopes,
            vec![
                AuthConfig::CALENDAR_SCOPE.to_string(),
                AuthConfig::GMAIL_SCOPE.to_string()
            ]
        );
        assert!(config.token_path.ends_with("secrets/google-oauth/token.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_builder_methods() {
        let config = AuthConfig::new()
            .with_credentials_path("/tmp/c.json")
            .with_token_path("/tmp/t.json")
            .with_loopback_port(0)
            .with_callback_timeout(Duration::from_secs(5))
            .with_refresh_margin(Duration::from_secs(10))
            .with_scopes(vec!["scope1".to_string()]);

        assert_eq!(config.credentials_path, PathBuf::from("/tmp/c.json"));
        assert_eq!(config.token_path, PathBuf::from("/tmp/t.json"));
        assert_eq!(config.loopback_port, 0);
        assert_eq!(config.callback_timeout, Duration::from_secs(5));
        assert_eq!(config.refresh_margin, Duration::from_secs(10));
        assert_eq!(config.scopes, vec!["scope1".to_string()]);
    }

    #[test]
    fn config_validation() {
        assert!(AuthConfig::new().with_scopes(vec![]).validate().is_err());
        assert!(
            AuthConfig::new()
                .with_scopes(vec![" ".to_string()])
                .validate()
                .is_err()
        );
        assert!(
            AuthConfig::new()
                .with_callback_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            AuthConfig::new()
                .with_credentials_path("/tmp/same.json")
                .with_token_path("/tmp/same.json")
                .validate()
                .is_err()
        );
    }
}
