//! CLI configuration.
//!
//! Settings live in an optional `config.toml` at
//! `~/.config/calendar-mcp/config.toml`. Command-line flags and environment
//! variables override the file; anything unset falls back to the library
//! defaults.
//!
//! ```toml
//! [oauth]
//! credentials_path = "~/secrets/google-oauth/credentials.json"
//! token_path = "~/secrets/google-oauth/token.json"
//! scopes = ["https://www.googleapis.com/auth/calendar"]
//! port = 8080
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use calendar_mcp_auth::AuthConfig;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// OAuth settings.
    pub oauth: OAuthSettings,
}

/// The `[oauth]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub credentials_path: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
    /// Scopes requested on authorization. Empty means the default set.
    pub scopes: Vec<String>,
    pub port: Option<u16>,
    /// Seconds to wait for the browser redirect.
    pub callback_timeout: Option<u64>,
    /// Seconds before expiry at which a token is refreshed.
    pub refresh_margin: Option<u64>,
}

impl CliConfig {
    /// Loads configuration from the default path, if present.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calendar-mcp")
            .join("config.toml")
    }

    /// Builds the library configuration: flags, then file, then defaults.
    pub fn auth_config(&self, cli: &Cli) -> AuthConfig {
        let oauth = &self.oauth;
        let mut config = AuthConfig::new();

        if let Some(path) = cli.credentials.clone().or_else(|| oauth.credentials_path.clone()) {
            config = config.with_credentials_path(expand_home(&path));
        }
        if let Some(path) = cli.token.clone().or_else(|| oauth.token_path.clone()) {
            config = config.with_token_path(expand_home(&path));
        }
        if !oauth.scopes.is_empty() {
            config = config.with_scopes(oauth.scopes.clone());
        }
        if let Some(port) = cli.port.or(oauth.port) {
            config = config.with_loopback_port(port);
        }
        if let Some(secs) = cli.timeout.or(oauth.callback_timeout) {
            config = config.with_callback_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = oauth.refresh_margin {
            config = config.with_refresh_margin(Duration::from_secs(secs));
        }
        config
    }
}

/// Expands a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["calendar-mcp-auth"];
        argv.extend_from_slice(args);
        argv.push("status");
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn parse_oauth_table() {
        let config: CliConfig = toml::from_str(
            r#"
            [oauth]
            credentials_path = "/etc/calendar/credentials.json"
            scopes = ["https://www.googleapis.com/auth/calendar"]
            port = 9000
            callback_timeout = 30
            "#,
        )
        .unwrap();

        assert_eq!(
            config.oauth.credentials_path,
            Some(PathBuf::from("/etc/calendar/credentials.json"))
        );
        assert_eq!(config.oauth.port, Some(9000));
        assert!(config.oauth.token_path.is_none());
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.oauth, OAuthSettings::default());

        let auth = config.auth_config(&cli(&[]));
        let defaults = AuthConfig::new();
        assert_eq!(auth.credentials_path, defaults.credentials_path);
        assert_eq!(auth.scopes, defaults.scopes);
        assert_eq!(auth.loopback_port, AuthConfig::DEFAULT_LOOPBACK_PORT);
    }

    #[test]
    fn flags_override_file() {
        let config = CliConfig {
            oauth: OAuthSettings {
                credentials_path: Some(PathBuf::from("/file/credentials.json")),
                token_path: Some(PathBuf::from("/file/token.json")),
                port: Some(9000),
                callback_timeout: Some(30),
                refresh_margin: Some(300),
                ..Default::default()
            },
        };

        let auth = config.auth_config(&cli(&["--token", "/flag/token.json", "--port", "0"]));
        assert_eq!(auth.credentials_path, PathBuf::from("/file/credentials.json"));
        assert_eq!(auth.token_path, PathBuf::from("/flag/token.json"));
        assert_eq!(auth.loopback_port, 0);
        assert_eq!(auth.callback_timeout, Duration::from_secs(30));
        assert_eq!(auth.refresh_margin, Duration::from_secs(300));
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[oauth]\nport = 8181\n").unwrap();

        let config = CliConfig::load_from(&path).unwrap();
        assert_eq!(config.oauth.port, Some(8181));

        std::fs::write(&path, "[oauth]\nport = \"eighty\"\n").unwrap();
        assert!(CliConfig::load_from(&path).is_err());
        assert!(CliConfig::load_from(&tmp.path().join("missing.toml")).is_err());
    }

    #[test]
    fn tilde_is_expanded() {
        let expanded = expand_home(Path::new("~/secrets/token.json"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("secrets/token.json"));
        }
        assert_eq!(
            expand_home(Path::new("/abs/token.json")),
            PathBuf::from("/abs/token.json")
        );
    }
}
