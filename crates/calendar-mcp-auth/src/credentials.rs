//! OAuth client descriptor.

use std::fmt;

use serde::Deserialize;
use url::Url;

/// Google's OAuth 2.0 authorization endpoint.
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's OAuth 2.0 token endpoint.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Redirect used when the descriptor lists no loopback entry.
const DEFAULT_LOOPBACK_REDIRECT: &str = "http://localhost";

/// Application identity issued by the OAuth provider.
///
/// Loaded once from the client file and never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientDescriptor {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
    /// Authorization (consent page) endpoint.
    pub auth_uri: String,
    /// Token endpoint used for code exchange and refresh.
    pub token_uri: String,
    /// Registered redirect URIs. Desktop clients carry a loopback entry.
    pub redirect_uris: Vec<String>,
}

/// Structure of the client JSON file.
///
/// Supports the Cloud Console layout with an `installed` or `web` section, and
/// a flat layout with the fields at the root.
#[derive(Debug, Deserialize)]
struct ClientFile {
    installed: Option<RawDescriptor>,
    web: Option<RawDescriptor>,
    #[serde(flatten)]
    root: RawDescriptor,
}

#[derive(Debug, Default, Deserialize)]
struct RawDescriptor {
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl ClientDescriptor {
    /// Creates a descriptor pointing at Google's endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            redirect_uris: vec![DEFAULT_LOOPBACK_REDIRECT.to_string()],
        }
    }

    pub fn with_auth_uri(mut self, uri: impl Into<String>) -> Self {
        self.auth_uri = uri.into();
        self
    }

    pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
        self.token_uri = uri.into();
        self
    }

    /// Parses and validates a client JSON document.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: ClientFile =
            serde_json::from_str(json).map_err(|e| format!("failed to parse JSON: {}", e))?;

        let raw = file.installed.or(file.web).unwrap_or(file.root);

        let (Some(client_id), Some(client_secret)) = (raw.client_id, raw.client_secret) else {
            return Err(
                "file must contain 'installed'/'web' section or 'client_id'/'client_secret' at root level"
                    .to_string(),
            );
        };

        let descriptor = Self {
            client_id,
            client_secret,
            auth_uri: raw.auth_uri.unwrap_or_else(|| GOOGLE_AUTH_URI.to_string()),
            token_uri: raw.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string()),
            redirect_uris: raw.redirect_uris,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Checks that the required fields are present and the endpoints are URLs.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is required".to_string());
        }
        if self.client_secret.trim().is_empty() {
            return Err("client_secret is required".to_string());
        }
        for (name, value) in [("auth_uri", &self.auth_uri), ("token_uri", &self.token_uri)] {
            let url = Url::parse(value).map_err(|e| format!("{} is not a valid URL: {}", name, e))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(format!("{} must be an http(s) URL", name));
            }
        }
        Ok(())
    }

    /// Builds the loopback redirect URI for the given listener port.
    ///
    /// Uses the first loopback entry of `redirect_uris` as the template and
    /// falls back to `http://localhost`.
    pub fn loopback_redirect(&self, port: u16) -> Result<Url, url::ParseError> {
        let template = self
            .redirect_uris
            .iter()
            .filter_map(|uri| Url::parse(uri).ok())
            .find(is_loopback);

        let mut redirect = match template {
            Some(template) => template,
            None => Url::parse(DEFAULT_LOOPBACK_REDIRECT)?,
        };
        redirect.set_query(None);
        redirect.set_fragment(None);
        // Loopback URLs always carry a host, so setting the port cannot fail.
        let _ = redirect.set_port(Some(port));
        Ok(redirect)
    }
}

fn is_loopback(url: &Url) -> bool {
    url.scheme() == "http"
        && matches!(
            url.host_str(),
            Some("localhost") | Some("127.0.0.1") | Some("[::1]")
        )
}

impl fmt::Debug for ClientDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientDescriptor")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .field("redirect_uris", &self.redirect_uris)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_from_json_installed() {
        let json = r#"{
            "installed": {
                "client_id": "test-id.apps.googleusercontent.com",
                "project_id": "my-project",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "test-secret",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let creds = ClientDescriptor::from_json(json).unwrap();
        assert_eq!(creds.client_id, "test-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "test-secret");
        assert_eq!(creds.token_uri, GOOGLE_TOKEN_URI);
        assert_eq!(creds.redirect_uris, vec!["http://localhost".to_string()]);
    }

    #[test]
    fn descriptor_from_json_web() {
        let json = r#"{
            "web": {
                "client_id": "web-id.apps.googleusercontent.com",
                "client_secret": "web-secret"
            }
        }"#;

        let creds = ClientDescriptor::from_json(json).unwrap();
        assert_eq!(creds.client_id, "web-id.apps.googleusercontent.com");
        assert_eq!(creds.auth_uri, GOOGLE_AUTH_URI);
        assert!(creds.redirect_uris.is_empty());
    }

    #[test]
    fn descriptor_from_json_flat() {
        let json = r#"{
            "client_id": "abc",
            "client_secret": "s3cret",
            "token_uri": "http://127.0.0.1:9999/token"
        }"#;

        let creds = ClientDescriptor::from_json(json).unwrap();
        assert_eq!(creds.client_id, "abc");
        assert_eq!(creds.token_uri, "http://127.0.0.1:9999/token");
    }

    #[test]
    fn descriptor_missing_fields() {
        let err = ClientDescriptor::from_json(r#"{ "other": {} }"#).unwrap_err();
        assert!(err.contains("client_id"));

        let err = ClientDescriptor::from_json(r#"{ "client_id": "abc" }"#).unwrap_err();
        assert!(err.contains("client_id"));

        let err =
            ClientDescriptor::from_json(r#"{ "client_id": "", "client_secret": "x" }"#).unwrap_err();
        assert_eq!(err, "client_id is required");
    }

    #[test]
    fn descriptor_bad_endpoint() {
        let json = r#"{ "client_id": "abc", "client_secret": "x", "token_uri": "not a url" }"#;
        let err = ClientDescriptor::from_json(json).unwrap_err();
        assert!(err.contains("token_uri"));
    }

    #[test]
    fn descriptor_not_json() {
        let err = ClientDescriptor::from_json("not json").unwrap_err();
        assert!(err.contains("parse"));
    }

    #[test]
    fn loopback_redirect_uses_port() {
        let creds = ClientDescriptor::new("abc", "secret");
        assert_eq!(creds.loopback_redirect(8080).unwrap().as_str(), "http://localhost:8080/");
    }

    #[test]
    fn loopback_redirect_skips_non_loopback_entries() {
        let mut creds = ClientDescriptor::new("abc", "secret");
        creds.redirect_uris = vec![
            "urn:ietf:wg:oauth:2.0:oob".to_string(),
            "https://example.com/cb".to_string(),
            "http://127.0.0.1/oauth2callback".to_string(),
        ];
        assert_eq!(
            creds.loopback_redirect(4242).unwrap().as_str(),
            "http://127.0.0.1:4242/oauth2callback"
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let creds = ClientDescriptor::new("abc", "very-secret-value");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("abc"));
        assert!(!debug.contains("very-secret-value"));
    }
}
