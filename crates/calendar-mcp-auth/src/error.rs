//! Error types for the OAuth token lifecycle.
//!
//! Every failure carries an [`AuthErrorCode`] that callers match on, a
//! human-readable message, and a remediation hint. Messages are built from
//! paths, status codes and OAuth error identifiers only; token and secret
//! values never end up in an error.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// The category of an authentication error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// The client descriptor file does not exist.
    ConfigMissing,
    /// The client descriptor file exists but lacks required fields.
    ConfigMalformed,
    /// The token record file exists but cannot be read or parsed.
    TokenCorrupt,
    /// The user declined consent in the browser.
    AuthorizationDenied,
    /// No redirect callback arrived before the deadline.
    AuthorizationTimeout,
    /// The redirect carried a state nonce that does not match the session.
    StateMismatch,
    /// Transient network or server failure while refreshing.
    TokenRefreshFailed,
    /// The authorization code could not be exchanged for tokens.
    TokenExchangeFailed,
    /// The refresh token was revoked or has expired.
    InvalidGrant,
    /// Filesystem failure while persisting credentials.
    Io,
    /// The loopback listener could not be bound or served.
    Listener,
    /// Unexpected internal state.
    Internal,
}

impl AuthErrorCode {
    /// Returns true if retrying the same operation later may succeed without
    /// any change made by the operator.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TokenRefreshFailed | Self::TokenExchangeFailed | Self::AuthorizationTimeout
        )
    }

    /// Returns a stable identifier for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "config_missing",
            Self::ConfigMalformed => "config_malformed",
            Self::TokenCorrupt => "token_corrupt",
            Self::AuthorizationDenied => "authorization_denied",
            Self::AuthorizationTimeout => "authorization_timeout",
            Self::StateMismatch => "state_mismatch",
            Self::TokenRefreshFailed => "token_refresh_failed",
            Self::TokenExchangeFailed => "token_exchange_failed",
            Self::InvalidGrant => "invalid_grant",
            Self::Io => "io_error",
            Self::Listener => "listener_error",
            Self::Internal => "internal_error",
        }
    }

    /// Returns what the operator should do about this error.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::ConfigMissing => {
                "download the OAuth client JSON (Desktop app) from \
                 https://console.cloud.google.com/apis/credentials and save it at the credentials path"
            }
            Self::ConfigMalformed => {
                "re-download the OAuth client JSON; it must contain client_id and client_secret"
            }
            Self::TokenCorrupt => "re-run authorization to replace the token file",
            Self::AuthorizationDenied => {
                "re-run authorization and grant access; in testing mode make sure your account \
                 is listed as a test user on the OAuth consent screen"
            }
            Self::AuthorizationTimeout => {
                "re-run authorization and complete the consent page before the timeout"
            }
            Self::StateMismatch => {
                "re-run authorization from a fresh browser tab; do not reuse old consent links"
            }
            Self::TokenRefreshFailed | Self::TokenExchangeFailed => {
                "check network connectivity and retry"
            }
            Self::InvalidGrant => {
                "re-run authorization; refresh tokens of apps in testing mode expire after 7 days"
            }
            Self::Io => "check that the credential directory exists and is writable (chmod 700)",
            Self::Listener => "free the loopback port or choose another one with --port",
            Self::Internal => "retry; report a bug if it persists",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by the credential store, the loopback listener or the
/// token manager.
///
/// The error is `Clone` so that a single renewal result can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub struct AuthError {
    code: AuthErrorCode,
    message: String,
}

impl AuthError {
    /// Creates a new error with the given code and message.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_missing(path: &Path) -> Self {
        Self::new(
            AuthErrorCode::ConfigMissing,
            format!("OAuth client file not found at {}", path.display()),
        )
    }

    pub fn config_malformed(path: &Path, reason: impl fmt::Display) -> Self {
        Self::new(
            AuthErrorCode::ConfigMalformed,
            format!("invalid OAuth client file {}: {}", path.display(), reason),
        )
    }

    pub fn token_corrupt(path: &Path, reason: impl fmt::Display) -> Self {
        Self::new(
            AuthErrorCode::TokenCorrupt,
            format!("unreadable token file {}: {}", path.display(), reason),
        )
    }

    pub fn authorization_denied(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::AuthorizationDenied, message)
    }

    pub fn authorization_timeout(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::AuthorizationTimeout, message)
    }

    pub fn state_mismatch() -> Self {
        Self::new(
            AuthErrorCode::StateMismatch,
            "OAuth state mismatch on redirect callback, flow aborted",
        )
    }

    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::TokenRefreshFailed, message)
    }

    pub fn exchange_failed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::TokenExchangeFailed, message)
    }

    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::InvalidGrant, message)
    }

    /// Creates an I/O error for an operation on `path`.
    pub fn io(action: &str, path: &Path, err: &std::io::Error) -> Self {
        Self::new(
            AuthErrorCode::Io,
            format!("failed to {} {}: {}", action, path.display(), err),
        )
    }

    pub fn listener(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Listener, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Internal, message)
    }

    /// Returns the error code.
    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the remediation hint for this error.
    pub fn remediation(&self) -> &'static str {
        self.code.remediation()
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for token lifecycle operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn error_code_retryable() {
        assert!(AuthErrorCode::TokenRefreshFailed.is_retryable());
        assert!(AuthErrorCode::AuthorizationTimeout.is_retryable());
        assert!(!AuthErrorCode::StateMismatch.is_retryable());
        assert!(!AuthErrorCode::AuthorizationDenied.is_retryable());
        assert!(!AuthErrorCode::ConfigMissing.is_retryable());
    }

    #[test]
    fn error_code_display() {
        assert_eq!(AuthErrorCode::InvalidGrant.as_str(), "invalid_grant");
        assert_eq!(AuthErrorCode::StateMismatch.to_string(), "state_mismatch");
    }

    #[test]
    fn config_missing_names_path() {
        let path = PathBuf::from("/tmp/creds/credentials.json");
        let err = AuthError::config_missing(&path);
        assert_eq!(err.code(), AuthErrorCode::ConfigMissing);
        assert!(err.to_string().contains("/tmp/creds/credentials.json"));
        assert!(err.to_string().starts_with("config_missing: "));
    }

    #[test]
    fn remediation_mentions_test_mode() {
        let err = AuthError::invalid_grant("refresh token revoked");
        assert!(err.remediation().contains("7 days"));
    }

    #[test]
    fn errors_are_cloneable_and_comparable() {
        let err = AuthError::refresh_failed("connection reset");
        let copy = err.clone();
        assert_eq!(err, copy);
        assert!(copy.is_retryable());
    }
}
