//! CLI error types.

use std::fmt;

use calendar_mcp_auth::{AuthError, TracingError};

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub enum CliError {
    /// Configuration file or flag error.
    Config(String),
    /// Token lifecycle failure.
    Auth(AuthError),
    /// Logging could not be initialized.
    Tracing(TracingError),
}

impl CliError {
    /// Hint printed after the error message, if any.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Auth(err) => Some(err.remediation()),
            _ => None,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Auth(err) => write!(f, "{}", err),
            Self::Tracing(err) => write!(f, "logging setup failed: {}", err),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            Self::Tracing(err) => Some(err),
            Self::Config(_) => None,
        }
    }
}

impl From<AuthError> for CliError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<TracingError> for CliError {
    fn from(err: TracingError) -> Self {
        Self::Tracing(err)
    }
}
