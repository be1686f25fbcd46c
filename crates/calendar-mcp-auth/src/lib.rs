//! OAuth token lifecycle for the calendar MCP server.
//!
//! - [`CredentialStore`]: loads the OAuth client descriptor and persists the
//!   token record atomically with owner-only permissions
//! - [`LoopbackAuthorizer`]: runs the browser consent flow against a one-shot
//!   loopback redirect listener
//! - [`TokenManager`]: hands out valid access tokens, refreshing or
//!   re-authorizing with at most one renewal in flight

use std::future::Future;
use std::pin::Pin;

pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod listener;
pub mod manager;
pub mod store;
pub mod tokens;
pub mod tracing;

/// A boxed future, used at the async trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use config::AuthConfig;
pub use credentials::ClientDescriptor;
pub use endpoint::{HttpTokenEndpoint, TokenEndpoint, TokenResponse};
pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use listener::{
    AuthorizationSession, Authorizer, BrowserLauncher, CallbackPayload, LoopbackAuthorizer,
    SystemBrowser,
};
pub use manager::TokenManager;
pub use store::CredentialStore;
pub use tokens::TokenRecord;
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
