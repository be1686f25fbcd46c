//! Token endpoint client.
//!
//! [`TokenEndpoint`] is the seam between the token lifecycle and the network:
//! [`HttpTokenEndpoint`] talks to the provider, tests substitute an in-memory
//! fake.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::credentials::ClientDescriptor;
use crate::error::{AuthError, AuthResult};

/// Successful response from the token endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space separated list of granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// OAuth error body (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorResponse {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{} ({})", self.error, description),
            None => self.error.clone(),
        }
    }
}

/// Operations against the provider's token endpoint.
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges an authorization code for tokens.
    fn exchange_code<'a>(
        &'a self,
        client: &'a ClientDescriptor,
        code: &'a str,
        code_verifier: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>>;

    /// Mints a new access token from a refresh token.
    ///
    /// Fails with `InvalidGrant` when the provider rejects the refresh token
    /// and with `TokenRefreshFailed` on any other failure.
    fn refresh<'a>(
        &'a self,
        token_uri: &'a str,
        client: &'a ClientDescriptor,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>>;
}

/// Which grant a request belongs to; decides how failures are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn failure(self, message: String) -> AuthError {
        match self {
            Self::AuthorizationCode => AuthError::exchange_failed(message),
            Self::RefreshToken => AuthError::refresh_failed(message),
        }
    }
}

/// [`TokenEndpoint`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    http_client: reqwest::Client,
}

impl HttpTokenEndpoint {
    /// Creates an endpoint client with the given request timeout.
    pub fn new(timeout: Duration, user_agent: &str) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| AuthError::internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    async fn post_form(
        &self,
        grant: Grant,
        token_uri: &str,
        params: &[(&str, &str)],
    ) -> AuthResult<TokenResponse> {
        let response = self
            .http_client
            .post(token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| grant.failure(format!("token request failed: {}", e.without_url())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| grant.failure(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            let oauth_error = serde_json::from_str::<ErrorResponse>(&body).ok();
            if grant == Grant::RefreshToken
                && oauth_error.as_ref().is_some_and(|e| e.error == "invalid_grant")
            {
                warn!(status = %status, "refresh token rejected by provider");
                return Err(AuthError::invalid_grant(format!(
                    "refresh token rejected: {}",
                    oauth_error.map(|e| e.describe()).unwrap_or_default()
                )));
            }

            let detail = oauth_error
                .map(|e| e.describe())
                .unwrap_or_else(|| "no OAuth error in response body".to_string());
            debug!(status = %status, "token endpoint returned an error");
            return Err(grant.failure(format!("token endpoint returned {}: {}", status, detail)));
        }

        serde_json::from_str(&body)
            .map_err(|e| grant.failure(format!("invalid token response: {}", e)))
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn exchange_code<'a>(
        &'a self,
        client: &'a ClientDescriptor,
        code: &'a str,
        code_verifier: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>> {
        Box::pin(async move {
            let params = [
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("code", code),
                ("code_verifier", code_verifier),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ];
            let response = self
                .post_form(Grant::AuthorizationCode, &client.token_uri, &params)
                .await?;
            info!("exchanged authorization code for tokens");
            Ok(response)
        })
    }

    fn refresh<'a>(
        &'a self,
        token_uri: &'a str,
        client: &'a ClientDescriptor,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>> {
        Box::pin(async move {
            let params = [
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ];
            let response = self
                .post_form(Grant::RefreshToken, token_uri, &params)
                .await?;
            info!("refreshed access token");
            Ok(response)
        })
    }
}
