//! Interactive authorization through a loopback redirect.
//!
//! # Flow
//!
//! 1. Bind a loopback port and derive the redirect URI from it
//! 2. Generate a state nonce and a PKCE verifier/challenge pair
//! 3. Open the consent page with `access_type=offline` and `prompt=consent`
//!    so a refresh token is issued even on re-authorization
//! 4. Accept exactly one callback on the redirect path and check its state
//! 5. Release the listener, then exchange the code for tokens
//!
//! The listener is an owned value of [`LoopbackAuthorizer::authorize`], so it
//! is closed on every exit path: success, error, timeout or cancellation.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::BoxFuture;
use crate::credentials::ClientDescriptor;
use crate::endpoint::TokenEndpoint;
use crate::error::{AuthError, AuthResult};
use crate::tokens::TokenRecord;

/// PKCE code verifier length in bytes, before base64 encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

/// State nonce length in bytes, before base64 encoding.
const STATE_LENGTH: usize = 16;

/// Upper bound on the size of a callback request head.
const MAX_REQUEST_BYTES: usize = 8192;

/// How long a connected browser gets to send its request line.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

const SUCCESS_HTML: &str = "<html><body><h1>Authorization Successful</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";
const FAILURE_HTML: &str = "<html><body><h1>Authorization Failed</h1>\
    <p>You can close this window.</p></body></html>";
const NOT_FOUND_HTML: &str = "<html><body><h1>Not Found</h1></body></html>";

/// Opens URLs in the user's browser.
pub trait BrowserLauncher: Send + Sync {
    /// Opens `url`. An error makes the caller print the URL instead.
    fn open(&self, url: &str) -> Result<(), String>;
}

/// Launches the system default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        open::that(url).map_err(|e| e.to_string())
    }
}

/// Produces a fresh token record through user interaction.
pub trait Authorizer: Send + Sync {
    /// Runs a full consent flow for `scopes`.
    fn authorize<'a>(
        &'a self,
        client: &'a ClientDescriptor,
        scopes: &'a [String],
    ) -> BoxFuture<'a, AuthResult<TokenRecord>>;
}

/// State of one interactive consent flow.
#[derive(Debug)]
pub struct AuthorizationSession {
    /// Random state for CSRF protection.
    pub state: String,
    /// The PKCE code verifier.
    pub verifier: String,
    /// The PKCE code challenge (SHA-256 of the verifier, base64url encoded).
    pub challenge: String,
    /// Redirect URI registered with the consent request.
    pub redirect_uri: Url,
    /// When the flow gives up waiting for the callback.
    pub deadline: Instant,
}

impl AuthorizationSession {
    /// Starts a session with fresh random state and verifier.
    pub fn new(redirect_uri: Url, timeout: Duration) -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = compute_challenge(&verifier);
        Self {
            state: random_token(STATE_LENGTH),
            verifier,
            challenge,
            redirect_uri,
            deadline: Instant::now() + timeout,
        }
    }

    /// Path the provider redirects the browser to.
    pub fn expected_path(&self) -> &str {
        self.redirect_uri.path()
    }

    /// Builds the provider consent URL.
    pub fn consent_url(&self, client: &ClientDescriptor, scopes: &[String]) -> AuthResult<Url> {
        let mut url = Url::parse(&client.auth_uri)
            .map_err(|e| AuthError::internal(format!("invalid auth_uri: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &client.client_id)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", &self.state)
            .append_pair("code_challenge", &self.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Query parameters carried by the redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackPayload {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackPayload {
    /// Parses the query string of a request target.
    fn from_url(url: &Url) -> Self {
        let mut payload = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => payload.code = Some(value.into_owned()),
                "state" => payload.state = Some(value.into_owned()),
                "error" => payload.error = Some(value.into_owned()),
                "error_description" => payload.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        payload
    }

    /// Checks the state nonce, then returns the authorization code.
    ///
    /// The state is checked first so that a forged error redirect cannot be
    /// told apart from any other forged callback.
    pub fn into_code(self, expected_state: &str) -> AuthResult<String> {
        let state_matches = self
            .state
            .as_deref()
            .is_some_and(|state| constant_time_eq(state.as_bytes(), expected_state.as_bytes()));
        if !state_matches {
            return Err(AuthError::state_mismatch());
        }

        if let Some(error) = self.error {
            let message = match self.error_description {
                Some(description) => format!("authorization denied: {} ({})", error, description),
                None => format!("authorization denied: {}", error),
            };
            return Err(AuthError::authorization_denied(message));
        }

        self.code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::authorization_denied("callback carried no authorization code"))
    }

    fn is_success(&self) -> bool {
        self.error.is_none() && self.code.is_some()
    }
}

/// Loopback listener bound on IPv4 and, when available, IPv6 on one port.
#[derive(Debug)]
struct CallbackListener {
    port: u16,
    v4: Option<TcpListener>,
    v6: Option<TcpListener>,
}

impl CallbackListener {
    /// Binds `preferred_port`, falling back to an ephemeral port when taken.
    async fn bind(preferred_port: u16) -> AuthResult<Self> {
        match Self::bind_on(preferred_port).await {
            Ok(listener) => Ok(listener),
            Err(preferred_err) if preferred_port != 0 => {
                warn!(
                    port = preferred_port,
                    error = %preferred_err,
                    "loopback port unavailable, using an ephemeral port"
                );
                Self::bind_on(0).await.map_err(|fallback_err| {
                    AuthError::listener(format!(
                        "failed to bind loopback port {}: {}; ephemeral fallback: {}",
                        preferred_port, preferred_err, fallback_err
                    ))
                })
            }
            Err(e) => Err(AuthError::listener(format!(
                "failed to bind loopback listener: {}",
                e
            ))),
        }
    }

    async fn bind_on(port: u16) -> std::io::Result<Self> {
        let v4 = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = v4.local_addr()?.port();
        // Browsers may resolve `localhost` to ::1 first.
        let v6 = match TcpListener::bind(("::1", port)).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                debug!(port, error = %e, "IPv6 loopback unavailable");
                None
            }
        };
        debug!(port, ipv6 = v6.is_some(), "bound loopback listener");
        Ok(Self {
            port,
            v4: Some(v4),
            v6,
        })
    }

    fn port(&self) -> u16 {
        self.port
    }

    async fn accept(&mut self) -> std::io::Result<TcpStream> {
        let (stream, _) = match (self.v4.as_mut(), self.v6.as_mut()) {
            (Some(v4), Some(v6)) => {
                tokio::select! {
                    result = v4.accept() => result?,
                    result = v6.accept() => result?,
                }
            }
            (Some(v4), None) => v4.accept().await?,
            (None, Some(v6)) => v6.accept().await?,
            (None, None) => {
                return Err(std::io::Error::other("loopback listener is closed"));
            }
        };
        Ok(stream)
    }

    /// Waits for the one callback request on the session's redirect path.
    ///
    /// Requests for any other path (a browser fetching `/favicon.ico`) are
    /// answered with 404 and do not count as the callback. The session
    /// deadline bounds reading and answering each connection as well as
    /// accepting it.
    async fn wait_for_callback(
        &mut self,
        session: &AuthorizationSession,
    ) -> AuthResult<CallbackPayload> {
        let timed_out =
            || AuthError::authorization_timeout("no OAuth callback before the deadline");

        loop {
            let stream = tokio::time::timeout_at(session.deadline, self.accept())
                .await
                .map_err(|_| timed_out())?;

            let mut stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "failed to accept callback connection");
                    continue;
                }
            };

            let handled =
                tokio::time::timeout_at(session.deadline, handle_connection(&mut stream, session))
                    .await
                    .map_err(|_| timed_out())?;
            if let Some(payload) = handled {
                return Ok(payload);
            }
        }
    }
}

/// Reads one request and answers it. Returns the payload if the request hit
/// the redirect path.
async fn handle_connection(
    stream: &mut TcpStream,
    session: &AuthorizationSession,
) -> Option<CallbackPayload> {
    let target = match read_request_target(stream).await {
        Ok(target) => target,
        Err(e) => {
            debug!(error = %e, "ignoring malformed request on loopback listener");
            respond(stream, "400 Bad Request", FAILURE_HTML).await;
            return None;
        }
    };

    let Ok(url) = session.redirect_uri.join(&target) else {
        respond(stream, "400 Bad Request", FAILURE_HTML).await;
        return None;
    };

    if url.path() != session.expected_path() {
        debug!(path = url.path(), "ignoring request outside the redirect path");
        respond(stream, "404 Not Found", NOT_FOUND_HTML).await;
        return None;
    }

    let payload = CallbackPayload::from_url(&url);
    if payload.is_success() {
        respond(stream, "200 OK", SUCCESS_HTML).await;
    } else {
        respond(stream, "400 Bad Request", FAILURE_HTML).await;
    }
    Some(payload)
}

/// Reads the request head and returns the request target of a GET.
///
/// The whole head is consumed so that closing the connection afterwards does
/// not reset it before the browser has read the response.
async fn read_request_target(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buffer.len() >= MAX_REQUEST_BYTES {
            return Err(std::io::Error::other("request head too long"));
        }
        let read = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut chunk))
            .await
            .map_err(|_| std::io::Error::other("timed out reading request"))??;
        if read == 0 {
            return Err(std::io::Error::other("connection closed before end of request"));
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let line_end = buffer
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(buffer.len());
    let line = String::from_utf8_lossy(&buffer[..line_end]);
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) if target.starts_with('/') => Ok(target.to_string()),
        _ => Err(std::io::Error::other("expected a GET request")),
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}

/// [`Authorizer`] that runs the consent flow through a loopback redirect.
pub struct LoopbackAuthorizer {
    endpoint: Arc<dyn TokenEndpoint>,
    browser: Arc<dyn BrowserLauncher>,
    port: u16,
    timeout: Duration,
}

impl LoopbackAuthorizer {
    /// Creates an authorizer listening on `port` (`0` for ephemeral).
    pub fn new(
        endpoint: Arc<dyn TokenEndpoint>,
        browser: Arc<dyn BrowserLauncher>,
        port: u16,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            browser,
            port,
            timeout,
        }
    }

    async fn run(&self, client: &ClientDescriptor, scopes: &[String]) -> AuthResult<TokenRecord> {
        let mut listener = CallbackListener::bind(self.port).await?;
        let redirect_uri = client
            .loopback_redirect(listener.port())
            .map_err(|e| AuthError::internal(format!("invalid loopback redirect: {}", e)))?;
        let session = AuthorizationSession::new(redirect_uri, self.timeout);
        let consent_url = session.consent_url(client, scopes)?;

        info!(port = listener.port(), "starting OAuth consent flow, opening browser");
        debug!(url = %consent_url, "consent URL");

        if let Err(e) = self.browser.open(consent_url.as_str()) {
            warn!(error = %e, "failed to open browser");
            eprintln!("\nPlease open this URL in your browser:\n\n{}\n", consent_url);
        }

        let payload = listener.wait_for_callback(&session).await;
        drop(listener);

        let code = payload?.into_code(&session.state)?;
        info!("received authorization code, exchanging for tokens");

        let response = self
            .endpoint
            .exchange_code(client, &code, &session.verifier, session.redirect_uri.as_str())
            .await?;

        let record = TokenRecord::from_grant(client, response, scopes, Utc::now())
            .map_err(|e| AuthError::exchange_failed(format!("invalid token response: {}", e)))?;
        if !record.is_refreshable() {
            warn!(
                "no refresh token issued; revoke access at https://myaccount.google.com/permissions \
                 and authorize again"
            );
        }
        Ok(record)
    }
}

impl Authorizer for LoopbackAuthorizer {
    fn authorize<'a>(
        &'a self,
        client: &'a ClientDescriptor,
        scopes: &'a [String],
    ) -> BoxFuture<'a, AuthResult<TokenRecord>> {
        Box::pin(self.run(client, scopes))
    }
}
