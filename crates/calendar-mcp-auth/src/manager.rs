//! The token manager: the single source of a currently valid access token.
//!
//! # Renewal
//!
//! [`TokenManager::get_token`] returns the cached access token while it stays
//! valid for longer than the refresh margin. Otherwise it starts a renewal:
//!
//! - a record with a refresh token is refreshed at the token endpoint
//! - a rejected refresh token (`invalid_grant`) is discarded and the user is
//!   sent through the consent flow again
//! - a missing, corrupt or foreign record goes straight to the consent flow
//! - a transient refresh failure is returned to the caller as is
//!
//! Renewals are single flight. The first caller spawns the renewal on its own
//! task and every concurrent caller awaits the same shared future, so there is
//! at most one refresh or browser prompt in flight per manager and dropping a
//! waiting caller never cancels it.

use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt as _;
use futures_util::future::Shared;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::config::AuthConfig;
use crate::credentials::ClientDescriptor;
use crate::endpoint::{HttpTokenEndpoint, TokenEndpoint};
use crate::error::{AuthError, AuthErrorCode, AuthResult};
use crate::listener::{Authorizer, BrowserLauncher, LoopbackAuthorizer, SystemBrowser};
use crate::store::CredentialStore;
use crate::tokens::TokenRecord;

type Renewal = Shared<BoxFuture<'static, AuthResult<TokenRecord>>>;

/// Hands out valid access tokens, refreshing or re-authorizing as needed.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: AuthConfig,
    store: CredentialStore,
    endpoint: Arc<dyn TokenEndpoint>,
    authorizer: Arc<dyn Authorizer>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    client: Option<ClientDescriptor>,
    record: Option<TokenRecord>,
    loaded: bool,
    renewal: Option<Renewal>,
}

/// Which path a renewal takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenewalKind {
    /// Refresh the stored record, falling back to consent on `invalid_grant`.
    Refresh,
    /// Run the consent flow unconditionally.
    Authorize,
}

impl TokenManager {
    /// Creates a manager talking to the real token endpoint and browser.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        let endpoint: Arc<dyn TokenEndpoint> =
            Arc::new(HttpTokenEndpoint::new(config.http_timeout, &config.user_agent)?);
        Self::with_browser(config, endpoint, Arc::new(SystemBrowser))
    }

    /// Creates a manager using the loopback consent flow with the given
    /// endpoint and browser launcher.
    pub fn with_browser(
        config: AuthConfig,
        endpoint: Arc<dyn TokenEndpoint>,
        browser: Arc<dyn BrowserLauncher>,
    ) -> AuthResult<Self> {
        let authorizer = Arc::new(LoopbackAuthorizer::new(
            endpoint.clone(),
            browser,
            config.loopback_port,
            config.callback_timeout,
        ));
        Self::with_parts(config, endpoint, authorizer)
    }

    /// Creates a manager from explicit parts.
    pub fn with_parts(
        config: AuthConfig,
        endpoint: Arc<dyn TokenEndpoint>,
        authorizer: Arc<dyn Authorizer>,
    ) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::new(AuthErrorCode::ConfigMalformed, e))?;
        let store = CredentialStore::new(&config.credentials_path, &config.token_path);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                endpoint,
                authorizer,
                state: Mutex::new(State::default()),
            }),
        })
    }

    /// Returns the credential store backing this manager.
    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Returns the manager configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Returns a valid access token.
    ///
    /// No network call is made while the cached token is fresh.
    pub async fn get_token(&self) -> AuthResult<String> {
        let renewal = {
            let mut state = self.inner.state.lock().await;
            let client = self.inner.ensure_loaded(&mut state)?;

            if let Some(record) = state.record.as_ref()
                && self.inner.is_usable(record)
            {
                return Ok(record.access_token.clone());
            }

            self.inner.join_renewal(&mut state, client, RenewalKind::Refresh)
        };

        renewal.await.map(|record| record.access_token)
    }

    /// Runs the consent flow and stores the new record.
    ///
    /// Without `force` a usable record is returned unchanged. An in-flight
    /// renewal is joined instead of starting a second browser prompt.
    pub async fn authorize(&self, force: bool) -> AuthResult<TokenRecord> {
        let renewal = {
            let mut state = self.inner.state.lock().await;
            let client = self.inner.ensure_loaded(&mut state)?;

            if !force
                && let Some(record) = state.record.as_ref()
                && self.inner.is_usable(record)
            {
                return Ok(record.clone());
            }

            self.inner.join_renewal(&mut state, client, RenewalKind::Authorize)
        };

        renewal.await
    }

    /// Returns the current record, loading it from disk if needed.
    ///
    /// Never touches the network.
    pub async fn current_record(&self) -> AuthResult<Option<TokenRecord>> {
        let mut state = self.inner.state.lock().await;
        self.inner.ensure_loaded(&mut state)?;
        Ok(state.record.clone())
    }

    /// Forgets the cached record so the next call reloads it from disk.
    pub async fn invalidate(&self) {
        let mut state = self.inner.state.lock().await;
        state.record = None;
        state.loaded = false;
        debug!("token cache invalidated");
    }
}

impl Inner {
    /// Loads the client descriptor and the token record on first use.
    ///
    /// Returns the client descriptor.
    fn ensure_loaded(&self, state: &mut State) -> AuthResult<ClientDescriptor> {
        let client = match &state.client {
            Some(client) => client.clone(),
            None => {
                let client = self.store.load_client_descriptor()?;
                state.client = Some(client.clone());
                client
            }
        };

        if !state.loaded {
            state.record = self.load_record(&client);
            state.loaded = true;
        }
        Ok(client)
    }

    /// Loads the stored record, treating unusable ones as absent.
    ///
    /// An unusable file stays on disk until a new record replaces it.
    fn load_record(&self, client: &ClientDescriptor) -> Option<TokenRecord> {
        match self.store.load_token_record() {
            Ok(Some(record)) if !record.belongs_to(client) => {
                warn!(
                    path = %self.store.token_path().display(),
                    stored_client_id = %record.client_id,
                    client_id = %client.client_id,
                    "token record belongs to another OAuth client, re-authorization required"
                );
                None
            }
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable token record, re-authorization required");
                None
            }
        }
    }

    /// True if the record covers the configured scopes and is not about to
    /// expire.
    fn is_usable(&self, record: &TokenRecord) -> bool {
        record.has_scopes(&self.config.scopes)
            && record.is_fresh(self.config.refresh_margin, Utc::now())
    }

    /// Returns the in-flight renewal, starting one if none is running.
    fn join_renewal(
        self: &Arc<Self>,
        state: &mut State,
        client: ClientDescriptor,
        kind: RenewalKind,
    ) -> Renewal {
        if let Some(renewal) = &state.renewal {
            debug!("joining in-flight token renewal");
            return renewal.clone();
        }

        let inner = Arc::clone(self);
        let prior = state.record.clone();
        let handle = tokio::spawn(async move { inner.run_renewal(client, prior, kind).await });

        let renewal: BoxFuture<'static, AuthResult<TokenRecord>> = Box::pin(async move {
            handle
                .await
                .unwrap_or_else(|e| Err(AuthError::internal(format!("token renewal task failed: {}", e))))
        });
        let renewal = renewal.shared();
        state.renewal = Some(renewal.clone());
        renewal
    }

    /// Body of the renewal task. Publishes the outcome to the shared state
    /// before completing, whether or not anyone is still waiting.
    ///
    /// The refresh or consent flow runs on a worker task so that a panic in it
    /// is reported as an error and the in-flight slot is still cleared.
    async fn run_renewal(
        self: Arc<Self>,
        client: ClientDescriptor,
        prior: Option<TokenRecord>,
        kind: RenewalKind,
    ) -> AuthResult<TokenRecord> {
        let worker = {
            let inner = Arc::clone(&self);
            let mut record = prior.clone();
            tokio::spawn(async move {
                let result = inner.renew(&client, &mut record, kind).await;
                (result, record)
            })
        };

        let (result, record) = match worker.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "token renewal task failed");
                let err = AuthError::internal(format!("token renewal task failed: {}", e));
                (Err(err), prior)
            }
        };

        let mut state = self.state.lock().await;
        state.renewal = None;
        state.record = match &result {
            Ok(renewed) => Some(renewed.clone()),
            Err(_) => record,
        };
        result
    }

    /// Refreshes or re-authorizes. On `invalid_grant` the record is cleared.
    async fn renew(
        &self,
        client: &ClientDescriptor,
        record: &mut Option<TokenRecord>,
        kind: RenewalKind,
    ) -> AuthResult<TokenRecord> {
        if kind == RenewalKind::Refresh
            && let Some(current) = record.as_ref()
            && current.is_refreshable()
            && current.has_scopes(&self.config.scopes)
        {
            match self.refresh(client, current).await {
                Ok(refreshed) => return Ok(refreshed),
                Err(e) if e.code() == AuthErrorCode::InvalidGrant => {
                    warn!(error = %e, "refresh token no longer valid, starting re-authorization");
                    *record = None;
                }
                Err(e) => return Err(e),
            }
        } else if let Some(current) = record.as_ref() {
            if !current.has_scopes(&self.config.scopes) {
                info!("configured scopes changed, re-authorization required");
            } else if !current.is_refreshable() {
                info!("token record has no refresh token, re-authorization required");
            }
        }

        let renewed = self
            .authorizer
            .authorize(client, &self.config.scopes)
            .await?;
        self.store.save_token_record(&renewed)?;
        info!("authorization complete, token record stored");
        Ok(renewed)
    }

    async fn refresh(
        &self,
        client: &ClientDescriptor,
        current: &TokenRecord,
    ) -> AuthResult<TokenRecord> {
        let Some(refresh_token) = current.refresh_token.as_deref() else {
            return Err(AuthError::internal("refresh requested without refresh token"));
        };
        debug!("refreshing access token");

        let response = self
            .endpoint
            .refresh(&current.token_uri, client, refresh_token)
            .await?;
        let refreshed = current
            .refreshed(response, Utc::now())
            .map_err(|e| AuthError::refresh_failed(format!("invalid token response: {}", e)))?;
        self.store.save_token_record(&refreshed)?;
        Ok(refreshed)
    }
}
