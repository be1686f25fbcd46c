//! The persisted token record.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::credentials::ClientDescriptor;
use crate::endpoint::TokenResponse;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Persisted credential state.
///
/// The on-disk layout matches the `authorized_user` files written by Google's
/// client libraries, so a token file produced by other tooling can be reused.
/// The client id and secret are duplicated into the record so that a refresh
/// only needs this record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The current access token.
    #[serde(rename = "token")]
    pub access_token: String,

    /// The refresh token, absent if never granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token endpoint the refresh grant is sent to.
    pub token_uri: String,

    pub client_id: String,

    pub client_secret: String,

    /// The granted scopes.
    #[serde(default)]
    pub scopes: BTreeSet<String>,

    /// When the access token expires. A record without expiry is stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Builds a record from an initial grant (authorization code exchange).
    ///
    /// Scopes reported by the provider win over the requested ones. Fails when
    /// `expires_in` does not yield a representable expiry.
    pub fn from_grant(
        client: &ClientDescriptor,
        response: TokenResponse,
        requested_scopes: &[String],
        now: DateTime<Utc>,
    ) -> Result<Self, String> {
        let expiry = expiry_from(response.expires_in, now)?;
        let scopes = match response.scope.as_deref() {
            Some(granted) => parse_scopes(granted),
            None => requested_scopes.iter().cloned().collect(),
        };

        Ok(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_uri: client.token_uri.clone(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes,
            expiry: Some(expiry),
        })
    }

    /// Returns the record that results from a successful refresh grant.
    ///
    /// The refresh token is carried over unless the provider rotated it.
    pub fn refreshed(&self, response: TokenResponse, now: DateTime<Utc>) -> Result<Self, String> {
        let expiry = expiry_from(response.expires_in, now)?;
        Ok(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: response
                .scope
                .as_deref()
                .map(parse_scopes)
                .unwrap_or_else(|| self.scopes.clone()),
            expiry: Some(expiry),
        })
    }

    /// Returns true if the access token stays valid for longer than `margin`.
    pub fn is_fresh(&self, margin: StdDuration, now: DateTime<Utc>) -> bool {
        let margin = Duration::from_std(margin).unwrap_or(Duration::MAX);
        match self.expiry {
            Some(expiry) => expiry - now > margin,
            None => false,
        }
    }

    /// Returns true if the access token is past its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_none_or(|expiry| now >= expiry)
    }

    /// Returns true if the record can be renewed without user interaction.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Returns true if every required scope was granted.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Returns true if the record was issued to the given client.
    pub fn belongs_to(&self, client: &ClientDescriptor) -> bool {
        self.client_id == client.client_id
    }

    /// Returns the time until the token expires, if known.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expiry.map(|expiry| expiry - now)
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

fn parse_scopes(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

fn expiry_from(expires_in: Option<i64>, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let secs = expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    Duration::try_seconds(secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| format!("expires_in out of range: {}", secs))
}
