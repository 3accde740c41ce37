//! Obtaining a Drive access token from a pre-provisioned authorized-user
//! credential.
//!
//! The credential is the JSON document written by Google's OAuth client
//! libraries for installed-app flows (`client_id`, `client_secret`,
//! `refresh_token`, plus optionally a cached `token` and its `expiry`).  If
//! the cached token is missing or about to expire, a single refresh exchange
//! is made against the credential's token endpoint.  The refreshed token is
//! not written back anywhere.

use crate::consts::{CREDENTIALS_ENV_VAR, DEFAULT_TOKEN_URI};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// Tokens expiring within this long are treated as already expired
const REFRESH_THRESHOLD: Duration = Duration::seconds(225);

/// Read the serialized credential from the environment.  An unset, empty, or
/// non-Unicode variable yields `None`.
pub(crate) fn credentials_from_env() -> Option<String> {
    std::env::var(CREDENTIALS_ENV_VAR)
        .ok()
        .filter(|s| !s.trim().is_empty())
}

/// Serializes tests that modify the process environment
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Authorized-user credential info as serialized by Google's auth libraries
#[derive(Clone, Deserialize, Eq, PartialEq)]
struct AuthorizedUserInfo {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    expiry: Option<OffsetDateTime>,
    #[serde(default)]
    token_uri: Option<String>,
}

impl fmt::Debug for AuthorizedUserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUserInfo")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// A usable access token
#[derive(Clone, Eq, PartialEq)]
pub(crate) struct Credential {
    access_token: String,
    expiry: Option<OffsetDateTime>,
}

impl Credential {
    pub(crate) fn new(access_token: String, expiry: Option<OffsetDateTime>) -> Credential {
        Credential {
            access_token,
            expiry,
        }
    }

    pub(crate) fn access_token(&self) -> &str {
        &self.access_token
    }

    pub(crate) fn expiry(&self) -> Option<OffsetDateTime> {
        self.expiry
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Successful response from an OAuth 2.0 token endpoint
#[derive(Clone, Deserialize, Eq, PartialEq)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Error response from an OAuth 2.0 token endpoint
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Clone, Debug)]
pub(crate) struct Authenticator {
    http: Client,
    scopes: Vec<String>,
}

impl Authenticator {
    pub(crate) fn new(http: Client, scopes: Vec<String>) -> Authenticator {
        Authenticator { http, scopes }
    }

    /// Turn a serialized authorized-user credential into a valid access
    /// token, refreshing it if necessary.
    ///
    /// `serialized` is the credential JSON, or `None` if none was provided.
    /// Nothing is sent over the network unless a refresh is required.
    pub(crate) async fn obtain_credential(
        &self,
        serialized: Option<&str>,
    ) -> Result<Credential, AuthenticationError> {
        let Some(serialized) = serialized else {
            return Err(AuthenticationError::Missing);
        };
        let info = serde_json::from_str::<AuthorizedUserInfo>(serialized)
            .map_err(AuthenticationError::Malformed)?;
        let now = OffsetDateTime::now_utc();
        if let Some(token) = info.token.as_ref().filter(|t| !t.is_empty()) {
            if !is_expired(info.expiry, now) {
                tracing::debug!(expiry = ?info.expiry, "Stored access token is still valid");
                return Ok(Credential::new(token.clone(), info.expiry));
            }
            tracing::info!(expiry = ?info.expiry, "Stored access token has expired");
        } else {
            tracing::info!("Credential has no stored access token");
        }
        let Some(refresh_token) = info.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(AuthenticationError::NotRefreshable);
        };
        self.refresh(&info, refresh_token).await
    }

    /// Perform a single refresh-token exchange
    async fn refresh(
        &self,
        info: &AuthorizedUserInfo,
        refresh_token: &str,
    ) -> Result<Credential, AuthenticationError> {
        let token_uri = info.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        tracing::info!(%token_uri, "Refreshing access token ...");
        let scope = self.scopes.join(" ");
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", info.client_id.as_str()),
            ("client_secret", info.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }
        let response = self
            .http
            .post(token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|source| AuthenticationError::Refresh { source })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(TokenErrorResponse {
                    error,
                    error_description: Some(desc),
                }) => format!("{error}: {desc}"),
                Ok(TokenErrorResponse { error, .. }) => error,
                Err(_) => body,
            };
            return Err(AuthenticationError::RefreshRejected {
                status: status.as_u16(),
                message,
            });
        }
        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|source| AuthenticationError::Refresh { source })?;
        let expiry = token
            .expires_in
            .and_then(|secs| expiry_after(OffsetDateTime::now_utc(), secs));
        tracing::info!(?expiry, "Access token refreshed");
        Ok(Credential::new(token.access_token, expiry))
    }
}

/// An `expires_in` too large to represent is treated as no expiry.
fn expiry_after(now: OffsetDateTime, expires_in: i64) -> Option<OffsetDateTime> {
    now.checked_add(Duration::seconds(expires_in))
}

/// A token with no recorded expiry never expires.
fn is_expired(expiry: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    expiry.is_some_and(|exp| now >= exp - REFRESH_THRESHOLD)
}

#[derive(Debug, Error)]
pub(crate) enum AuthenticationError {
    #[error("no valid Google Drive credentials found: GOOGLE_DRIVE_CREDENTIALS is not set")]
    Missing,
    #[error("failed to parse credentials in GOOGLE_DRIVE_CREDENTIALS")]
    Malformed(#[source] serde_json::Error),
    #[error("no valid Google Drive credentials found: access token is missing or expired and no refresh token is available")]
    NotRefreshable,
    #[error("failed to refresh access token")]
    Refresh { source: reqwest::Error },
    #[error("token endpoint rejected refresh (HTTP {status}): {message}")]
    RefreshRejected { status: u16, message: String },
}
