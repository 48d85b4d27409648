//! Service-account authentication: signed JWT assertion and the jwt-bearer
//! token exchange.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::{error::StoreError, protocol::TokenResponse};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{config::StoreSettings, transport};

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
pub const ASSERTION_TTL_SECONDS: i64 = 3600;
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl AssertionClaims {
    pub fn new(settings: &StoreSettings, issued_at: DateTime<Utc>) -> Self {
        let iat = issued_at.timestamp();
        Self {
            iss: settings.service_account_email.clone(),
            scope: SPREADSHEETS_SCOPE.to_string(),
            aud: settings.token_url.clone(),
            iat,
            exp: iat + ASSERTION_TTL_SECONDS,
        }
    }
}

/// Signs the RS256 assertion presented to the token endpoint.
pub fn build_assertion(
    settings: &StoreSettings,
    issued_at: DateTime<Utc>,
) -> Result<String, StoreError> {
    let key = EncodingKey::from_rsa_pem(settings.private_key.as_bytes()).map_err(|err| {
        StoreError::Auth(format!("malformed service account private key: {err}"))
    })?;

    encode(
        &Header::new(Algorithm::RS256),
        &AssertionClaims::new(settings, issued_at),
        &key,
    )
    .map_err(|err| StoreError::Auth(format!("failed to sign assertion: {err}")))
}

#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Tokens without a known expiry are never considered fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        now + margin < expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, StoreError>;
}

/// Mints a brand new token on every call.
pub struct ServiceAccountTokenSource {
    http: Client,
    settings: Arc<StoreSettings>,
}

impl ServiceAccountTokenSource {
    pub fn new(http: Client, settings: Arc<StoreSettings>) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<AccessToken, StoreError> {
        let issued_at = Utc::now();
        let assertion = build_assertion(&self.settings, issued_at)?;

        debug!(token_url = %self.settings.token_url, "requesting access token");
        let res = self
            .http
            .post(&self.settings.token_url)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|err| StoreError::Auth(transport::describe_request_error(&err)))?;

        let status = res.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "token endpoint rejected assertion");
            let message = transport::remote_error_message(res)
                .await
                .unwrap_or_else(|| format!("token request failed with status {status}"));
            return Err(StoreError::Auth(message));
        }

        let body: TokenResponse = res
            .json()
            .await
            .map_err(|err| StoreError::Auth(format!("malformed token response: {err}")))?;
        if body.access_token.trim().is_empty() {
            return Err(StoreError::Auth(
                "token endpoint returned an empty access token".into(),
            ));
        }

        // An expiry that does not fit the calendar leaves the token uncacheable.
        let expires_at = body.expires_in.and_then(|secs| {
            chrono::Duration::try_seconds(secs)
                .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        });
        Ok(AccessToken::new(body.access_token, expires_at))
    }
}

/// Reuses a token until it is within `refresh_margin` of expiring.
pub struct CachedTokenSource<T> {
    inner: T,
    refresh_margin: Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl<T: TokenSource> CachedTokenSource<T> {
    pub fn new(inner: T) -> Self {
        Self::with_refresh_margin(inner, DEFAULT_REFRESH_MARGIN)
    }

    pub fn with_refresh_margin(inner: T, refresh_margin: Duration) -> Self {
        Self {
            inner,
            refresh_margin,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<T: TokenSource> TokenSource for CachedTokenSource<T> {
    async fn access_token(&self) -> Result<AccessToken, StoreError> {
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard
            .as_ref()
            .filter(|token| token.is_fresh(Utc::now(), self.refresh_margin))
        {
            return Ok(token.clone());
        }

        let token = self.inner.access_token().await?;
        info!(expires_at = ?token.expires_at(), "cached new access token");
        *guard = Some(token.clone());
        Ok(token)
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
