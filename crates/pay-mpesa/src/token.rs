//! # OAuth Token Provider
//!
//! Fetches and caches the Daraja bearer token.
//!
//! The cache sits behind an async mutex that stays locked for the whole
//! refresh, so concurrent callers queue on the lock and then read the
//! token the first caller fetched. One OAuth round-trip per refresh cycle.

use crate::config::MpesaConfig;
use chrono::{DateTime, Duration, Utc};
use pay_core::{PaymentError, PaymentResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Tokens are refreshed this long before the gateway expires them
const REFRESH_MARGIN_SECS: i64 = 60;

const MAX_LIFETIME_SECS: i64 = 86_400;

/// A bearer token and the instant it stops being valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Still usable at `now`, leaving room for the refresh margin
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

pub struct TokenProvider {
    config: Arc<MpesaConfig>,
    client: Client,
    cache: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub fn new(config: Arc<MpesaConfig>, client: Client) -> Self {
        Self {
            config,
            client,
            cache: Mutex::new(None),
        }
    }

    /// Return a cached token or fetch a new one.
    ///
    /// Fails with `Configuration` before any network call if the consumer
    /// credentials are missing.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> PaymentResult<AccessToken> {
        self.config.ensure_credentials()?;

        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.clone());
        }

        let token = self.fetch_with_retry().await?;
        info!("Obtained M-Pesa access token, expires_at={}", token.expires_at);
        *cache = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token, e.g. after the gateway rejected it
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    async fn fetch_with_retry(&self) -> PaymentResult<AccessToken> {
        let attempts = self.config.token_retry_attempts.max(1);
        let mut delay = self.config.token_retry_backoff;
        let mut attempt = 1;

        loop {
            match self.fetch().await {
                Ok(token) => return Ok(token),
                Err(FetchError::Transient(message)) if attempt < attempts => {
                    warn!(
                        "Token request failed (attempt {}/{}): {}",
                        attempt, attempts, message
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(FetchError::Transient(message)) | Err(FetchError::Permanent(message)) => {
                    return Err(PaymentError::GatewayUnavailable(message));
                }
            }
        }
    }

    async fn fetch(&self) -> Result<AccessToken, FetchError> {
        debug!("Requesting M-Pesa access token");

        let response = self
            .client
            .get(self.config.token_url())
            .header("Authorization", self.config.basic_auth_header())
            .send()
            .await
            .map_err(|e| FetchError::Transient(describe(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(describe(&e)))?;

        if !status.is_success() {
            let message = format!("Token endpoint returned HTTP {}: {}", status, body);
            return Err(if is_transient(status) {
                FetchError::Transient(message)
            } else {
                FetchError::Permanent(message)
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            FetchError::Permanent(format!("Failed to parse token response: {}", e))
        })?;

        if parsed.access_token.is_empty() {
            return Err(FetchError::Permanent(
                "Token response carried an empty access_token".to_string(),
            ));
        }

        Ok(AccessToken {
            value: parsed.access_token,
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in.clamp(0, MAX_LIFETIME_SECS)),
        })
    }
}

enum FetchError {
    Transient(String),
    Permanent(String),
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("Token request timed out: {}", err)
    } else {
        format!("Token request failed: {}", err)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "string_or_number")]
    expires_in: i64,
}

/// Daraja sends `expires_in` as a string ("3599"); accept a number too.
fn string_or_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
