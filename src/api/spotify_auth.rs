use super::ProviderError;
use crate::util::Clock;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Fallback lifetime when the token endpoint omits or garbles `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: f64 = 3600.0;

/// Static app credentials plus the long-lived refresh token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.refresh_token.is_empty()
    }

    fn basic_auth_header(&self) -> String {
        format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |s: &str| if s.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("Credentials")
            .field("client_id", &mask(&self.client_id))
            .field("client_secret", &mask(&self.client_secret))
            .field("refresh_token", &mask(&self.refresh_token))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CachedToken {
    /// Usable only while `now` is earlier than `expires_at - buffer`.
    pub fn is_fresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now < self.expires_at - buffer
    }
}

/// Process-lifetime holder for the single bearer token. Not persisted.
#[derive(Debug, Default)]
pub struct TokenCache {
    inner: tokio::sync::Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CachedToken) -> Self {
        Self { inner: tokio::sync::Mutex::new(Some(token)) }
    }

    pub async fn get(&self) -> Option<CachedToken> {
        self.inner.lock().await.clone()
    }

    pub async fn store(&self, token: CachedToken) {
        *self.inner.lock().await = Some(token);
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

/// Seconds until expiry. Accepts a number or a numeric string; anything
/// else, including zero or negative values, falls back to one hour.
fn parse_expires_in(value: Option<&serde_json::Value>) -> f64 {
    let secs = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match secs {
        Some(s) if s.is_finite() && s > 0.0 => s,
        _ => DEFAULT_EXPIRES_IN_SECS,
    }
}

/// `now + ttl`, or `now + 3600 s` when the ttl is too large to represent.
fn expiry_from(now: DateTime<Utc>, ttl_secs: f64) -> DateTime<Utc> {
    let ttl_ms = ttl_secs * 1000.0;
    let checked = if ttl_ms < i64::MAX as f64 {
        Duration::try_milliseconds(ttl_ms as i64).and_then(|d| now.checked_add_signed(d))
    } else {
        None
    };
    checked.unwrap_or_else(|| now + Duration::seconds(DEFAULT_EXPIRES_IN_SECS as i64))
}

/// Exchanges the refresh token for a bearer token. With a cache attached,
/// a still-fresh token is returned without touching the network; without
/// one every call performs an exchange.
pub struct TokenProvider {
    client: Client,
    token_url: String,
    credentials: Credentials,
    cache: Option<Arc<TokenCache>>,
    clock: Arc<dyn Clock>,
    expiry_buffer: Duration,
}

impl TokenProvider {
    pub fn new(
        client: Client,
        auth_base: &str,
        credentials: Credentials,
        cache: Option<Arc<TokenCache>>,
        clock: Arc<dyn Clock>,
        expiry_buffer: Duration,
    ) -> Self {
        Self {
            client,
            token_url: format!("{}/api/token", auth_base.trim_end_matches('/')),
            credentials,
            cache,
            clock,
            expiry_buffer,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub async fn access_token(&self) -> Result<String, ProviderError> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get().await {
                if cached.is_fresh(self.clock.now(), self.expiry_buffer) {
                    return Ok(cached.access_token);
                }
                debug!("Spotify token is near expiry, refreshing");
            }
        }

        let fresh = self.exchange().await?;
        let token = fresh.access_token.clone();
        if let Some(cache) = &self.cache {
            cache.store(fresh).await;
        }
        Ok(token)
    }

    /// One refresh-token exchange against the accounts service.
    pub async fn exchange(&self) -> Result<CachedToken, ProviderError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
        ];
        let resp = self
            .client
            .post(&self.token_url)
            .header(AUTHORIZATION, self.credentials.basic_auth_header())
            .form(&params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!(
                "spotify token exchange failed: {} - {}",
                status, body
            )));
        }

        let bytes = resp.bytes().await?;
        let tr: TokenResponse = serde_json::from_slice(&bytes)?;
        let access_token = tr
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Auth("missing spotify access token".into()))?;
        let expires_at = expiry_from(self.clock.now(), parse_expires_in(tr.expires_in.as_ref()));

        info!(expires_at = %expires_at, "Spotify access token refreshed");
        Ok(CachedToken { access_token, expires_at })
    }
}
