use super::spotify_auth::{Credentials, TokenCache, TokenProvider};
use super::{NowPlayingProvider, ProviderError};
use crate::config::Config;
use crate::models::{CurrentlyPlayingResponse, NowPlayingPayload, RecentlyPlayedResponse};
use crate::normalize::normalize_at;
use crate::util::Clock;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Base URLs for the two Spotify hosts. Tests point both at a mock server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth_base: String,
    pub api_base: String,
}

impl Endpoints {
    pub fn new(auth_base: &str, api_base: &str) -> Self {
        Self {
            auth_base: auth_base.trim_end_matches('/').to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Both hosts served from one base (mock servers).
    pub fn single(base: &str) -> Self {
        Self::new(base, base)
    }

    fn currently_playing(&self) -> String {
        format!("{}/me/player/currently-playing", self.api_base)
    }

    fn recently_played(&self) -> String {
        format!("{}/me/player/recently-played?limit=1", self.api_base)
    }
}

/// Spotify provider backed by the Web API player endpoints.
pub struct SpotifyProvider {
    client: Client,
    endpoints: Endpoints,
    tokens: TokenProvider,
    clock: Arc<dyn Clock>,
}

impl SpotifyProvider {
    pub fn new(
        client: Client,
        endpoints: Endpoints,
        credentials: Credentials,
        cache: Option<Arc<TokenCache>>,
        clock: Arc<dyn Clock>,
        expiry_buffer: chrono::Duration,
    ) -> Self {
        let tokens = TokenProvider::new(
            client.clone(),
            &endpoints.auth_base,
            credentials,
            cache,
            clock.clone(),
            expiry_buffer,
        );
        Self { client, endpoints, tokens, clock }
    }

    /// Build from config: one HTTP client with the upstream timeout, and the
    /// shared cache only when `token_cache` is on.
    pub fn from_config(cfg: &Config, cache: Arc<TokenCache>, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.upstream_timeout_sec))
            .build()?;
        let endpoints = Endpoints::new(&cfg.spotify.auth_base, &cfg.spotify.api_base);
        let cache = if cfg.token_cache { Some(cache) } else { None };
        Ok(Self::new(
            client,
            endpoints,
            cfg.credentials(),
            cache,
            clock,
            chrono::Duration::seconds(cfg.token_expiry_buffer_sec as i64),
        ))
    }

    pub fn token_provider(&self) -> &TokenProvider {
        &self.tokens
    }

    async fn get_currently_playing(&self, token: &str) -> Result<Option<NowPlayingPayload>, ProviderError> {
        let resp = self
            .client
            .get(self.endpoints.currently_playing())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            debug!("currently-playing returned 204, player is idle");
            return Ok(None);
        }
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!(
                "spotify currently-playing request failed: {} => {}",
                status, txt
            )));
        }

        let bytes = resp.bytes().await?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        let body: CurrentlyPlayingResponse = serde_json::from_slice(&bytes)?;
        let is_playing = body.is_playing.unwrap_or(false);
        Ok(body
            .item
            .map(|track| normalize_at(&track, is_playing, self.clock.now())))
    }

    async fn get_recently_played(&self, token: &str) -> Result<Option<NowPlayingPayload>, ProviderError> {
        let resp = self
            .client
            .get(self.endpoints.recently_played())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            // non-2xx here degrades to the placeholder instead of a 502
            warn!("spotify recently-played request failed: {}", status);
            return Ok(None);
        }

        let body: RecentlyPlayedResponse = serde_json::from_slice(&resp.bytes().await?)?;
        Ok(body
            .items
            .into_iter()
            .next()
            .and_then(|item| item.track)
            .map(|track| normalize_at(&track, false, self.clock.now())))
    }
}

#[async_trait]
impl NowPlayingProvider for SpotifyProvider {
    fn name(&self) -> &str {
        "spotify"
    }

    fn is_configured(&self) -> bool {
        self.tokens.credentials().is_configured()
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        self.tokens.access_token().await
    }

    async fn currently_playing(&self, token: &str) -> Result<Option<NowPlayingPayload>, ProviderError> {
        self.get_currently_playing(token).await
    }

    async fn recently_played(&self, token: &str) -> Result<Option<NowPlayingPayload>, ProviderError> {
        self.get_recently_played(token).await
    }
}
