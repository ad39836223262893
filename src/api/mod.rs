pub mod spotify;
pub mod mock;
pub mod spotify_auth;

use crate::models::NowPlayingPayload;
use crate::util::{iso_timestamp, Clock};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Token exchange rejected or returned no usable token.
    #[error("auth error: {0}")]
    Auth(String),
    /// Playback endpoint answered with an unexpected status.
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Provider trait: the operations the request handler needs.
/// Implementations: spotify::SpotifyProvider and mock::MockProvider.
#[async_trait::async_trait]
pub trait NowPlayingProvider: Send + Sync {
    /// Return the provider's name (for logging)
    fn name(&self) -> &str;

    /// True when every credential needed for a token exchange is present.
    fn is_configured(&self) -> bool;

    /// Bearer token for the playback endpoints, possibly served from cache.
    async fn access_token(&self) -> Result<String, ProviderError>;

    /// What the player has loaded right now. `None` when nothing is loaded.
    async fn currently_playing(&self, token: &str) -> Result<Option<NowPlayingPayload>, ProviderError>;

    /// The most recent entry of the play history, always with `is_playing == false`.
    async fn recently_played(&self, token: &str) -> Result<Option<NowPlayingPayload>, ProviderError>;
}

/// Run the fetch pipeline: token, then the current player, then play
/// history, then the static placeholder. Calls are sequential because the
/// history lookup only happens when the player is empty.
pub async fn fetch_now_playing(
    provider: &dyn NowPlayingProvider,
    clock: &dyn Clock,
) -> Result<NowPlayingPayload, ProviderError> {
    let token = provider.access_token().await?;

    if let Some(current) = provider.currently_playing(&token).await? {
        debug!(provider = provider.name(), is_playing = current.is_playing, "current playback found");
        return Ok(current);
    }

    if let Some(recent) = provider.recently_played(&token).await? {
        debug!(provider = provider.name(), "falling back to recently played");
        return Ok(NowPlayingPayload { is_playing: false, ..recent });
    }

    debug!(provider = provider.name(), "nothing playing");
    Ok(NowPlayingPayload::nothing_playing(iso_timestamp(clock.now())))
}
