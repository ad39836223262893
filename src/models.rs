use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_TRACK_URL: &str = "https://open.spotify.com";

/// Track record as returned by the Spotify Web API. Every field may be
/// absent or null; defaults are applied by `normalize`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrack {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub artists: Vec<RawArtist>,
    #[serde(default)]
    pub album: Option<RawAlbum>,
    #[serde(default)]
    pub external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArtist {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAlbum {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub images: Vec<RawImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImage {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

/// Body of `GET /me/player/currently-playing`.
#[derive(Debug, Default, Deserialize)]
pub struct CurrentlyPlayingResponse {
    #[serde(default)]
    pub is_playing: Option<bool>,
    #[serde(default)]
    pub item: Option<RawTrack>,
}

/// Body of `GET /me/player/recently-played`.
#[derive(Debug, Default, Deserialize)]
pub struct RecentlyPlayedResponse {
    #[serde(default, deserialize_with = "nullable_list")]
    pub items: Vec<PlayHistoryItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayHistoryItem {
    #[serde(default)]
    pub track: Option<RawTrack>,
}

/// Client-facing payload served to the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlayingPayload {
    #[serde(default)]
    pub is_playing: bool,
    pub track_name: String,
    pub artists: String,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub album_image_url: String,
    #[serde(default)]
    pub track_url: String,
    #[serde(default)]
    pub last_updated: String,
}

impl NowPlayingPayload {
    /// Shown when neither the player nor the play history has a track.
    pub fn nothing_playing(last_updated: String) -> Self {
        Self {
            is_playing: false,
            track_name: "Nothing playing right now".into(),
            artists: "Start a Spotify track to update this tile.".into(),
            album_name: String::new(),
            album_image_url: String::new(),
            track_url: DEFAULT_TRACK_URL.into(),
            last_updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Accepts a missing list, `null`, or a list that contains `null` entries.
fn nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(items.unwrap_or_default().into_iter().flatten().collect())
}
