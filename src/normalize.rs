use crate::models::{NowPlayingPayload, RawTrack, DEFAULT_TRACK_URL};
use crate::util::{iso_timestamp, non_empty};
use chrono::{DateTime, Utc};

/// Map a provider track into the widget payload, stamping `lastUpdated` now.
pub fn normalize(track: &RawTrack, is_playing: bool) -> NowPlayingPayload {
    normalize_at(track, is_playing, Utc::now())
}

/// Total mapping: every absent or empty field falls back to a default, so
/// only `albumImageUrl` can ever come out empty.
pub fn normalize_at(track: &RawTrack, is_playing: bool, now: DateTime<Utc>) -> NowPlayingPayload {
    let artists = track
        .artists
        .iter()
        .filter_map(|a| non_empty(a.name.as_deref()))
        .collect::<Vec<_>>()
        .join(", ");

    let album = track.album.as_ref();
    let album_image_url = album
        .and_then(|a| a.images.iter().find_map(|i| non_empty(i.url.as_deref())))
        .unwrap_or("");

    NowPlayingPayload {
        is_playing,
        track_name: non_empty(track.name.as_deref()).unwrap_or("Unknown track").to_string(),
        artists: if artists.is_empty() { "Unknown artist".to_string() } else { artists },
        album_name: non_empty(album.and_then(|a| a.name.as_deref()))
            .unwrap_or("Unknown album")
            .to_string(),
        album_image_url: album_image_url.to_string(),
        track_url: non_empty(
            track
                .external_urls
                .as_ref()
                .and_then(|u| u.spotify.as_deref()),
        )
        .unwrap_or(DEFAULT_TRACK_URL)
        .to_string(),
        last_updated: iso_timestamp(now),
    }
}
