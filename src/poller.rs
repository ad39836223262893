//! Polling client for the now-playing endpoint: the terminal counterpart of
//! the website tile. Keeps a view state and only re-renders when it changes.

use crate::models::{NowPlayingPayload, DEFAULT_TRACK_URL};
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Loading,
    Playing,
    Idle,
    Error,
}

impl TileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileState::Loading => "loading",
            TileState::Playing => "playing",
            TileState::Idle => "idle",
            TileState::Error => "error",
        }
    }
}

/// Everything the tile shows. Two equal views render identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileView {
    pub state: TileState,
    pub label: String,
    pub title: String,
    pub subtitle: String,
    pub image_url: Option<String>,
    pub link: String,
}

impl TileView {
    fn common(state: TileState, label: &str, title: &str, subtitle: &str, image_url: &str, link: &str) -> Self {
        Self {
            state,
            label: label.into(),
            title: title.into(),
            subtitle: subtitle.into(),
            image_url: if image_url.is_empty() { None } else { Some(image_url.into()) },
            link: if link.is_empty() { DEFAULT_TRACK_URL.into() } else { link.into() },
        }
    }

    pub fn loading() -> Self {
        Self::common(TileState::Loading, "Loading", "Checking Spotify...", "Fetching your listening status.", "", "")
    }

    pub fn error() -> Self {
        Self::common(
            TileState::Error,
            "Unavailable",
            "Spotify unavailable",
            "Unable to load listening status right now.",
            "",
            "",
        )
    }

    pub fn from_payload(p: &NowPlayingPayload) -> Self {
        let subtitle = if p.album_name.is_empty() {
            p.artists.clone()
        } else {
            format!("{} • {}", p.artists, p.album_name)
        };
        let (state, label) = if p.is_playing {
            (TileState::Playing, "Live")
        } else {
            (TileState::Idle, "Last played")
        };
        let title = if p.track_name.is_empty() { "Unknown track" } else { &p.track_name };
        let subtitle = if subtitle.is_empty() { "Unknown artist".to_string() } else { subtitle };
        Self::common(state, label, title, &subtitle, &p.album_image_url, &p.track_url)
    }

    /// One-line text rendering used by the CLI.
    pub fn render_line(&self) -> String {
        format!("[{}] {} - {} <{}>", self.label, self.title, self.subtitle, self.link)
    }
}

pub struct Poller {
    client: Client,
    endpoint: String,
    in_flight: AtomicBool,
    last_view: Mutex<Option<TileView>>,
}

/// Clears the in-flight flag however the fetch ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Poller {
    pub fn new(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            in_flight: AtomicBool::new(false),
            last_view: Mutex::new(None),
        }
    }

    /// Fetch once and map the outcome to a view. Returns `None` when a
    /// previous fetch is still running.
    pub async fn poll_once(&self) -> Option<TileView> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("poll skipped, request already in flight");
            return None;
        }
        let _guard = InFlight(&self.in_flight);

        match self.fetch_payload().await {
            Ok(p) => Some(TileView::from_payload(&p)),
            Err(e) => {
                warn!("now-playing poll failed: {}", e);
                Some(TileView::error())
            }
        }
    }

    async fn fetch_payload(&self) -> anyhow::Result<NowPlayingPayload> {
        let resp = self
            .client
            .get(&self.endpoint)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("now-playing request failed: {}", status);
        }
        let payload: NowPlayingPayload = resp.json().await?;
        if payload.track_name.is_empty() || payload.artists.is_empty() {
            anyhow::bail!("invalid payload");
        }
        Ok(payload)
    }

    /// Record `view` and report whether it differs from the last one shown.
    pub fn swap_view(&self, view: TileView) -> bool {
        let mut last = self.last_view.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_ref() == Some(&view) {
            return false;
        }
        *last = Some(view);
        true
    }

    /// Show the loading view, poll immediately, then every `interval` until
    /// `shutdown` resolves. `render` only sees views that changed.
    pub async fn run<F, S>(&self, interval: Duration, shutdown: S, mut render: F)
    where
        F: FnMut(&TileView),
        S: Future<Output = ()>,
    {
        let loading = TileView::loading();
        if self.swap_view(loading.clone()) {
            render(&loading);
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Some(view) = self.poll_once().await {
                        if self.swap_view(view.clone()) {
                            render(&view);
                        }
                    }
                }
            }
        }
        debug!("poller stopped");
    }
}
