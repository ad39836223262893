use serde::Deserialize;
use std::path::PathBuf;

use crate::api::spotify_auth::Credentials;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_route")]
    pub route: String,
    /// Comma-separated origins, `*`, or empty for "same origin only".
    #[serde(default)]
    pub allowed_origin: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    // Token handling
    #[serde(default = "default_token_cache")]
    pub token_cache: bool,
    #[serde(default = "default_token_expiry_buffer")]
    pub token_expiry_buffer_sec: u64,

    // Upstream/response timing
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_sec: u64,
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age_sec: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_sec: u64,

    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    // include v1 path by default
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_bind_addr() -> String { "127.0.0.1:8787".into() }
fn default_route() -> String { "/api/spotify-now-playing".into() }
fn default_log_dir() -> PathBuf { "/var/log/now-playing".into() }
fn default_token_cache() -> bool { true }
fn default_token_expiry_buffer() -> u64 { 30 }
fn default_upstream_timeout() -> u64 { 10 }
fn default_cache_max_age() -> u64 { 10 }
fn default_poll_interval() -> u64 { 15 }
fn default_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_api_base() -> String { "https://api.spotify.com/v1".into() }
fn default_forecast_url() -> String { "https://api.open-meteo.com/v1/forecast".into() }
fn default_latitude() -> f64 { -33.8688 }
fn default_longitude() -> f64 { 151.2093 }
fn default_timezone() -> String { "Australia/Sydney".into() }

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            auth_base: default_auth_base(),
            api_base: default_api_base(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            forecast_url: default_forecast_url(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            timezone: default_timezone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            route: default_route(),
            allowed_origin: String::new(),
            log_dir: default_log_dir(),
            token_cache: default_token_cache(),
            token_expiry_buffer_sec: default_token_expiry_buffer(),
            upstream_timeout_sec: default_upstream_timeout(),
            cache_max_age_sec: default_cache_max_age(),
            poll_interval_sec: default_poll_interval(),
            spotify: SpotifyConfig::default(),
            weather: WeatherConfig::default(),
        }
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// Defaults plus the process environment.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg
    }

    /// Overlay secrets and deployment values from the environment. Empty
    /// variables are ignored so a file value is not wiped by `FOO=`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = v;
        }
        if let Some(v) = get("SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = v;
        }
        if let Some(v) = get("SPOTIFY_REFRESH_TOKEN") {
            self.spotify.refresh_token = v;
        }
        if let Some(v) = get("SPOTIFY_AUTH_BASE") {
            self.spotify.auth_base = v;
        }
        if let Some(v) = get("SPOTIFY_API_BASE") {
            self.spotify.api_base = v;
        }
        if let Some(v) = get("ALLOWED_ORIGIN") {
            self.allowed_origin = v;
        }
        if let Some(v) = get("BIND_ADDR") {
            self.bind_addr = v;
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            &self.spotify.client_id,
            &self.spotify.client_secret,
            &self.spotify.refresh_token,
        )
    }
}
