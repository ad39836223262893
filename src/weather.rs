//! Current conditions from open-meteo for the clock/weather tile.

use crate::config::WeatherConfig;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

const CURRENT_FIELDS: &str =
    "temperature_2m,weather_code,apparent_temperature,relative_humidity_2m,wind_speed_10m";

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Status(reqwest::StatusCode),
    #[error("missing weather payload")]
    Missing,
    #[error("invalid weather payload: {0} is not a finite number")]
    Invalid(&'static str),
    #[error("unknown time zone: {0}")]
    TimeZone(String),
    #[error("invalid forecast url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Default, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    current: Option<RawCurrent>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCurrent {
    temperature_2m: Option<f64>,
    weather_code: Option<f64>,
    apparent_temperature: Option<f64>,
    relative_humidity_2m: Option<f64>,
    wind_speed_10m: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub weather_code: u16,
    pub apparent_temperature: f64,
    pub relative_humidity: f64,
    pub wind_speed: f64,
}

/// Coarse WMO weather-code buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Rain,
    Snow,
    Thunderstorm,
}

impl Condition {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Condition::Clear,
            1 | 2 => Condition::PartlyCloudy,
            45 | 48 => Condition::Fog,
            51..=67 | 80..=82 => Condition::Rain,
            71..=77 | 85 | 86 => Condition::Snow,
            95..=99 => Condition::Thunderstorm,
            _ => Condition::Cloudy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Clear => "Clear",
            Condition::PartlyCloudy => "Partly cloudy",
            Condition::Cloudy => "Cloudy",
            Condition::Fog => "Fog",
            Condition::Rain => "Rain",
            Condition::Snow => "Snow",
            Condition::Thunderstorm => "Thunderstorm",
        }
    }
}

/// Halves round toward positive infinity, so -0.5 shows as 0.
fn rounded(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

/// Text lines of the weather tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionsView {
    pub temperature: String,
    pub condition: String,
    pub feels_like: String,
    pub humidity: String,
    pub wind: String,
}

impl ConditionsView {
    pub fn from_conditions(c: &CurrentConditions) -> Self {
        Self {
            temperature: format!("{} C", rounded(c.temperature)),
            condition: Condition::from_code(c.weather_code).as_str().to_string(),
            feels_like: format!("Feels {} C", rounded(c.apparent_temperature)),
            humidity: format!("Humidity {}%", rounded(c.relative_humidity)),
            wind: format!("Wind {} km/h", rounded(c.wind_speed)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            temperature: "-- C".into(),
            condition: "--".into(),
            feels_like: "Feels -- C".into(),
            humidity: "Humidity --%".into(),
            wind: "Wind -- km/h".into(),
        }
    }
}

/// `None` last update with `has_result` means the last fetch failed.
pub fn freshness_label(has_result: bool, last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    if !has_result {
        return "Updating...".into();
    }
    let Some(at) = last_update else {
        return "Update unavailable".into();
    };
    let minutes = (now - at).num_minutes();
    if minutes < 1 {
        "Updated just now".into()
    } else if minutes < 60 {
        format!("Updated {}m ago", minutes)
    } else {
        "Updated 1h+ ago".into()
    }
}

/// 24h wall-clock time with the zone abbreviation, e.g. `18:00:00 AEST`.
pub fn local_clock(now: DateTime<Utc>, timezone: &str) -> Result<String, WeatherError> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| WeatherError::TimeZone(timezone.to_string()))?;
    Ok(now.with_timezone(&tz).format("%H:%M:%S %Z").to_string())
}

pub fn forecast_url(cfg: &WeatherConfig) -> Result<Url, WeatherError> {
    let mut url = Url::parse(&cfg.forecast_url)?;
    url.query_pairs_mut()
        .append_pair("latitude", &cfg.latitude.to_string())
        .append_pair("longitude", &cfg.longitude.to_string())
        .append_pair("current", CURRENT_FIELDS)
        .append_pair("timezone", &cfg.timezone);
    Ok(url)
}

fn finite(v: Option<f64>, field: &'static str) -> Result<f64, WeatherError> {
    v.filter(|x| x.is_finite()).ok_or(WeatherError::Invalid(field))
}

pub async fn fetch_current_conditions(client: &Client, cfg: &WeatherConfig) -> Result<CurrentConditions, WeatherError> {
    let resp = client.get(forecast_url(cfg)?).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(WeatherError::Status(status));
    }
    let body: ForecastResponse = resp.json().await?;
    let current = body.current.ok_or(WeatherError::Missing)?;

    let code = finite(current.weather_code, "weather_code")?;
    Ok(CurrentConditions {
        temperature: finite(current.temperature_2m, "temperature_2m")?,
        weather_code: code.clamp(0.0, u16::MAX as f64) as u16,
        apparent_temperature: finite(current.apparent_temperature, "apparent_temperature")?,
        relative_humidity: finite(current.relative_humidity_2m, "relative_humidity_2m")?,
        wind_speed: finite(current.wind_speed_10m, "wind_speed_10m")?,
    })
}
