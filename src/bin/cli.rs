use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing::subscriber as tracing_subscriber_global;
use tracing::info;
use anyhow::{Result, Context};
use now_playing_widget as lib;
use lib::api::mock::{MockProvider, MockReply};
use lib::api::spotify::SpotifyProvider;
use lib::api::spotify_auth::TokenCache;
use lib::api::NowPlayingProvider;
use lib::config::Config;
use lib::models::NowPlayingPayload;
use lib::util::{iso_timestamp, Clock, SystemClock};

#[derive(Parser)]
#[command(name = "now-playing-widget", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the now-playing endpoint (long-running)
    Serve {
        /// Serve canned data instead of calling Spotify
        #[arg(long)]
        mock: bool,
    },
    /// Run the fetch pipeline once and print the payload
    NowPlaying,
    /// Poll a running endpoint and print the tile whenever it changes
    Poll {
        /// Endpoint URL (defaults to the local server)
        #[arg(long)]
        url: Option<String>,
        /// Seconds between polls
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Print current weather conditions
    Conditions,
    /// Force one refresh-token exchange to check credentials
    AuthTest,
    /// Validate config file and exit
    ConfigValidate,
}

/// Explicit --config wins; otherwise /etc/now-playing/config.toml if present,
/// else defaults. The environment overlays whichever was chosen.
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let etc_path = Path::new("/etc/now-playing/config.toml");
            etc_path.exists().then(|| etc_path.to_path_buf())
        }
    };
    let mut cfg = match &path {
        Some(p) => Config::from_path(p).with_context(|| format!("loading config from {}", p.display()))?,
        None => Config::default(),
    };
    cfg.apply_env(|key| std::env::var(key).ok());
    Ok(cfg)
}

fn init_logging(cfg: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Initialize log->tracing bridge and structured logging.
    // Logs go to both stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender = tracing_appender::rolling::daily(&cfg.log_dir, "now-playing.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;
    Ok(guard)
}

fn spotify_provider(cfg: &Config, clock: Arc<dyn Clock>) -> Result<SpotifyProvider> {
    SpotifyProvider::from_config(cfg, Arc::new(TokenCache::new()), clock)
        .context("building spotify provider")
}

fn demo_provider(clock: &dyn Clock) -> MockProvider {
    MockProvider::new().with_current(MockReply::Ok(Some(NowPlayingPayload {
        is_playing: true,
        track_name: "Windowlicker".into(),
        artists: "Aphex Twin".into(),
        album_name: "Windowlicker".into(),
        album_image_url: String::new(),
        track_url: lib::models::DEFAULT_TRACK_URL.into(),
        last_updated: iso_timestamp(clock.now()),
    })))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    let _guard = match cli.command {
        Commands::ConfigValidate => None,
        _ => Some(init_logging(&cfg)?),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Commands::Serve { mock } => {
            let provider: Arc<dyn NowPlayingProvider> = if mock {
                info!("serving canned now-playing data");
                Arc::new(demo_provider(clock.as_ref()))
            } else {
                Arc::new(spotify_provider(&cfg, clock.clone())?)
            };
            let state = lib::server::AppState::new(&cfg, provider, clock);
            lib::server::serve(&cfg, state).await.context("running server")?;
        }
        Commands::NowPlaying => {
            let provider = spotify_provider(&cfg, clock.clone())?;
            if !provider.is_configured() {
                anyhow::bail!("spotify credentials are not configured");
            }
            let payload = lib::api::fetch_now_playing(&provider, clock.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Poll { url, interval } => {
            let url = url.unwrap_or_else(|| format!("http://{}{}", cfg.bind_addr, cfg.route));
            let interval = Duration::from_secs(interval.unwrap_or(cfg.poll_interval_sec).max(1));
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.upstream_timeout_sec))
                .build()?;
            let poller = lib::poller::Poller::new(client, &url);
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            poller
                .run(interval, shutdown, |view| println!("{}", view.render_line()))
                .await;
        }
        Commands::Conditions => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.upstream_timeout_sec))
                .build()?;
            let (view, fetched_at) = match lib::weather::fetch_current_conditions(&client, &cfg.weather).await {
                Ok(c) => (lib::weather::ConditionsView::from_conditions(&c), Some(clock.now())),
                Err(e) => {
                    tracing::warn!("weather fetch failed: {}", e);
                    (lib::weather::ConditionsView::unavailable(), None)
                }
            };
            println!("{}", lib::weather::local_clock(clock.now(), &cfg.weather.timezone)?);
            println!("{} ({})", view.temperature, view.condition);
            println!("{}", view.feels_like);
            println!("{}", view.humidity);
            println!("{}", view.wind);
            println!("{}", lib::weather::freshness_label(true, fetched_at, clock.now()));
        }
        Commands::AuthTest => {
            let provider = spotify_provider(&cfg, clock.clone())?;
            if !provider.is_configured() {
                anyhow::bail!("spotify credentials are not configured");
            }
            let token = provider.token_provider().exchange().await?;
            println!("Token exchange OK, expires at {}", iso_timestamp(token.expires_at));
        }
        Commands::ConfigValidate => {
            // load_config already parsed the file
            println!("OK");
        }
    }

    Ok(())
}
