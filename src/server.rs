use crate::api::{fetch_now_playing, NowPlayingProvider};
use crate::config::Config;
use crate::cors::{self, AllowedOrigins};
use crate::error::HandlerError;
use crate::models::ErrorBody;
use crate::util::Clock;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{Json, Response},
    routing::{any, get},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Shared per-process state. The only mutable part lives inside the
/// provider (its token cache).
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn NowPlayingProvider>,
    pub clock: Arc<dyn Clock>,
    pub allowed_origin: String,
    pub cache_max_age_sec: u64,
}

impl AppState {
    pub fn new(cfg: &Config, provider: Arc<dyn NowPlayingProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            clock,
            allowed_origin: cfg.allowed_origin.clone(),
            cache_max_age_sec: cfg.cache_max_age_sec,
        }
    }
}

pub fn build_router(state: AppState, route: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(route, any(now_playing))
        .with_state(state)
}

/// Bind `cfg.bind_addr` and serve until Ctrl-C.
pub async fn serve(cfg: &Config, state: AppState) -> Result<()> {
    let addr: SocketAddr = cfg
        .bind_addr
        .parse()
        .with_context(|| format!("parsing bind address {}", cfg.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("now-playing endpoint listening on http://{}{}", addr, cfg.route);

    axum::serve(listener, build_router(state, &cfg.route))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn now_playing(State(state): State<AppState>, method: Method, headers: HeaderMap) -> Response {
    let span = info_span!("now_playing", request_id = %Uuid::new_v4(), %method);
    handle(state, method, headers).instrument(span).await
}

async fn handle(state: AppState, method: Method, headers: HeaderMap) -> Response {
    let self_origin = cors::self_origin(&headers);
    let request_origin = cors::request_origin(&headers);
    let allowed = AllowedOrigins::resolve(&state.allowed_origin, &self_origin);
    let origin = allowed.response_origin(request_origin);

    if !allowed.is_allowed(request_origin, &self_origin) {
        let e = HandlerError::OriginNotAllowed(request_origin.map(String::from));
        warn!("{}", e);
        return error_response(&e, &origin, state.cache_max_age_sec);
    }

    if method == Method::OPTIONS {
        let mut resp = Response::new(Body::empty());
        *resp.status_mut() = StatusCode::NO_CONTENT;
        resp.headers_mut().extend(cors::cors_headers(&origin));
        return resp;
    }

    if method != Method::GET {
        let e = HandlerError::MethodNotAllowed(method.to_string());
        return error_response(&e, &origin, state.cache_max_age_sec);
    }

    if !state.provider.is_configured() {
        let e = HandlerError::ConfigError;
        error!("{}", e);
        return error_response(&e, &origin, state.cache_max_age_sec);
    }

    match fetch_now_playing(state.provider.as_ref(), state.clock.as_ref()).await {
        Ok(payload) => json_response(StatusCode::OK, &payload, &origin, state.cache_max_age_sec),
        Err(e) => {
            let e = HandlerError::from(e);
            error!("now-playing request failed: {}", e);
            error_response(&e, &origin, state.cache_max_age_sec)
        }
    }
}

fn error_response(e: &HandlerError, origin: &str, max_age: u64) -> Response {
    let body = ErrorBody { error: e.code().to_string() };
    json_response(e.status(), &body, origin, max_age)
}

fn json_response<T: Serialize>(status: StatusCode, body: &T, origin: &str, max_age: u64) -> Response {
    let bytes = match serde_json::to_vec(body) {
        Ok(b) => b,
        Err(e) => {
            error!("failed to serialize response body: {}", e);
            br#"{"error":"spotify_unavailable"}"#.to_vec()
        }
    };
    let mut resp = Response::new(Body::from(bytes));
    *resp.status_mut() = status;
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
    if let Ok(v) = HeaderValue::from_str(&format!("public, max-age={}", max_age)) {
        h.insert(header::CACHE_CONTROL, v);
    }
    h.extend(cors::cors_headers(origin));
    resp
}
