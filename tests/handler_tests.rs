use chrono::{Duration, TimeZone, Utc};
use mockito::{Matcher, Server};
use now_playing_widget::api::mock::{MockProvider, MockReply};
use now_playing_widget::api::spotify::{Endpoints, SpotifyProvider};
use now_playing_widget::api::spotify_auth::{CachedToken, Credentials, TokenCache};
use now_playing_widget::api::NowPlayingProvider;
use now_playing_widget::config::Config;
use now_playing_widget::models::NowPlayingPayload;
use now_playing_widget::server::{build_router, AppState};
use now_playing_widget::util::{Clock, ManualClock};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;

const ROUTE: &str = "/api/spotify-now-playing";

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()))
}

fn state(provider: Arc<dyn NowPlayingProvider>, allowed_origin: &str, clock: Arc<ManualClock>) -> AppState {
    let cfg = Config { allowed_origin: allowed_origin.into(), ..Config::default() };
    AppState::new(&cfg, provider, clock)
}

async fn spawn(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state, ROUTE);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn spotify(base: &str, cache: Arc<TokenCache>, clock: Arc<ManualClock>) -> Arc<dyn NowPlayingProvider> {
    Arc::new(SpotifyProvider::new(
        reqwest::Client::new(),
        Endpoints::single(base),
        Credentials::new("cid", "csecret", "refresh"),
        Some(cache),
        clock,
        Duration::seconds(30),
    ))
}

fn track_json(name: &str) -> Value {
    json!({
        "name": name,
        "artists": [{"name": "Khruangbin"}, {"name": "Leon Bridges"}],
        "album": {"name": "Texas Sun", "images": [{"url": "https://i.scdn.co/image/ts"}]},
        "external_urls": {"spotify": "https://open.spotify.com/track/ts"}
    })
}

fn header<'a>(resp: &'a reqwest::Response, name: &str) -> &'a str {
    resp.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

#[tokio::test]
async fn scenario_a_cached_token_and_track_playing() {
    let mut server = Server::new_async().await;
    let token = server.mock("POST", "/api/token").expect(0).create_async().await;
    let current = server
        .mock("GET", "/me/player/currently-playing")
        .match_header("authorization", "Bearer cached")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"is_playing": true, "item": track_json("Texas Sun")}).to_string())
        .expect(1)
        .create_async()
        .await;
    let recent = server
        .mock("GET", "/me/player/recently-played")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let clock = clock();
    let cache = Arc::new(TokenCache::with_token(CachedToken {
        access_token: "cached".into(),
        expires_at: clock.now() + Duration::minutes(30),
    }));
    let base = spawn(state(spotify(&server.url(), cache, clock.clone()), "", clock)).await;

    let resp = reqwest::get(format!("{}{}", base, ROUTE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "content-type"), "application/json; charset=utf-8");
    assert_eq!(header(&resp, "cache-control"), "public, max-age=10");
    let body: NowPlayingPayload = resp.json().await.unwrap();
    assert!(body.is_playing);
    assert_eq!(body.track_name, "Texas Sun");
    assert_eq!(body.artists, "Khruangbin, Leon Bridges");
    assert_eq!(body.album_name, "Texas Sun");
    assert_eq!(body.album_image_url, "https://i.scdn.co/image/ts");
    assert_eq!(body.track_url, "https://open.spotify.com/track/ts");
    assert_eq!(body.last_updated, "2024-06-01T08:00:00.000Z");

    token.assert_async().await;
    current.assert_async().await;
    recent.assert_async().await;
}

#[tokio::test]
async fn scenario_b_nothing_current_falls_back_to_history() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": "fresh", "expires_in": 3600}).to_string())
        .create_async()
        .await;
    let _current = server
        .mock("GET", "/me/player/currently-playing")
        .with_status(204)
        .create_async()
        .await;
    let recent = server
        .mock("GET", "/me/player/recently-played")
        .match_query(Matcher::UrlEncoded("limit".into(), "1".into()))
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [{"track": track_json("People Everywhere")}]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let clock = clock();
    let base = spawn(state(spotify(&server.url(), Arc::new(TokenCache::new()), clock.clone()), "", clock)).await;

    let resp = reqwest::get(format!("{}{}", base, ROUTE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: NowPlayingPayload = resp.json().await.unwrap();
    assert!(!body.is_playing);
    assert_eq!(body.track_name, "People Everywhere");
    recent.assert_async().await;
}

#[tokio::test]
async fn paused_track_is_served_without_history_lookup() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": "fresh", "expires_in": 3600}).to_string())
        .create_async()
        .await;
    let current = server
        .mock("GET", "/me/player/currently-playing")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"is_playing": false, "item": track_json("Two Fish and an Elephant")}).to_string())
        .expect(1)
        .create_async()
        .await;
    let recent = server
        .mock("GET", "/me/player/recently-played")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let clock = clock();
    let base = spawn(state(spotify(&server.url(), Arc::new(TokenCache::new()), clock.clone()), "", clock)).await;

    let resp = reqwest::get(format!("{}{}", base, ROUTE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: NowPlayingPayload = resp.json().await.unwrap();
    assert!(!body.is_playing);
    assert_eq!(body.track_name, "Two Fish and an Elephant");
    assert_eq!(body.artists, "Khruangbin, Leon Bridges");
    current.assert_async().await;
    recent.assert_async().await;
}

#[tokio::test]
async fn scenario_c_empty_upstream_serves_placeholder() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": "fresh", "expires_in": 3600}).to_string())
        .create_async()
        .await;
    let _current = server
        .mock("GET", "/me/player/currently-playing")
        .with_status(204)
        .create_async()
        .await;
    let _recent = server
        .mock("GET", "/me/player/recently-played")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": []}).to_string())
        .create_async()
        .await;

    let clock = clock();
    let base = spawn(state(spotify(&server.url(), Arc::new(TokenCache::new()), clock.clone()), "", clock)).await;

    let resp = reqwest::get(format!("{}{}", base, ROUTE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "isPlaying": false,
            "trackName": "Nothing playing right now",
            "artists": "Start a Spotify track to update this tile.",
            "albumName": "",
            "albumImageUrl": "",
            "trackUrl": "https://open.spotify.com",
            "lastUpdated": "2024-06-01T08:00:00.000Z"
        })
    );
}

#[tokio::test]
async fn scenario_d_rejected_token_is_502() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .create_async()
        .await;
    let current = server
        .mock("GET", "/me/player/currently-playing")
        .expect(0)
        .create_async()
        .await;

    let clock = clock();
    let base = spawn(state(spotify(&server.url(), Arc::new(TokenCache::new()), clock.clone()), "", clock)).await;

    let resp = reqwest::get(format!("{}{}", base, ROUTE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(header(&resp, "cache-control"), "public, max-age=10");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "spotify_unavailable"}));
    current.assert_async().await;
}

#[tokio::test]
async fn currently_playing_failure_is_502() {
    let mock = Arc::new(MockProvider::new().with_current(MockReply::Fail("boom".into())));
    let base = spawn(state(mock.clone(), "*", clock())).await;

    let resp = reqwest::get(format!("{}{}", base, ROUTE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(mock.recent_calls(), 0);
}

#[tokio::test]
async fn preflight_is_204_without_upstream_calls() {
    let mock = Arc::new(MockProvider::new());
    let base = spawn(state(mock.clone(), "https://site.example", clock())).await;

    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}{}", base, ROUTE))
        .header("origin", "https://site.example")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(header(&resp, "access-control-allow-origin"), "https://site.example");
    assert_eq!(header(&resp, "access-control-allow-methods"), "GET,OPTIONS");
    assert_eq!(header(&resp, "access-control-allow-headers"), "Content-Type");
    assert_eq!(header(&resp, "vary"), "Origin");
    assert!(resp.bytes().await.unwrap().is_empty());
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn disallowed_origin_is_403_without_upstream_calls() {
    let mock = Arc::new(MockProvider::new());
    let base = spawn(state(mock.clone(), "https://site.example", clock())).await;

    let resp = reqwest::Client::new()
        .get(format!("{}{}", base, ROUTE))
        .header("origin", "https://evil.example")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(header(&resp, "access-control-allow-origin"), "https://site.example");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "origin_not_allowed"}));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn disallowed_origin_wins_over_preflight_and_method() {
    let mock = Arc::new(MockProvider::unconfigured());
    let base = spawn(state(mock.clone(), "https://site.example", clock())).await;
    let client = reqwest::Client::new();

    for method in [reqwest::Method::OPTIONS, reqwest::Method::POST, reqwest::Method::GET] {
        let resp = client
            .request(method, format!("{}{}", base, ROUTE))
            .header("origin", "https://evil.example")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn non_get_method_is_405() {
    let mock = Arc::new(MockProvider::new());
    let base = spawn(state(mock.clone(), "*", clock())).await;

    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, ROUTE))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(header(&resp, "access-control-allow-origin"), "*");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "method_not_allowed"}));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn missing_credentials_is_500() {
    let mock = Arc::new(MockProvider::unconfigured());
    let base = spawn(state(mock.clone(), "", clock())).await;

    let resp = reqwest::get(format!("{}{}", base, ROUTE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": "spotify_not_configured"}));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn same_origin_request_without_origin_header_is_allowed() {
    let mock = Arc::new(MockProvider::new());
    let base = spawn(state(mock.clone(), "", clock())).await;

    let resp = reqwest::get(format!("{}{}", base, ROUTE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // echoes the endpoint's own origin
    assert_eq!(header(&resp, "access-control-allow-origin"), base);
    let body: NowPlayingPayload = resp.json().await.unwrap();
    assert_eq!(body.track_name, "Nothing playing right now");
    assert_eq!(mock.token_calls(), 1);
    assert_eq!(mock.current_calls(), 1);
    assert_eq!(mock.recent_calls(), 1);
}

#[tokio::test]
async fn wildcard_origin_is_reflected_as_star() {
    let mock = Arc::new(MockProvider::new());
    let base = spawn(state(mock, "*", clock())).await;

    let resp = reqwest::Client::new()
        .get(format!("{}{}", base, ROUTE))
        .header("origin", "https://anywhere.example")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "access-control-allow-origin"), "*");
    assert_eq!(header(&resp, "vary"), "Origin");
}

#[tokio::test]
async fn health_reports_version() {
    let base = spawn(state(Arc::new(MockProvider::new()), "", clock())).await;

    let body: Value = reqwest::get(format!("{}/health", base)).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
