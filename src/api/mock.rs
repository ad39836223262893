use super::{NowPlayingProvider, ProviderError};
use crate::models::NowPlayingPayload;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::info;

/// Scripted outcome for one mock endpoint.
#[derive(Debug, Clone)]
pub enum MockReply<T> {
    Ok(T),
    /// Fails with `ProviderError::Auth` / `ProviderError::Upstream` carrying this message.
    Fail(String),
}

/// A provider with canned answers, used in tests and `serve --mock`.
/// It logs operations and counts calls so tests can assert on upstream traffic.
pub struct MockProvider {
    configured: bool,
    token: Mutex<MockReply<String>>,
    current: Mutex<MockReply<Option<NowPlayingPayload>>>,
    recent: Mutex<MockReply<Option<NowPlayingPayload>>>,
    token_calls: AtomicUsize,
    current_calls: AtomicUsize,
    recent_calls: AtomicUsize,
}

impl MockProvider {
    /// Configured, token "mock-token", and nothing playing anywhere.
    pub fn new() -> Self {
        Self {
            configured: true,
            token: Mutex::new(MockReply::Ok("mock-token".into())),
            current: Mutex::new(MockReply::Ok(None)),
            recent: Mutex::new(MockReply::Ok(None)),
            token_calls: AtomicUsize::new(0),
            current_calls: AtomicUsize::new(0),
            recent_calls: AtomicUsize::new(0),
        }
    }

    pub fn unconfigured() -> Self {
        Self { configured: false, ..Self::new() }
    }

    pub fn with_token(self, reply: MockReply<String>) -> Self {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = reply;
        self
    }

    pub fn with_current(self, reply: MockReply<Option<NowPlayingPayload>>) -> Self {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = reply;
        self
    }

    pub fn with_recent(self, reply: MockReply<Option<NowPlayingPayload>>) -> Self {
        *self.recent.lock().unwrap_or_else(|e| e.into_inner()) = reply;
        self
    }

    /// Total number of upstream calls of any kind.
    pub fn calls(&self) -> usize {
        self.token_calls() + self.current_calls() + self.recent_calls()
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    pub fn recent_calls(&self) -> usize {
        self.recent_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NowPlayingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        info!("MockProvider: access_token");
        match &*self.token.lock().unwrap_or_else(|e| e.into_inner()) {
            MockReply::Ok(t) => Ok(t.clone()),
            MockReply::Fail(msg) => Err(ProviderError::Auth(msg.clone())),
        }
    }

    async fn currently_playing(&self, _token: &str) -> Result<Option<NowPlayingPayload>, ProviderError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        info!("MockProvider: currently_playing");
        match &*self.current.lock().unwrap_or_else(|e| e.into_inner()) {
            MockReply::Ok(p) => Ok(p.clone()),
            MockReply::Fail(msg) => Err(ProviderError::Upstream(msg.clone())),
        }
    }

    async fn recently_played(&self, _token: &str) -> Result<Option<NowPlayingPayload>, ProviderError> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);
        info!("MockProvider: recently_played");
        match &*self.recent.lock().unwrap_or_else(|e| e.into_inner()) {
            MockReply::Ok(p) => Ok(p.clone()),
            MockReply::Fail(msg) => Err(ProviderError::Upstream(msg.clone())),
        }
    }
}
