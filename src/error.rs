use axum::http::StatusCode;

/// Failures surfaced to widget clients. Upstream auth and playback failures
/// are all reported as `Unavailable`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("spotify credentials are not configured")]
    ConfigError,
    #[error("origin {0:?} is not allowed")]
    OriginNotAllowed(Option<String>),
    #[error("method {0} is not allowed")]
    MethodNotAllowed(String),
    #[error("spotify unavailable: {0}")]
    Unavailable(#[from] crate::api::ProviderError),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::ConfigError => StatusCode::INTERNAL_SERVER_ERROR,
            HandlerError::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            HandlerError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            HandlerError::Unavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable code for the `{"error": ..}` body.
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::ConfigError => "spotify_not_configured",
            HandlerError::OriginNotAllowed(_) => "origin_not_allowed",
            HandlerError::MethodNotAllowed(_) => "method_not_allowed",
            HandlerError::Unavailable(_) => "spotify_unavailable",
        }
    }
}
