//! Origin policy for the widget endpoint: an explicit allow-list, `*`, or
//! (when nothing is configured) the request's own origin.

use axum::http::{header, HeaderMap, HeaderValue};

pub const ALLOW_METHODS: &str = "GET,OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedOrigins {
    origins: Vec<String>,
}

impl AllowedOrigins {
    /// Split a comma-separated setting; blanks are dropped. An empty result
    /// falls back to `self_origin`.
    pub fn resolve(setting: &str, self_origin: &str) -> Self {
        let mut origins: Vec<String> = setting
            .split(',')
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
        if origins.is_empty() {
            origins.push(self_origin.to_string());
        }
        Self { origins }
    }

    pub fn is_wildcard(&self) -> bool {
        self.origins.iter().any(|o| o == "*")
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    /// Value for `Access-Control-Allow-Origin`.
    pub fn response_origin(&self, request_origin: Option<&str>) -> String {
        if self.is_wildcard() {
            return "*".into();
        }
        match request_origin {
            Some(o) if self.contains(o) => o.to_string(),
            // never empty: resolve() guarantees one entry
            _ => self.origins.first().cloned().unwrap_or_default(),
        }
    }

    /// A request without an `Origin` header is judged by its own origin.
    pub fn is_allowed(&self, request_origin: Option<&str>, self_origin: &str) -> bool {
        if self.is_wildcard() {
            return true;
        }
        self.contains(request_origin.unwrap_or(self_origin))
    }
}

/// `scheme://host[:port]` of the endpoint itself, from the `Host` header and
/// `X-Forwarded-Proto` (reverse proxies terminate TLS in front of us).
pub fn self_origin(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "http".into());
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}", scheme, host)
}

pub fn request_origin(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::ORIGIN).and_then(|v| v.to_str().ok())
}

/// CORS headers shared by every response, preflight included.
pub fn cors_headers(origin: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    let origin = HeaderValue::from_str(origin).unwrap_or_else(|_| HeaderValue::from_static("*"));
    h.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    h.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    h.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    h.insert(header::VARY, HeaderValue::from_static("Origin"));
    h
}
