use thiserror::Error;

/// Errors surfaced to gateway callers as HTTP error responses.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route matches path {path}")]
    RouteNotFound { path: String },
    #[error("upstream {upstream} is unavailable: {reason}")]
    UpstreamUnavailable { upstream: String, reason: String },
    #[error("upstream {upstream} did not respond in time")]
    UpstreamTimeout { upstream: String },
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("failed to read request body: {reason}")]
    RequestBodyUnreadable { reason: String },
    #[error("invalid upstream request for {url}: {reason}")]
    InvalidUpstreamRequest { url: String, reason: String },
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RequestBodyUnreadable { .. } => 400,
            Self::RouteNotFound { .. } => 404,
            Self::PayloadTooLarge { .. } => 413,
            Self::InvalidUpstreamRequest { .. } => 500,
            Self::UpstreamUnavailable { .. } => 502,
            Self::UpstreamTimeout { .. } => 504,
        }
    }
}
