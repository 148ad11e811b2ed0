use std::time::Duration;

/// Failures of the language-model collaborator.
/// Classified as retryable or terminal so wrappers can decide whether to try again.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ModelError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Network(_)
        )
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::Server { .. } => "server_error",
            Self::Network(_) => "network_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Authentication(body),
            429 => Self::RateLimited { retry_after: None },
            500..=599 => Self::Server { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ModelError::RateLimited { retry_after: None }.is_retryable());
        assert!(ModelError::Server { status: 503, body: String::new() }.is_retryable());
        assert!(ModelError::Network("reset".into()).is_retryable());
        assert!(!ModelError::Authentication("bad key".into()).is_retryable());
        assert!(!ModelError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn from_status_mapping() {
        assert!(matches!(ModelError::from_status(401, "x".into()), ModelError::Authentication(_)));
        assert!(matches!(ModelError::from_status(429, "x".into()), ModelError::RateLimited { .. }));
        assert!(matches!(ModelError::from_status(502, "x".into()), ModelError::Server { status: 502, .. }));
        assert!(matches!(ModelError::from_status(400, "x".into()), ModelError::InvalidRequest(_)));
    }

    #[test]
    fn suggested_delay_only_for_rate_limit() {
        let rl = ModelError::RateLimited { retry_after: Some(Duration::from_secs(2)) };
        assert_eq!(rl.suggested_delay(), Some(Duration::from_secs(2)));
        assert_eq!(ModelError::Network("x".into()).suggested_delay(), None);
    }

    #[test]
    fn timeout_has_distinct_kind() {
        assert_eq!(ModelError::Timeout(Duration::from_secs(30)).error_kind(), "timeout");
    }
}
