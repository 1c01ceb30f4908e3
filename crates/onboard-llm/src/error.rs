use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider unavailable (status {status})")]
    Unavailable { status: u16 },

    #[error("{provider} request rejected (status {status}): {message}")]
    Rejected {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: String },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether the failure is worth retrying: rate limits, timeouts,
    /// connection failures and server-side errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Unavailable { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Server-provided hint for how long to wait before the next attempt.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_timeout_are_transient() {
        assert!(LlmError::RateLimited { retry_after: None }.is_transient());
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(LlmError::Unavailable { status: 503 }.is_transient());
    }

    #[test]
    fn malformed_request_is_not_transient() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(!LlmError::Http(err).is_transient());
    }

    #[test]
    fn rejected_and_unsupported_are_not_transient() {
        let rejected = LlmError::Rejected {
            provider: "openai".into(),
            status: 401,
            message: "bad key".into(),
        };
        assert!(!rejected.is_transient());
        assert!(
            !LlmError::EmbedUnsupported {
                provider: "mock".into()
            }
            .is_transient()
        );
        assert!(!LlmError::Other("boom".into()).is_transient());
    }

    #[test]
    fn retry_after_only_for_rate_limit() {
        let hint = Duration::from_secs(3);
        assert_eq!(
            LlmError::RateLimited {
                retry_after: Some(hint)
            }
            .retry_after(),
            Some(hint)
        );
        assert_eq!(LlmError::Unavailable { status: 502 }.retry_after(), None);
    }
}
