//! LLM provider seam.

mod openai;

pub use openai::OpenAiProvider;

use std::fmt;

use async_trait::async_trait;

/// Chat-completion provider producing a JSON document.
///
/// The trait is the seam that lets plan generation run against a scripted
/// stub in tests; the one production impl is [`OpenAiProvider`].
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send one system + user prompt pair and return the raw message
    /// content, which the provider was instructed to emit as JSON.
    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
}

/// Classified provider error — tells the caller *why* the LLM call failed
/// so it can decide whether another attempt is worth it.
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 401/403 — bad API key or permissions.
    Auth,
    /// 429 — rate limited.
    RateLimit,
    /// 408, request timeout, or provider took too long.
    Timeout,
    /// Connection refused, DNS failure, reset, etc.
    Network,
    /// 500/502/503/504 — provider-side outage.
    ServerError,
    /// Anything else.
    Unknown,
}

impl ProviderError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Auth,
            408 => ProviderErrorKind::Timeout,
            429 => ProviderErrorKind::RateLimit,
            500 | 502 | 503 | 504 => ProviderErrorKind::ServerError,
            _ => ProviderErrorKind::Unknown,
        };
        Self {
            kind,
            status: Some(status),
            message: truncate_body(body),
        }
    }

    pub fn network(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else {
            ProviderErrorKind::Network
        };
        Self {
            kind,
            status: None,
            message: err.to_string(),
        }
    }

    /// Whether this error is worth retrying with the same request.
    #[allow(dead_code)]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::RateLimit
                | ProviderErrorKind::Timeout
                | ProviderErrorKind::Network
                | ProviderErrorKind::ServerError
        )
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(
                f,
                "Provider error ({}, {:?}): {}",
                status, self.kind, self.message
            )
        } else {
            write!(f, "Provider error ({:?}): {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ProviderError {}

fn truncate_body(body: &str) -> String {
    crate::utils::truncate_str(body, 300)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_classify() {
        assert_eq!(
            ProviderError::from_status(401, "").kind,
            ProviderErrorKind::Auth
        );
        assert_eq!(
            ProviderError::from_status(429, "").kind,
            ProviderErrorKind::RateLimit
        );
        assert_eq!(
            ProviderError::from_status(503, "").kind,
            ProviderErrorKind::ServerError
        );
        assert_eq!(
            ProviderError::from_status(418, "").kind,
            ProviderErrorKind::Unknown
        );
    }

    #[test]
    fn retryability_matches_kind() {
        assert!(ProviderError::from_status(429, "").is_retryable());
        assert!(ProviderError::from_status(500, "").is_retryable());
        assert!(!ProviderError::from_status(401, "").is_retryable());
        assert!(!ProviderError::from_status(418, "").is_retryable());
    }
}
