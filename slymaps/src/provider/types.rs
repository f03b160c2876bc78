//! Provider error taxonomy and response helpers.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::rate_limit::RateLimitError;

use super::http::HttpResponse;

/// Longest raw-text error body carried into an error message.
const MAX_ERROR_TEXT: usize = 200;

/// Credential values shipped in sample configs.
const PLACEHOLDER_KEYS: &[&str] = &["changeme", "placeholder", "xxx", "<api_key>", "pk.xxx"];

/// Whether an API key or token is missing or a sample-config placeholder.
pub fn is_placeholder_key(key: &str) -> bool {
    let key = key.trim().to_lowercase();
    key.is_empty()
        || key.starts_with("your")
        || key.starts_with("pk.your")
        || PLACEHOLDER_KEYS.contains(&key.as_str())
}

/// Errors raised by provider adapters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Missing or placeholder credentials / endpoints. Raised before any I/O.
    #[error("{provider} is not configured: {message}")]
    Config {
        provider: &'static str,
        message: String,
    },

    /// Local limiter or remote 429.
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Non-2xx response.
    #[error("{provider} request failed (HTTP {status}): {message}")]
    Http {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Connection, DNS, TLS or timeout failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not match the expected shape.
    #[error("Failed to decode {provider} response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    /// Invalid arguments supplied by the caller.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider answered but had nothing for the request.
    #[error("{0}")]
    NotFound(String),

    /// The caller's cancellation token fired.
    #[error("Request cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn config(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Config {
            provider,
            message: message.into(),
        }
    }

    pub fn decode(provider: &'static str, message: impl ToString) -> Self {
        ProviderError::Decode {
            provider,
            message: message.to_string(),
        }
    }

    /// Transient failures worth retrying. Rate limits are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(_) => true,
            ProviderError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

impl From<RateLimitError> for ProviderError {
    fn from(e: RateLimitError) -> Self {
        ProviderError::RateLimited {
            message: e.to_string(),
            retry_after: Some(e.retry_after()),
        }
    }
}

/// Turn a non-2xx response into one descriptive error.
pub(crate) fn check_response(
    provider: &'static str,
    response: HttpResponse,
) -> Result<Vec<u8>, ProviderError> {
    if response.is_success() {
        return Ok(response.body);
    }

    if response.status == 429 {
        return Err(ProviderError::RateLimited {
            message: format!(
                "Too many requests to {}. Please wait a moment and try again.",
                provider
            ),
            retry_after: None,
        });
    }

    let message = extract_error_message(&response.body)
        .unwrap_or_else(|| format!("Unexpected response status {}", response.status));

    tracing::debug!(provider, status = response.status, %message, "Provider returned error");

    Err(ProviderError::Http {
        provider,
        status: response.status,
        message,
    })
}

/// Pull a human-readable message out of an error body.
///
/// Tries common JSON shapes first (`message`, `error`, `error.message`,
/// `text`), then falls back to the raw text.
pub(crate) fn extract_error_message(body: &[u8]) -> Option<String> {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let candidates = [
            json.get("message"),
            json.get("error").and_then(|e| e.get("message")),
            json.get("error"),
            json.get("text"),
            json.get("remark"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str().filter(|s| !s.trim().is_empty()) {
                return Some(text.trim().to_string());
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(MAX_ERROR_TEXT).collect())
}

/// Deserialize a JSON body.
pub(crate) fn decode_json<T: DeserializeOwned>(
    provider: &'static str,
    body: &[u8],
) -> Result<T, ProviderError> {
    serde_json::from_slice(body).map_err(|e| ProviderError::decode(provider, e))
}

/// Race `request` against the cancellation token.
pub async fn cancellable<T, F>(cancel: &CancellationToken, request: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    if cancel.is_cancelled() {
        return Err(ProviderError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        result = request => result,
    }
}
