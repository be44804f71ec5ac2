//! Provider error types.
//!
//! The enum lives in `neuroscreen-core` so the question generator can
//! downcast it; it is re-exported here for provider implementations.

pub use neuroscreen_core::error::ProviderError;

/// Map a transport failure to a `ProviderError`.
pub(crate) fn transport_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

/// Read the `retry-after` header of a 429 response, in milliseconds.
pub(crate) fn retry_after_ms(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5)
        .saturating_mul(1000)
}
