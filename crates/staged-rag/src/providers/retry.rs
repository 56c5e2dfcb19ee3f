//! Exponential-backoff retry shared by the HTTP provider clients

use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{Error, Result};

/// Retry an operation up to `max_retries` extra times, doubling the delay
/// (1s, 2s, 4s, ...) between attempts. Errors that are not retryable are
/// returned immediately.
pub(crate) async fn with_retries<F, Fut, T>(provider: &str, max_retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt < max_retries {
                    let delay = Duration::from_secs(2u64.pow(attempt));
                    tracing::warn!(
                        "{} request failed (attempt {}/{}): {}; retrying in {:?}",
                        provider,
                        attempt + 1,
                        max_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::llm(format!("{} request failed", provider))))
}

/// Map a non-success status to an error
///
/// Client errors other than 429 become `Error::Rejected`; everything else
/// goes through `transient` and stays retryable.
pub(crate) fn status_error(
    provider: &str,
    status: StatusCode,
    message: String,
    transient: fn(String) -> Error,
) -> Error {
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        Error::Rejected {
            provider: provider.to_string(),
            status: status.as_u16(),
            message,
        }
    } else {
        transient(format!("{} returned {}: {}", provider, status, message))
    }
}
