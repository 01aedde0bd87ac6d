//! Small helpers for input validation and bounded collaborator calls.

use regex::Regex;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use super::error::{DirectoryError, ProviderError};

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Run a directory call with a deadline.
pub(crate) async fn directory_call<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, DirectoryError>
where
    F: Future<Output = Result<T, DirectoryError>>,
{
    if let Ok(result) = timeout(limit, call).await {
        result
    } else {
        warn!(operation, "directory call timed out");
        Err(DirectoryError::Timeout)
    }
}

/// Run a provider call with a deadline.
pub(crate) async fn provider_call<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    if let Ok(result) = timeout(limit, call).await {
        result
    } else {
        warn!(operation, "provider call timed out");
        Err(ProviderError::Timeout)
    }
}
