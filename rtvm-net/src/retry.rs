// rtvm-net/src/retry.rs
use std::thread;

use rtvm_common::config::RetryPolicy;
use rtvm_common::error::{Result, RtvmError};
use tracing::{debug, warn};

/// Runs `attempt_fn(base, attempt)` against each base in order, up to
/// `policy.attempts_per_base` times per base, sleeping `attempt x step`
/// after each failed attempt. The first success wins; when every attempt
/// fails the last error is returned. A non-retryable error stops the loop
/// immediately.
pub fn with_fallback<T, F>(
    bases: &[String],
    policy: &RetryPolicy,
    what: &str,
    mut attempt_fn: F,
) -> Result<T>
where
    F: FnMut(&str, u32) -> Result<T>,
{
    let mut last_error: Option<RtvmError> = None;

    for (base_index, base) in bases.iter().enumerate() {
        let is_last_base = base_index + 1 == bases.len();
        for attempt in 1..=policy.attempts_per_base {
            debug!("Fetching {} from {} (attempt {})", what, base, attempt);
            match attempt_fn(base, attempt) {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    debug!("Non-retryable failure fetching {} from {}: {}", what, base, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} to fetch {} from {} failed: {}",
                        attempt, policy.attempts_per_base, what, base, e
                    );
                    last_error = Some(e);
                    let is_final = is_last_base && attempt == policy.attempts_per_base;
                    if !is_final {
                        thread::sleep(policy.backoff_for(attempt));
                    }
                }
            }
        }
        if !is_last_base {
            debug!("All attempts against {} failed; falling back to next base", base);
        }
    }

    Err(last_error.unwrap_or_else(|| {
        RtvmError::Network(what.to_string(), "no base locations configured".to_string())
    }))
}
