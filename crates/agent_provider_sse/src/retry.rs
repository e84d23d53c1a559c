use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Maximum retry attempts after an initial request attempt.
pub const MAX_RETRIES: u32 = 3;
/// Base delay before the first retry.
pub const BASE_DELAY_MS: u64 = 1000;

fn retryable_text_regex() -> Option<&'static Regex> {
    static CACHED: OnceLock<Option<Regex>> = OnceLock::new();
    CACHED
        .get_or_init(|| {
            Regex::new(
                r"(?i)rate.?limit|overloaded|service.?unavailable|upstream.?connect|connection.?refused",
            )
            .ok()
        })
        .as_ref()
}

/// Status/body retry policy for transient failures.
pub fn is_retryable_http_error(status: u16, error_text: &str) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
        || retryable_text_regex().is_some_and(|regex| regex.is_match(error_text))
}

/// Exponential backoff: `base * 2^attempt`.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.min(16)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{is_retryable_http_error, retry_delay, BASE_DELAY_MS};

    #[test]
    fn retryable_statuses_and_texts() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_http_error(status, ""), "{status}");
        }
        assert!(is_retryable_http_error(400, "Rate limit reached"));
        assert!(is_retryable_http_error(400, "model is OVERLOADED"));
        assert!(!is_retryable_http_error(400, "invalid messages"));
        assert!(!is_retryable_http_error(401, "unauthorized"));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let base = Duration::from_millis(BASE_DELAY_MS);
        assert_eq!(retry_delay(base, 0), Duration::from_secs(1));
        assert_eq!(retry_delay(base, 1), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(4));
    }
}
