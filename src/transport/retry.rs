use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

pub(crate) const RETRY_MAX_ATTEMPTS: u32 = 2;
const RETRY_BACKOFF_BASE_MS: u64 = 100;
const RETRY_BACKOFF_MAX_MS: u64 = 1_000;
const RETRY_AFTER_MAX_SECS: u64 = 30;

/// Statuses worth retrying before any byte of the stream was read.
#[inline]
pub(crate) fn should_retry_status(status: u16) -> bool {
    matches!(status, 429 | 503 | 529)
}

#[inline]
pub(crate) fn should_retry_transport_message(message: &str) -> bool {
    const NEEDLES: [&str; 7] = [
        "timed out",
        "timeout",
        "connection reset",
        "connection aborted",
        "broken pipe",
        "connection refused",
        "unexpected eof",
    ];
    let message = message.to_ascii_lowercase();
    NEEDLES.iter().any(|needle| message.contains(needle))
}

/// Exponential backoff with up to 25% jitter.
#[inline]
pub(crate) fn retry_backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.min(10);
    let base = RETRY_BACKOFF_BASE_MS
        .saturating_mul(1_u64 << shift)
        .min(RETRY_BACKOFF_MAX_MS);
    Duration::from_millis(base + fastrand::u64(0..=base / 4))
}

/// `Retry-After` in seconds when present, otherwise backoff.
#[inline]
pub(crate) fn retry_delay(headers: &HeaderMap, attempt: u32) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map_or_else(
            || retry_backoff_delay(attempt),
            |secs| Duration::from_secs(secs.min(RETRY_AFTER_MAX_SECS)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_should_retry_status() {
        assert!(should_retry_status(429));
        assert!(should_retry_status(503));
        assert!(should_retry_status(529));
        assert!(!should_retry_status(400));
        assert!(!should_retry_status(500));
    }

    #[test]
    fn test_should_retry_transport_message() {
        assert!(should_retry_transport_message("Connection reset by peer"));
        assert!(should_retry_transport_message("operation timed out"));
        assert!(!should_retry_transport_message("invalid certificate"));
    }

    #[test]
    fn test_backoff_is_bounded() {
        let first = retry_backoff_delay(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        assert!(retry_backoff_delay(20) <= Duration::from_millis(1_250));
    }

    #[test]
    fn test_retry_after_seconds_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));
        assert_eq!(retry_delay(&headers, 0), Duration::from_secs(5));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("600"));
        assert_eq!(retry_delay(&headers, 0), Duration::from_secs(30));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert!(retry_delay(&headers, 0) <= Duration::from_millis(125));
    }
}
