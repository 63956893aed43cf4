//! What a failed delivery means for a pending action, and how long the
//! background engine waits before replaying the queue again.

use serde::{Deserialize, Serialize};

/// How a non-2xx answer to a contract mutation is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    /// Keep the action queued and replay it later.
    Retryable,
    /// The server will never accept this payload; hand it back to the caller.
    Permanent,
    /// Credentials are stale. Queued like `Retryable` until the host app
    /// refreshes the token.
    ReauthRequired,
}

/// Map a response status onto [`SyncRetryClass`].
///
/// Timeouts, conflicts, locks, throttling and every 5xx are transient.
/// Any other 4xx (bad payload, unknown contract) is permanent.
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 | 500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// Exponents above this stop growing the replay delay.
const MAX_BACKOFF_DOUBLINGS: i32 = 8;

/// Seconds to wait before the next automatic drain after
/// `consecutive_failures` halted drains in a row: `base * 2^failures`,
/// doubling at most [`MAX_BACKOFF_DOUBLINGS`] times.
///
/// Only the timing of the next drain depends on this; the queue itself is
/// never reordered or trimmed.
pub fn backoff_seconds(consecutive_failures: i32, base_delay_seconds: i64) -> i64 {
    let doublings = consecutive_failures.clamp(0, MAX_BACKOFF_DOUBLINGS) as u32;
    base_delay_seconds.max(1).saturating_mul(1_i64 << doublings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses_stay_queued_and_bad_payloads_do_not() {
        assert_eq!(classify_http_status(500), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(429), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(401), SyncRetryClass::ReauthRequired);
        assert_eq!(classify_http_status(400), SyncRetryClass::Permanent);
        assert_eq!(classify_http_status(422), SyncRetryClass::Permanent);
        assert_eq!(classify_http_status(404), SyncRetryClass::Permanent);
        assert_eq!(classify_http_status(403), SyncRetryClass::ReauthRequired);
        assert_eq!(classify_http_status(423), SyncRetryClass::Retryable);
    }

    #[test]
    fn replay_delay_doubles_then_levels_off() {
        assert_eq!(backoff_seconds(0, 5), 5);
        assert_eq!(backoff_seconds(1, 5), 10);
        assert_eq!(backoff_seconds(2, 5), 20);
        assert_eq!(backoff_seconds(9, 5), backoff_seconds(8, 5));
        assert_eq!(backoff_seconds(-3, 5), 5);
        assert_eq!(backoff_seconds(0, 0), 1);
        assert_eq!(backoff_seconds(8, i64::MAX), i64::MAX);
    }
}
