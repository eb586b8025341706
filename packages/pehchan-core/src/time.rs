//! Wall-clock helpers. Registry timestamps are Unix milliseconds; session
//! claims are Unix seconds.

/// Current Unix timestamp in seconds.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Millisecond timestamp `ttl_secs` from `now_millis`.
pub fn expiry_millis(now_millis: i64, ttl_secs: i64) -> i64 {
    now_millis.saturating_add(ttl_secs.saturating_mul(1000))
}
