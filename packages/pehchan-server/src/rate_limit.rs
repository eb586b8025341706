//! Fixed-window request limiter keyed by client.

use std::sync::Arc;

use dashmap::DashMap;

struct RateEntry {
    count: u32,
    window_start: i64,
}

/// At most `max` hits per key per `window_secs`.
#[derive(Clone)]
pub struct RateLimiter {
    max: u32,
    window_secs: i64,
    entries: Arc<DashMap<String, RateEntry>>,
}

impl RateLimiter {
    pub fn new(max: u32, window_secs: i64) -> Self {
        Self {
            max,
            window_secs,
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Record a hit for `key`. Returns false if the key is over its limit.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, chrono::Utc::now().timestamp())
    }

    pub fn check_at(&self, key: &str, now: i64) -> bool {
        let mut entry = self.entries.entry(key.to_string()).or_insert(RateEntry {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now - entry.window_start >= self.window_secs {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.max {
            return false;
        }

        entry.count += 1;
        true
    }

    /// Drop entries whose window has ended. Returns how many were removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        // Counted inside retain: concurrent inserts make len() unreliable
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = now - entry.window_start < self.window_secs;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }
}
