//! Server state.
//!
//! One [`IdentityService`] shared by every request, plus the per-client
//! limiter for the forgot-password route.

use std::sync::Arc;
use std::time::Duration;

use pehchan_core::IdentityService;

use crate::rate_limit::RateLimiter;

/// Default HTTP body ceiling (10 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default wall-clock budget for one pipeline run.
const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 5;

/// Default forgot-password allowance: 5 per client per hour.
const DEFAULT_RESET_RATE_LIMIT: u32 = 5;
const DEFAULT_RESET_RATE_WINDOW_SECS: i64 = 3600;

/// HTTP-layer settings. Identity settings live in
/// [`pehchan_core::IdentityConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
    pub pipeline_timeout: Duration,
    pub reset_rate_limit: u32,
    pub reset_rate_window_secs: i64,
    /// Key the rate limiter on `X-Forwarded-For` instead of the peer address
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            pipeline_timeout: Duration::from_secs(DEFAULT_PIPELINE_TIMEOUT_SECS),
            reset_rate_limit: DEFAULT_RESET_RATE_LIMIT,
            reset_rate_window_secs: DEFAULT_RESET_RATE_WINDOW_SECS,
            trust_forwarded_for: false,
        }
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IdentityService>,
    pub config: Arc<ServerConfig>,
    /// Client key → forgot-password attempts in the current window.
    pub reset_limiter: RateLimiter,
}

impl AppState {
    pub fn new(service: IdentityService, config: ServerConfig) -> Self {
        let reset_limiter =
            RateLimiter::new(config.reset_rate_limit, config.reset_rate_window_secs);
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
            reset_limiter,
        }
    }
}
