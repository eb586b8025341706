//! Configuration for the identity pipeline.
//!
//! Everything is built once at process start (the server fills these from
//! its CLI/environment) and handed to constructors. Nothing in this crate
//! reads environment variables on its own.

/// Default ceiling for the uncompressed XML member (10 MiB). Real offline
/// eKYC documents are a few tens of kilobytes.
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 10 * 1024 * 1024;

/// Default session lifetime (7 days).
pub const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 3600;

/// Default reset-token lifetime (10 minutes).
pub const DEFAULT_RESET_TTL_SECS: i64 = 10 * 60;

/// Limits applied by the archive decryptor.
#[derive(Debug, Clone)]
pub struct ArchiveLimits {
    /// Largest uncompressed `.xml` member accepted.
    pub max_entry_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }
}

/// Session token settings.
#[derive(Clone)]
pub struct SessionConfig {
    /// Server-side secret the signing key is derived from.
    pub secret: String,
    /// Token lifetime in seconds.
    pub ttl_secs: i64,
}

// Hand-written so the secret never ends up in logs.
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl SessionConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

/// Top-level configuration for [`crate::IdentityService`].
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub archive: ArchiveLimits,
    pub session: SessionConfig,
    /// Reset-token lifetime in seconds.
    pub reset_ttl_secs: i64,
    /// Accept a bare `.xml` upload (no archive, no share code) in the
    /// forgot-password flow. Off unless explicitly enabled.
    pub allow_plain_xml_reset: bool,
}

impl IdentityConfig {
    /// Defaults for everything except the session secret.
    pub fn new(session_secret: impl Into<String>) -> Self {
        Self {
            archive: ArchiveLimits::default(),
            session: SessionConfig::new(session_secret),
            reset_ttl_secs: DEFAULT_RESET_TTL_SECS,
            allow_plain_xml_reset: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IdentityConfig::new("secret");
        assert_eq!(config.archive.max_entry_bytes, 10 * 1024 * 1024);
        assert_eq!(config.session.ttl_secs, 7 * 24 * 3600);
        assert_eq!(config.reset_ttl_secs, 600);
        assert!(!config.allow_plain_xml_reset);
    }

    #[test]
    fn test_session_config_debug_redacts_secret() {
        let config = SessionConfig::new("hunter2-very-secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("redacted"));
    }
}
