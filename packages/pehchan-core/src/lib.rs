//! # Pehchan Core
//!
//! Account authentication anchored to a government-issued offline identity
//! document: one account per physical person, proven by a password-protected
//! Aadhaar offline-eKYC archive.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PEHCHAN CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                       IdentityService                           │   │
//! │  │  register · login · initiate_reset · complete_reset ·           │   │
//! │  │  authenticate · preview_document                                │   │
//! │  └──────┬──────────────────┬──────────────────┬──────────────┬─────┘   │
//! │         │                  │                  │              │         │
//! │  ┌──────▼──────┐   ┌───────▼──────┐   ┌───────▼─────┐ ┌──────▼──────┐  │
//! │  │  Aadhaar    │   │   Registry   │   │   Session   │ │  Password   │  │
//! │  │             │   │              │   │             │ │             │  │
//! │  │ - archive   │   │ - SQLite     │   │ - Ed25519   │ │ - Argon2id  │  │
//! │  │ - extract   │   │ - UNIQUE     │   │ - HKDF key  │ │ - PHC       │  │
//! │  │ - fingerprt │   │ - reset tok  │   │ - 7d expiry │ │             │  │
//! │  └─────────────┘   └──────────────┘   └─────────────┘ └─────────────┘  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types and their HTTP-facing classification
//! - [`config`] - Limits, TTLs and secrets, built once at startup
//! - [`aadhaar`] - Archive decryption, attribute extraction, fingerprinting
//! - [`registry`] - Durable account store
//! - [`password`] - Password hashing
//! - [`session`] - Signed bearer tokens
//! - [`service`] - The account flows
//!
//! ## What Is Stored
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  kept         SHA-256 fingerprint of (name, dob, care-of), per-field    │
//! │               digests, Argon2id password hash, reset-token hash         │
//! │                                                                         │
//! │  never kept   the archive, the share code, the XML, plaintext           │
//! │               passwords, plaintext reset tokens                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod aadhaar;
pub mod config;
pub mod error;
pub mod password;
pub mod registry;
pub mod service;
pub mod session;
pub mod time;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use aadhaar::{ExtractedIdentity, IdentityField, IdentityFingerprint};
pub use config::{ArchiveLimits, IdentityConfig, SessionConfig};
pub use error::{Error, ErrorKind, FieldErrors, Result};
pub use registry::{AccountSummary, PublicAccount, Registry};
pub use service::{
    Authenticated, CommitGate, IdentityService, LoginRequest, RegistrationRequest, ResetGrant,
    ResetRequest,
};
pub use session::SessionIssuer;

/// Returns the version of Pehchan Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
