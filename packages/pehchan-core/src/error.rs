//! # Error Handling
//!
//! Error types for Pehchan Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                       ErrorKind      │
//! │  │                                                                      │
//! │  ├── Document Errors (100-199)                           Input          │
//! │  │   ├── ArchiveUnreadable     - Not a zip / wrong share code          │
//! │  │   ├── NoXmlEntry            - Archive has no .xml member            │
//! │  │   ├── EntryTooLarge         - Member exceeds the size ceiling       │
//! │  │   ├── MalformedXml          - XML could not be parsed               │
//! │  │   └── MissingIdentityFields - name / dob / careOf absent           │
//! │  │                                                                      │
//! │  ├── Validation Errors (200-299)                         Input          │
//! │  │   └── InvalidInput          - Request shape rejected                │
//! │  │                                                                      │
//! │  ├── Account Errors (300-399)                                           │
//! │  │   ├── UsernameTaken         - Username already registered  Conflict │
//! │  │   ├── IdentityAlreadyRegistered - Fingerprint exists       Conflict │
//! │  │   ├── Credentials           - Field-scoped login failure   Auth     │
//! │  │   ├── AccountNotFound       - No account for fingerprint   NotFound │
//! │  │   └── InvalidOrExpiredToken - Reset token rejected         Input    │
//! │  │                                                                      │
//! │  ├── Session Errors (400-499)                            Authentication │
//! │  │   ├── SessionExpired                                                 │
//! │  │   └── SessionInvalid                                                 │
//! │  │                                                                      │
//! │  └── Internal Errors (900-999)                           Internal       │
//! │      ├── DatabaseError                                                  │
//! │      ├── PasswordHashFailed                                             │
//! │      ├── SerializationError                                             │
//! │      ├── Internal                                                       │
//! │      └── Abandoned             - Caller gave up before the write        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The HTTP layer only ever matches on [`ErrorKind`]; the variant itself
//! supplies the human-readable message. Internal errors must never be echoed
//! to clients.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::aadhaar::IdentityField;

/// Result type alias for Pehchan Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Field name → message, serialized as the `fieldErrors` object of a
/// failed login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    /// Create an empty set of field errors.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set containing a single field error.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, message);
        errors
    }

    /// Record (or replace) the message for `field`.
    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.0.insert(field.to_string(), message.into());
    }

    /// Record the standard "wrong value" message for an identity field.
    pub fn insert_identity(&mut self, field: IdentityField) {
        self.insert(
            field.wire_name(),
            format!("{} entered value is wrong, please try again", field.label()),
        );
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields().collect();
        write!(f, "{}", fields.join(", "))
    }
}

/// Coarse classification used at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied a bad document, share code, or request body.
    Input,
    /// Credentials or bearer token rejected.
    Authentication,
    /// Lookup miss that is not an authentication failure.
    NotFound,
    /// Uniqueness violation (username or identity).
    Conflict,
    /// Storage or other unexpected failure. Never shown to clients verbatim.
    Internal,
}

/// Main error type for Pehchan Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Document Errors (100-199)
    // ========================================================================

    /// The upload is not a readable archive, or the share code is wrong.
    /// Both look identical once decryption has been attempted.
    #[error("Unable to open the Aadhaar archive. Check the file and share code.")]
    ArchiveUnreadable(String),

    /// The archive opened but has no `.xml` member
    #[error("No XML found inside ZIP")]
    NoXmlEntry,

    /// The XML member is bigger than the configured ceiling
    #[error("XML entry is too large ({size} bytes, limit {limit} bytes)")]
    EntryTooLarge {
        /// Declared or observed uncompressed size
        size: u64,
        /// Configured ceiling
        limit: u64,
    },

    /// XML text could not be parsed
    #[error("Invalid XML file format: {0}")]
    MalformedXml(String),

    /// One or more identity attributes were absent or blank
    #[error("Invalid Aadhaar XML: missing {}", .0.iter().map(|f| f.label()).collect::<Vec<_>>().join(", "))]
    MissingIdentityFields(Vec<IdentityField>),

    // ========================================================================
    // Validation Errors (200-299)
    // ========================================================================

    /// Request failed shape validation
    #[error("{0}")]
    InvalidInput(String),

    // ========================================================================
    // Account Errors (300-399)
    // ========================================================================

    /// Username already belongs to another account
    #[error("Username already exists")]
    UsernameTaken,

    /// An account already exists for this identity fingerprint
    #[error("Aadhaar already exists")]
    IdentityAlreadyRegistered,

    /// Login rejected; carries which inputs were wrong
    #[error("Credential mismatch: {0}")]
    Credentials(FieldErrors),

    /// No account matches the presented identity
    #[error("No account found with this Aadhaar document")]
    AccountNotFound,

    /// Reset token unknown, already used, or expired
    #[error("Invalid or expired reset token")]
    InvalidOrExpiredToken,

    // ========================================================================
    // Session Errors (400-499)
    // ========================================================================

    /// Bearer token past its expiry
    #[error("Session expired. Please login again.")]
    SessionExpired,

    /// Bearer token malformed, forged, or for a missing account
    #[error("Invalid session token")]
    SessionInvalid,

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Password hashing or verification machinery failed
    #[error("Password hashing failed: {0}")]
    PasswordHashFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// The caller abandoned the operation before it reached its write step
    #[error("Operation abandoned before commit")]
    Abandoned,
}

impl Error {
    /// Numeric error code, grouped by category:
    /// - 100-199: Document
    /// - 200-299: Validation
    /// - 300-399: Account
    /// - 400-499: Session
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::ArchiveUnreadable(_) => 100,
            Error::NoXmlEntry => 101,
            Error::EntryTooLarge { .. } => 102,
            Error::MalformedXml(_) => 103,
            Error::MissingIdentityFields(_) => 104,

            Error::InvalidInput(_) => 200,

            Error::UsernameTaken => 300,
            Error::IdentityAlreadyRegistered => 301,
            Error::Credentials(_) => 302,
            Error::AccountNotFound => 303,
            Error::InvalidOrExpiredToken => 304,

            Error::SessionExpired => 400,
            Error::SessionInvalid => 401,

            Error::DatabaseError(_) => 900,
            Error::PasswordHashFailed(_) => 901,
            Error::SerializationError(_) => 902,
            Error::Internal(_) => 903,
            Error::Abandoned => 904,
        }
    }

    /// Classification for the HTTP boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ArchiveUnreadable(_)
            | Error::NoXmlEntry
            | Error::EntryTooLarge { .. }
            | Error::MalformedXml(_)
            | Error::MissingIdentityFields(_)
            | Error::InvalidInput(_)
            | Error::InvalidOrExpiredToken => ErrorKind::Input,

            Error::Credentials(_) | Error::SessionExpired | Error::SessionInvalid => {
                ErrorKind::Authentication
            }

            Error::AccountNotFound => ErrorKind::NotFound,

            Error::UsernameTaken | Error::IdentityAlreadyRegistered => ErrorKind::Conflict,

            Error::DatabaseError(_)
            | Error::PasswordHashFailed(_)
            | Error::SerializationError(_)
            | Error::Internal(_)
            | Error::Abandoned => ErrorKind::Internal,
        }
    }

    /// Field errors carried by a failed login, if any.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Error::Credentials(errors) => Some(errors),
            _ => None,
        }
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
