//! # Aadhaar Offline eKYC Pipeline
//!
//! Turns an uploaded offline-eKYC archive into a durable identity key.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DOCUMENT → FINGERPRINT                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  upload bytes + share code                                              │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────┐   ZipCrypto / AES, first *.xml member, size ceiling  │
//! │  │ archive      │──────────────────────────────────────────────────►   │
//! │  └──────────────┘                                            XML text   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────┐   <Poi name dob>  <Poa careof>, strip "S/O:" label   │
//! │  │ extract      │──────────────────────────────────────────────────►   │
//! │  └──────────────┘                                  ExtractedIdentity    │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────┐   trim, lowercase name/careOf, "name|dob|careOf"     │
//! │  │ fingerprint  │──────────────────────────────────────────────────►   │
//! │  └──────────────┘                         SHA-256 hex fingerprint       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The issuer's XML signature is not checked anywhere in this pipeline; the
//! contents of any archive that decrypts with its share code are trusted.

pub mod archive;
pub mod extract;
pub mod fingerprint;

pub use archive::ArchiveReader;
pub use extract::{extract_identity, ExtractedIdentity};
pub use fingerprint::{
    derive_fingerprint, CanonicalIdentity, FieldDigests, IdentityFingerprint,
};

use serde::{Deserialize, Serialize};

/// The three identity attributes that feed the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityField {
    Name,
    DateOfBirth,
    CareOf,
}

impl IdentityField {
    /// All fields, in canonical join order.
    pub const ALL: [IdentityField; 3] = [
        IdentityField::Name,
        IdentityField::DateOfBirth,
        IdentityField::CareOf,
    ];

    /// Key used in request bodies and `fieldErrors`.
    pub fn wire_name(self) -> &'static str {
        match self {
            IdentityField::Name => "name",
            IdentityField::DateOfBirth => "dob",
            IdentityField::CareOf => "careOf",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            IdentityField::Name => "Name",
            IdentityField::DateOfBirth => "Date of birth",
            IdentityField::CareOf => "Care of",
        }
    }
}
