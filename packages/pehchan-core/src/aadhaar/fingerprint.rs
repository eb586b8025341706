//! Identity fingerprint derivation.
//!
//! ## Canonical form
//!
//! ```text
//!   name           → trim → lowercase ─┐
//!   date of birth  → trim ─────────────┼──► "name|dob|careof" ──► SHA-256 ──► hex
//!   care-of        → trim → lowercase ─┘
//! ```
//!
//! Dates are compared exactly as written in the document: `01-01-1990` and
//! `1990-01-01` produce different fingerprints. There is no salt, so the
//! same person presenting a fresh document always lands on the same key.
//!
//! ## Field digests
//!
//! A digest hides its inputs, so it cannot say *which* component differs.
//! Alongside the fingerprint the registry keeps one digest per canonical
//! component (domain-separated from the fingerprint); login diagnostics
//! compare those, while the authentication decision uses the fingerprint
//! alone.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{ExtractedIdentity, IdentityField};

/// Separator between canonical components.
pub const FIELD_SEPARATOR: char = '|';

/// Domain tag for per-field digests.
const FIELD_DIGEST_DOMAIN: &str = "pehchan-field-v1";

/// Lowercase hex SHA-256 of the canonical identity string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityFingerprint(String);

impl IdentityFingerprint {
    /// Wrap a stored hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity attributes in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalIdentity {
    pub name: String,
    pub date_of_birth: String,
    pub care_of: String,
}

impl CanonicalIdentity {
    /// Canonicalize raw attribute values.
    pub fn from_parts(name: &str, date_of_birth: &str, care_of: &str) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            date_of_birth: date_of_birth.trim().to_string(),
            care_of: care_of.trim().to_lowercase(),
        }
    }

    /// `name|dob|careof`
    pub fn joined(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.name,
            self.date_of_birth,
            self.care_of,
            sep = FIELD_SEPARATOR
        )
    }

    pub fn component(&self, field: IdentityField) -> &str {
        match field {
            IdentityField::Name => &self.name,
            IdentityField::DateOfBirth => &self.date_of_birth,
            IdentityField::CareOf => &self.care_of,
        }
    }

    pub fn fingerprint(&self) -> IdentityFingerprint {
        IdentityFingerprint(sha256_hex(self.joined().as_bytes()))
    }

    pub fn field_digests(&self) -> FieldDigests {
        let digest = |field: IdentityField| {
            sha256_hex(
                format!(
                    "{}{sep}{}{sep}{}",
                    FIELD_DIGEST_DOMAIN,
                    field.wire_name(),
                    self.component(field),
                    sep = FIELD_SEPARATOR
                )
                .as_bytes(),
            )
        };

        FieldDigests {
            name: digest(IdentityField::Name),
            date_of_birth: digest(IdentityField::DateOfBirth),
            care_of: digest(IdentityField::CareOf),
        }
    }
}

impl From<&ExtractedIdentity> for CanonicalIdentity {
    fn from(identity: &ExtractedIdentity) -> Self {
        Self::from_parts(&identity.name, &identity.date_of_birth, &identity.care_of)
    }
}

/// One digest per canonical component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDigests {
    pub name: String,
    pub date_of_birth: String,
    pub care_of: String,
}

impl FieldDigests {
    pub fn get(&self, field: IdentityField) -> &str {
        match field {
            IdentityField::Name => &self.name,
            IdentityField::DateOfBirth => &self.date_of_birth,
            IdentityField::CareOf => &self.care_of,
        }
    }

    /// Fields whose digests differ, in canonical order.
    pub fn mismatched(&self, other: &FieldDigests) -> Vec<IdentityField> {
        IdentityField::ALL
            .into_iter()
            .filter(|field| self.get(*field) != other.get(*field))
            .collect()
    }
}

/// Fingerprint of an extracted identity.
pub fn derive_fingerprint(identity: &ExtractedIdentity) -> IdentityFingerprint {
    CanonicalIdentity::from(identity).fingerprint()
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
