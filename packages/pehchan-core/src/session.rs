//! # Session Tokens
//!
//! Signed, time-limited bearer tokens carrying an account id.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          TOKEN FORMAT                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   base64url(claims JSON)  "."  base64url(Ed25519 signature)            │
//! │                                                                         │
//! │   claims = { "sub": <account id>, "iat": <unix s>, "exp": <unix s> }   │
//! │   signature covers the encoded claims segment                           │
//! │                                                                         │
//! │   signing key = HKDF-SHA256(ikm = server secret,                        │
//! │                             info = "pehchan-session-signing-v1")        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Verification is pure: no registry access, no state.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::SessionConfig;
use crate::error::{Error, Result};

const SIGNING_KEY_INFO: &[u8] = b"pehchan-session-signing-v1";

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Account id
    pub sub: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expires at (Unix seconds)
    pub exp: i64,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct SessionIssuer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    ttl_secs: i64,
}

impl SessionIssuer {
    /// Derive the signing key from the configured secret.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        if config.secret.is_empty() {
            return Err(Error::InvalidInput("Session secret must not be empty".into()));
        }
        if config.ttl_secs <= 0 {
            return Err(Error::InvalidInput("Session TTL must be positive".into()));
        }

        let hkdf = Hkdf::<Sha256>::new(None, config.secret.as_bytes());
        let mut seed = Zeroizing::new([0u8; 32]);
        hkdf.expand(SIGNING_KEY_INFO, &mut seed[..])
            .map_err(|_| Error::Internal("Failed to derive session signing key".into()))?;

        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();

        Ok(Self {
            signing_key,
            verifying_key,
            ttl_secs: config.ttl_secs,
        })
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue a token for `account_id`, valid from now.
    pub fn issue(&self, account_id: &str) -> Result<String> {
        self.issue_at(account_id, crate::time::now_secs())
    }

    /// Issue a token as if the current time were `now` (Unix seconds).
    pub fn issue_at(&self, account_id: &str, now: i64) -> Result<String> {
        let claims = SessionClaims {
            sub: account_id.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };

        let payload = B64.encode(serde_json::to_vec(&claims)?);
        let signature = self.signing_key.sign(payload.as_bytes());

        Ok(format!("{}.{}", payload, B64.encode(signature.to_bytes())))
    }

    /// Verify a token and return the account id it carries.
    pub fn verify(&self, token: &str) -> Result<String> {
        self.verify_at(token, crate::time::now_secs())
            .map(|claims| claims.sub)
    }

    /// Verify a token against the clock value `now` (Unix seconds).
    ///
    /// The signature is checked before the claims are even parsed, so an
    /// expired-but-forged token reports [`Error::SessionInvalid`].
    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims> {
        let (payload, signature) = token.split_once('.').ok_or(Error::SessionInvalid)?;

        let signature_bytes = B64.decode(signature).map_err(|_| Error::SessionInvalid)?;
        let signature =
            Signature::from_slice(&signature_bytes).map_err(|_| Error::SessionInvalid)?;

        self.verifying_key
            .verify(payload.as_bytes(), &signature)
            .map_err(|_| Error::SessionInvalid)?;

        let claims_bytes = B64.decode(payload).map_err(|_| Error::SessionInvalid)?;
        let claims: SessionClaims =
            serde_json::from_slice(&claims_bytes).map_err(|_| Error::SessionInvalid)?;

        if claims.exp <= now {
            return Err(Error::SessionExpired);
        }

        Ok(claims)
    }
}
