//! # Identity Service
//!
//! The account flows, built on the document pipeline and the registry.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ACCOUNT FLOWS                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  register        validate ─► archive ─► extract ─► fingerprint          │
//! │                  ─► username free? ─► identity free? ─► argon2 ─► insert│
//! │                  ─► session                                             │
//! │                                                                         │
//! │  login           username ─► password ─► fingerprint(typed fields)      │
//! │                  ─► session          (per-field diagnostics on miss)    │
//! │                                                                         │
//! │  initiate_reset  archive ─► extract ─► fingerprint ─► lookup            │
//! │                  ─► random token (hash stored, plaintext returned once) │
//! │                                                                         │
//! │  complete_reset  hash token ─► atomic consume + new password ─► session │
//! │                                                                         │
//! │  authenticate    verify bearer token ─► live account                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method is synchronous and may be CPU heavy (zip decryption,
//! Argon2). Async callers should run them on a blocking thread. Callers that
//! may give up waiting pass a [`CommitGate`]: the write step only runs if the
//! gate is still open when it is reached.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::aadhaar::{
    extract_identity, ArchiveReader, CanonicalIdentity, ExtractedIdentity, IdentityField,
};
use crate::config::IdentityConfig;
use crate::error::{Error, FieldErrors, Result};
use crate::password::{hash_password, validate_password, verify_password};
use crate::registry::{AccountSummary, NewAccount, PublicAccount, Registry};
use crate::session::SessionIssuer;

/// Username length bounds, in characters.
pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=20;

/// Display name length bounds, in characters.
pub const DISPLAY_NAME_LEN: std::ops::RangeInclusive<usize> = 2..=50;

const RESET_TOKEN_BYTES: usize = 32;

/// Sign-up input.
#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    /// Raw archive bytes
    pub archive: Vec<u8>,
    pub share_code: String,
    pub username: String,
    pub display_name: String,
    pub password: String,
}

/// Login input. The identity fields are typed by the user, not read from a
/// document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub name: String,
    #[serde(rename = "dob")]
    pub date_of_birth: String,
    pub care_of: String,
}

/// Forgot-password input.
#[derive(Debug, Clone, Default)]
pub struct ResetRequest {
    pub document: Vec<u8>,
    pub share_code: String,
    /// The upload is a bare XML document rather than an archive. Only
    /// honoured when [`IdentityConfig::allow_plain_xml_reset`] is set.
    pub plain_xml: bool,
}

/// A successful sign-in of any kind.
#[derive(Debug, Clone, Serialize)]
pub struct Authenticated {
    pub account: PublicAccount,
    pub token: String,
}

/// Result of a successful forgot-password re-verification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetGrant {
    pub account: AccountSummary,
    /// Plaintext token; only its hash is stored.
    pub reset_token: String,
}

const GATE_OPEN: u8 = 0;
const GATE_COMMITTING: u8 = 1;
const GATE_ABANDONED: u8 = 2;

/// Decides, exactly once, whether an operation reaches its write step or
/// its caller gives up on it.
///
/// The worker calls [`CommitGate::begin_commit`] right before the first
/// irreversible step (Argon2 + registry write). The waiting side calls
/// [`CommitGate::abandon`] when its deadline passes. Whichever runs first
/// wins; if the commit won, the caller must wait for the real result.
#[derive(Debug, Clone, Default)]
pub struct CommitGate(Arc<AtomicU8>);

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to write. False if the caller already gave up.
    pub fn begin_commit(&self) -> bool {
        self.transition(GATE_COMMITTING)
    }

    /// Give up on the operation. False if the write step already started.
    pub fn abandon(&self) -> bool {
        self.transition(GATE_ABANDONED)
    }

    fn transition(&self, to: u8) -> bool {
        self.0
            .compare_exchange(GATE_OPEN, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn enter(&self) -> Result<()> {
        if self.begin_commit() {
            Ok(())
        } else {
            Err(Error::Abandoned)
        }
    }
}

/// Entry point for every account operation.
#[derive(Clone)]
pub struct IdentityService {
    config: IdentityConfig,
    archives: ArchiveReader,
    sessions: SessionIssuer,
    registry: Registry,
}

impl IdentityService {
    pub fn new(config: IdentityConfig, registry: Registry) -> Result<Self> {
        if config.reset_ttl_secs <= 0 {
            return Err(Error::InvalidInput("Reset token TTL must be positive".into()));
        }

        let sessions = SessionIssuer::new(&config.session)?;
        let archives = ArchiveReader::new(config.archive.clone());

        Ok(Self {
            config,
            archives,
            sessions,
            registry,
        })
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ========================================================================
    // DOCUMENT
    // ========================================================================

    /// Decrypt and extract without touching the registry.
    pub fn preview_document(&self, archive: &[u8], share_code: &str) -> Result<ExtractedIdentity> {
        if archive.is_empty() {
            return Err(Error::InvalidInput("No file uploaded".into()));
        }
        let xml = self.archives.open(archive, share_code)?;
        extract_identity(&xml)
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Create an account bound to the identity in `request.archive`.
    pub fn register(&self, request: RegistrationRequest) -> Result<Authenticated> {
        self.register_gated(request, &CommitGate::new())
    }

    /// [`register`](Self::register), writing nothing once `gate` is abandoned.
    pub fn register_gated(
        &self,
        request: RegistrationRequest,
        gate: &CommitGate,
    ) -> Result<Authenticated> {
        if request.archive.is_empty()
            || request.share_code.is_empty()
            || request.username.trim().is_empty()
            || request.display_name.trim().is_empty()
            || request.password.is_empty()
        {
            return Err(Error::InvalidInput(
                "Username, display name, password, Aadhaar XML, and share code are required"
                    .into(),
            ));
        }

        let username = request.username.trim().to_lowercase();
        let display_name = request.display_name.trim().to_string();
        validate_username(&username)?;
        validate_display_name(&display_name)?;
        validate_password(&request.password)?;

        let identity = self.preview_document(&request.archive, &request.share_code)?;
        let canonical = CanonicalIdentity::from(&identity);
        let fingerprint = canonical.fingerprint();

        if self.registry.username_exists(&username)? {
            return Err(Error::UsernameTaken);
        }
        if self.registry.fingerprint_exists(&fingerprint)? {
            tracing::info!("Registration refused: identity already registered");
            return Err(Error::IdentityAlreadyRegistered);
        }

        gate.enter()?;
        let password_hash = hash_password(&request.password)?;

        let record = self.registry.insert(&NewAccount {
            username,
            display_name,
            password_hash,
            identity_fingerprint: fingerprint,
            field_digests: canonical.field_digests(),
            identity,
        })?;

        tracing::info!(account_id = record.account_id.as_str(), "Account registered");

        self.sign_in(record.to_public())
    }

    // ========================================================================
    // LOGIN
    // ========================================================================

    /// Three-factor login: username, password, and the typed identity.
    pub fn login(&self, request: LoginRequest) -> Result<Authenticated> {
        if request.username.trim().is_empty()
            || request.password.is_empty()
            || request.name.trim().is_empty()
            || request.date_of_birth.trim().is_empty()
            || request.care_of.trim().is_empty()
        {
            return Err(Error::InvalidInput(
                "All fields (username, password, name, dob, careOf) are required".into(),
            ));
        }

        let Some(account) = self.registry.find_by_username(request.username.trim())? else {
            return Err(Error::Credentials(FieldErrors::single(
                "username",
                "Username entered value is wrong, please try again",
            )));
        };

        if !verify_password(&request.password, &account.password_hash)? {
            tracing::debug!(account_id = account.account_id.as_str(), "Password mismatch");
            return Err(Error::Credentials(FieldErrors::single(
                "password",
                "Password entered value is wrong, please try again",
            )));
        }

        let typed =
            CanonicalIdentity::from_parts(&request.name, &request.date_of_birth, &request.care_of);

        if typed.fingerprint() != account.identity_fingerprint {
            let mut mismatched = account.field_digests.mismatched(&typed.field_digests());
            if mismatched.is_empty() {
                // Stored digests disagree with the stored fingerprint.
                tracing::warn!(
                    account_id = account.account_id.as_str(),
                    "Field digests inconsistent with fingerprint"
                );
                mismatched = IdentityField::ALL.to_vec();
            }

            let mut errors = FieldErrors::new();
            for field in mismatched {
                errors.insert_identity(field);
            }

            tracing::debug!(
                account_id = account.account_id.as_str(),
                fields = %errors,
                "Identity mismatch on login"
            );
            return Err(Error::Credentials(errors));
        }

        tracing::info!(account_id = account.account_id.as_str(), "Login succeeded");

        self.sign_in(account.to_public())
    }

    // ========================================================================
    // PASSWORD RESET
    // ========================================================================

    /// Re-verify identity with a fresh document and grant a reset token.
    pub fn initiate_reset(&self, request: ResetRequest) -> Result<ResetGrant> {
        self.initiate_reset_gated(request, &CommitGate::new())
    }

    pub fn initiate_reset_gated(
        &self,
        request: ResetRequest,
        gate: &CommitGate,
    ) -> Result<ResetGrant> {
        if request.document.is_empty() {
            return Err(Error::InvalidInput("Please upload your XML file".into()));
        }

        let identity = if request.plain_xml {
            if !self.config.allow_plain_xml_reset {
                return Err(Error::InvalidInput(
                    "Upload the Aadhaar ZIP archive together with its share code".into(),
                ));
            }
            let xml = std::str::from_utf8(&request.document)
                .map_err(|_| Error::MalformedXml("document is not UTF-8".into()))?;
            extract_identity(xml)?
        } else {
            self.preview_document(&request.document, &request.share_code)?
        };

        let fingerprint = CanonicalIdentity::from(&identity).fingerprint();
        let account = self
            .registry
            .find_by_fingerprint(&fingerprint)?
            .ok_or(Error::AccountNotFound)?;

        gate.enter()?;
        let mut raw = [0u8; RESET_TOKEN_BYTES];
        OsRng.fill_bytes(&mut raw);
        let reset_token = hex::encode(raw);

        let expiry =
            crate::time::expiry_millis(crate::time::now_millis(), self.config.reset_ttl_secs);
        if !self
            .registry
            .set_reset_token(&account.account_id, &hash_reset_token(&reset_token), expiry)?
        {
            return Err(Error::AccountNotFound);
        }

        tracing::info!(account_id = account.account_id.as_str(), "Password reset granted");

        Ok(ResetGrant {
            account: account.summary(),
            reset_token,
        })
    }

    /// Redeem a reset token for a new password. The token works once.
    pub fn complete_reset(&self, reset_token: &str, new_password: &str) -> Result<Authenticated> {
        self.complete_reset_gated(reset_token, new_password, &CommitGate::new())
    }

    pub fn complete_reset_gated(
        &self,
        reset_token: &str,
        new_password: &str,
        gate: &CommitGate,
    ) -> Result<Authenticated> {
        if reset_token.is_empty() || new_password.is_empty() {
            return Err(Error::InvalidInput(
                "Please provide reset token and new password".into(),
            ));
        }
        validate_password(new_password)?;

        gate.enter()?;
        let password_hash = hash_password(new_password)?;
        let account = self
            .registry
            .consume_reset_token(
                &hash_reset_token(reset_token),
                &password_hash,
                crate::time::now_millis(),
            )?
            .ok_or(Error::InvalidOrExpiredToken)?;

        tracing::info!(account_id = account.account_id.as_str(), "Password reset completed");

        self.sign_in(account.to_public())
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Resolve a bearer token to its live account.
    pub fn authenticate(&self, token: &str) -> Result<PublicAccount> {
        let account_id = self.sessions.verify(token)?;
        self.registry
            .find_by_id(&account_id)?
            .map(|account| account.to_public())
            .ok_or(Error::SessionInvalid)
    }

    fn sign_in(&self, account: PublicAccount) -> Result<Authenticated> {
        let token = self.sessions.issue(&account.account_id)?;
        Ok(Authenticated { account, token })
    }
}

/// SHA-256 hex of a plaintext reset token, as stored in the registry.
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// 3–20 characters of `[A-Za-z0-9_]`.
pub fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !USERNAME_LEN.contains(&len) {
        return Err(Error::InvalidInput(format!(
            "Username must be between {} and {} characters",
            USERNAME_LEN.start(),
            USERNAME_LEN.end()
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::InvalidInput(
            "Username can only contain letters, numbers, and underscores".into(),
        ));
    }
    Ok(())
}

pub fn validate_display_name(display_name: &str) -> Result<()> {
    let len = display_name.chars().count();
    if !DISPLAY_NAME_LEN.contains(&len) {
        return Err(Error::InvalidInput(format!(
            "Display name must be between {} and {} characters",
            DISPLAY_NAME_LEN.start(),
            DISPLAY_NAME_LEN.end()
        )));
    }
    Ok(())
}
