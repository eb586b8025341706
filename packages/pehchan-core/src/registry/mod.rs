//! # Identity Registry
//!
//! Durable store of accounts, keyed by account id and uniquely indexed by
//! username and identity fingerprint.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        REGISTRY OPERATIONS                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │ IdentityService │                                                   │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │    Registry     │  insert / find_by_* / *_exists                    │
//! │  │   (this file)   │  set_reset_token / consume_reset_token            │
//! │  └────────┬────────┘                                                   │
//! │           │  one connection behind a mutex                              │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  UNIQUE(username), UNIQUE(identity_fingerprint)   │
//! │  │ (file / memory) │                                                   │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Uniqueness is enforced by the schema, not by read-then-write checks.
//! A concurrent duplicate registration loses at `INSERT` time and is
//! reported as the same typed conflict the pre-checks produce.

pub mod schema;

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;

use crate::aadhaar::{ExtractedIdentity, FieldDigests, IdentityFingerprint};
use crate::error::{Error, Result};

/// Column list shared by every account query, in [`account_from_row`] order.
const ACCOUNT_COLUMNS: &str = "account_id, username, display_name, password_hash, \
     identity_fingerprint, name_digest, dob_digest, care_of_digest, identity_verified, \
     legal_name, date_of_birth, care_of, password_reset_token, password_reset_expiry, \
     created_at, updated_at";

/// A stored account.
///
/// Holds secrets (password hash, fingerprint, reset token hash). Convert with
/// [`AccountRecord::to_public`] before anything leaves the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// UUID v4
    pub account_id: String,
    /// Lowercased
    pub username: String,
    pub display_name: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub identity_fingerprint: IdentityFingerprint,
    pub field_digests: FieldDigests,
    pub identity_verified: bool,
    pub legal_name: String,
    pub date_of_birth: String,
    pub care_of: String,
    /// SHA-256 hex of the outstanding reset token
    pub password_reset_token: Option<String>,
    /// Unix millis
    pub password_reset_expiry: Option<i64>,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis
    pub updated_at: i64,
}

impl AccountRecord {
    pub fn to_public(&self) -> PublicAccount {
        PublicAccount {
            account_id: self.account_id.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            legal_name: self.legal_name.clone(),
            date_of_birth: self.date_of_birth.clone(),
            care_of: self.care_of.clone(),
            identity_verified: self.identity_verified,
            created_at: self.created_at,
        }
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Client-facing view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccount {
    pub account_id: String,
    pub username: String,
    pub display_name: String,
    pub legal_name: String,
    pub date_of_birth: String,
    pub care_of: String,
    pub identity_verified: bool,
    pub created_at: i64,
}

/// What the forgot-password flow reveals about the matched account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub username: String,
    pub display_name: String,
}

/// Everything needed to create an account row.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub identity_fingerprint: IdentityFingerprint,
    pub field_digests: FieldDigests,
    /// Attributes as extracted, kept for display.
    pub identity: ExtractedIdentity,
}

/// SQLite-backed account store.
#[derive(Clone)]
pub struct Registry {
    conn: Arc<Mutex<Connection>>,
}

impl Registry {
    /// Open or create a registry.
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let registry = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        registry.init_schema()?;

        Ok(registry)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| {
                    Error::DatabaseError(format!("Failed to set schema version: {}", e))
                })?;

                tracing::info!("Registry schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Registry schema version {} is newer than supported version {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Registry schema version: {}", v);
            }
        }

        Ok(())
    }

    // ========================================================================
    // ACCOUNT OPERATIONS
    // ========================================================================

    /// Insert a new account.
    ///
    /// A `UNIQUE` violation on username or fingerprint comes back as
    /// [`Error::UsernameTaken`] / [`Error::IdentityAlreadyRegistered`].
    pub fn insert(&self, account: &NewAccount) -> Result<AccountRecord> {
        let conn = self.conn.lock();
        let now = crate::time::now_millis();

        let record = AccountRecord {
            account_id: uuid::Uuid::new_v4().to_string(),
            username: account.username.to_lowercase(),
            display_name: account.display_name.clone(),
            password_hash: account.password_hash.clone(),
            identity_fingerprint: account.identity_fingerprint.clone(),
            field_digests: account.field_digests.clone(),
            identity_verified: true,
            legal_name: account.identity.name.clone(),
            date_of_birth: account.identity.date_of_birth.clone(),
            care_of: account.identity.care_of.clone(),
            password_reset_token: None,
            password_reset_expiry: None,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO accounts (account_id, username, display_name, password_hash,
                identity_fingerprint, name_digest, dob_digest, care_of_digest, identity_verified,
                legal_name, date_of_birth, care_of, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.account_id,
                record.username,
                record.display_name,
                record.password_hash,
                record.identity_fingerprint.as_str(),
                record.field_digests.name,
                record.field_digests.date_of_birth,
                record.field_digests.care_of,
                record.identity_verified,
                record.legal_name,
                record.date_of_birth,
                record.care_of,
                record.created_at,
                record.updated_at,
            ],
        )
        .map_err(translate_insert_error)?;

        tracing::debug!(account_id = record.account_id.as_str(), "Account inserted");

        Ok(record)
    }

    /// Case-insensitive username lookup.
    pub fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>> {
        self.find_one("username = ?", username)
    }

    pub fn find_by_id(&self, account_id: &str) -> Result<Option<AccountRecord>> {
        self.find_one("account_id = ?", account_id)
    }

    pub fn find_by_fingerprint(
        &self,
        fingerprint: &IdentityFingerprint,
    ) -> Result<Option<AccountRecord>> {
        self.find_one("identity_fingerprint = ?", fingerprint.as_str())
    }

    pub fn username_exists(&self, username: &str) -> Result<bool> {
        self.exists("username = ?", username)
    }

    pub fn fingerprint_exists(&self, fingerprint: &IdentityFingerprint) -> Result<bool> {
        self.exists("identity_fingerprint = ?", fingerprint.as_str())
    }

    /// Number of accounts.
    pub fn account_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========================================================================
    // PASSWORD RESET
    // ========================================================================

    /// Store a reset token hash and its expiry, replacing any earlier one.
    ///
    /// Returns false if the account does not exist.
    pub fn set_reset_token(
        &self,
        account_id: &str,
        token_hash: &str,
        expiry_millis: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE accounts
                 SET password_reset_token = ?, password_reset_expiry = ?, updated_at = ?
                 WHERE account_id = ?",
                params![token_hash, expiry_millis, crate::time::now_millis(), account_id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to store reset token: {}", e)))?;

        Ok(rows > 0)
    }

    /// Redeem a reset token.
    ///
    /// Under one lock and one transaction: find the account whose token hash
    /// matches and whose expiry is after `now_millis`, install
    /// `new_password_hash`, clear the token. Returns the updated account, or
    /// `None` if no live token matched. A second call with the same hash
    /// always returns `None`.
    pub fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now_millis: i64,
    ) -> Result<Option<AccountRecord>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let account_id: Option<String> = tx
            .query_row(
                "SELECT account_id FROM accounts
                 WHERE password_reset_token = ? AND password_reset_expiry > ?",
                params![token_hash, now_millis],
                |row| row.get(0),
            )
            .optional()?;

        let Some(account_id) = account_id else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE accounts
             SET password_hash = ?, password_reset_token = NULL, password_reset_expiry = NULL,
                 updated_at = ?
             WHERE account_id = ?",
            params![new_password_hash, now_millis, account_id],
        )?;

        let record = tx
            .query_row(
                &format!("SELECT {} FROM accounts WHERE account_id = ?", ACCOUNT_COLUMNS),
                params![account_id],
                account_from_row,
            )
            .optional()?;

        tx.commit()?;

        Ok(record)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn find_one(&self, predicate: &str, value: &str) -> Result<Option<AccountRecord>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                &format!("SELECT {} FROM accounts WHERE {}", ACCOUNT_COLUMNS, predicate),
                params![value],
                account_from_row,
            )
            .optional()
            .map_err(|e| Error::DatabaseError(format!("Failed to get account: {}", e)))?;

        Ok(result)
    }

    fn exists(&self, predicate: &str, value: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM accounts WHERE {} LIMIT 1", predicate),
                params![value],
                |row| row.get(0),
            )
            .optional()?;

        Ok(found.is_some())
    }
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountRecord> {
    let fingerprint: String = row.get(4)?;
    Ok(AccountRecord {
        account_id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        password_hash: row.get(3)?,
        identity_fingerprint: IdentityFingerprint::from_hex(fingerprint),
        field_digests: FieldDigests {
            name: row.get(5)?,
            date_of_birth: row.get(6)?,
            care_of: row.get(7)?,
        },
        identity_verified: row.get(8)?,
        legal_name: row.get(9)?,
        date_of_birth: row.get(10)?,
        care_of: row.get(11)?,
        password_reset_token: row.get(12)?,
        password_reset_expiry: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn translate_insert_error(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            if message.contains("accounts.username") {
                return Error::UsernameTaken;
            }
            if message.contains("accounts.identity_fingerprint") {
                return Error::IdentityAlreadyRegistered;
            }
        }
    }
    Error::DatabaseError(format!("Failed to insert account: {}", err))
}
