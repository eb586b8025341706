//! # Registry Schema
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            accounts                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │ account_id            TEXT PK      uuid v4                              │
//! │ username              TEXT UNIQUE  lowercase, NOCASE collation          │
//! │ display_name          TEXT                                              │
//! │ password_hash         TEXT         argon2id PHC string                  │
//! │ identity_fingerprint  TEXT UNIQUE  sha256(name|dob|careof)              │
//! │ name_digest           TEXT         ┐                                    │
//! │ dob_digest            TEXT         ├ per-component digests (diagnostics)│
//! │ care_of_digest        TEXT         ┘                                    │
//! │ identity_verified     INTEGER                                           │
//! │ legal_name            TEXT         ┐                                    │
//! │ date_of_birth         TEXT         ├ as extracted, display/audit only   │
//! │ care_of               TEXT         ┘                                    │
//! │ password_reset_token  TEXT NULL    sha256 of the plaintext reset token  │
//! │ password_reset_expiry INTEGER NULL unix ms                              │
//! │ created_at            INTEGER      unix ms                              │
//! │ updated_at            INTEGER      unix ms                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- One row per physical identity
CREATE TABLE IF NOT EXISTS accounts (
    account_id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
    display_name TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    identity_fingerprint TEXT NOT NULL UNIQUE,
    name_digest TEXT NOT NULL,
    dob_digest TEXT NOT NULL,
    care_of_digest TEXT NOT NULL,
    identity_verified INTEGER NOT NULL DEFAULT 0,
    legal_name TEXT NOT NULL,
    date_of_birth TEXT NOT NULL,
    care_of TEXT NOT NULL,
    password_reset_token TEXT,
    password_reset_expiry INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    -- A reset token never exists without its expiry
    CONSTRAINT reset_pair CHECK (
        (password_reset_token IS NULL) = (password_reset_expiry IS NULL)
    )
);
CREATE INDEX IF NOT EXISTS idx_accounts_reset_token ON accounts(password_reset_token);
"#;
