//! Pehchan Server
//!
//! HTTP front end for identity-anchored accounts:
//!
//! 1. **Registration**: a user uploads their password-protected Aadhaar
//!    offline-eKYC archive with its share code, picks a username and
//!    password, and gets an account bound to that identity. One identity,
//!    one account.
//!
//! 2. **Login**: username, password, and the name / date of birth /
//!    care-of exactly as they appear on the document. Wrong fields are
//!    reported individually.
//!
//! 3. **Password reset**: re-upload the document to prove identity, get a
//!    short-lived single-use reset token.
//!
//! **Privacy**: archives and XML are processed in memory and dropped. Only a
//! one-way fingerprint of the identity is stored.

mod api;
mod auth;
mod error;
mod rate_limit;
mod state;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header, Method};
use clap::{Parser, ValueEnum};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use pehchan_core::{ArchiveLimits, IdentityConfig, IdentityService, Registry, SessionConfig};
use state::{AppState, ServerConfig};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pehchan-server", version, about = "Pehchan identity server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000, env = "PORT")]
    port: u16,

    /// SQLite database file. In-memory when unset.
    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<String>,

    /// Secret the session signing key is derived from
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    session_secret: String,

    /// Session lifetime in days
    #[arg(long, default_value_t = 7, env = "SESSION_TTL_DAYS")]
    session_ttl_days: i64,

    /// Reset token lifetime in minutes
    #[arg(long, default_value_t = 10, env = "RESET_TTL_MINUTES")]
    reset_ttl_minutes: i64,

    /// Largest accepted request body, in bytes
    #[arg(long, default_value_t = state::DEFAULT_MAX_UPLOAD_BYTES, env = "MAX_UPLOAD_BYTES")]
    max_upload_bytes: usize,

    /// Largest accepted uncompressed XML member, in bytes
    #[arg(long, default_value_t = pehchan_core::config::DEFAULT_MAX_ENTRY_BYTES, env = "MAX_XML_ENTRY_BYTES")]
    max_xml_entry_bytes: u64,

    /// Time budget for one document pipeline run, in seconds
    #[arg(long, default_value_t = 5, env = "PIPELINE_TIMEOUT_SECS")]
    pipeline_timeout_secs: u64,

    /// Forgot-password attempts allowed per client per window
    #[arg(long, default_value_t = 5, env = "RESET_RATE_LIMIT")]
    reset_rate_limit: u32,

    /// Forgot-password rate limit window, in seconds
    #[arg(long, default_value_t = 3600, env = "RESET_RATE_WINDOW_SECS")]
    reset_rate_window_secs: i64,

    /// Rate-limit by the first `X-Forwarded-For` hop. Only enable behind a
    /// proxy that overwrites the header.
    #[arg(long, default_value_t = false, env = "TRUST_PROXY")]
    trust_forwarded_for: bool,

    /// Accept a bare XML document (no archive, no share code) for password
    /// reset
    #[arg(long, default_value_t = false, env = "ALLOW_PLAIN_XML_RESET")]
    allow_plain_xml_reset: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Args {
    fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            archive: ArchiveLimits {
                max_entry_bytes: self.max_xml_entry_bytes,
            },
            session: SessionConfig {
                secret: self.session_secret.clone(),
                ttl_secs: self.session_ttl_days.saturating_mul(24 * 3600),
            },
            reset_ttl_secs: self.reset_ttl_minutes.saturating_mul(60),
            allow_plain_xml_reset: self.allow_plain_xml_reset,
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            max_upload_bytes: self.max_upload_bytes,
            pipeline_timeout: Duration::from_secs(self.pipeline_timeout_secs),
            reset_rate_limit: self.reset_rate_limit,
            reset_rate_window_secs: self.reset_rate_window_secs,
            trust_forwarded_for: self.trust_forwarded_for,
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_tracing(args.log_format);

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pehchan_server=info,pehchan_core=info,tower_http=info".into());

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::open(args.database_path.as_deref())?;
    match args.database_path.as_deref() {
        Some(path) => tracing::info!(path, "Registry opened"),
        None => tracing::warn!("No DATABASE_PATH set; accounts are kept in memory only"),
    }

    let config = args.server_config();
    let service = IdentityService::new(args.identity_config(), registry)?;
    let state = AppState::new(service, config);

    // Spawn periodic rate-limit cleanup
    let limiter = state.reset_limiter.clone();
    let cleanup_interval = Duration::from_secs(args.reset_rate_window_secs.max(60) as u64);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            let removed = limiter.purge_expired(chrono::Utc::now().timestamp());
            if removed > 0 {
                tracing::debug!(removed, "Purged expired rate-limit entries");
            }
        }
    });

    // Build router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let addr = format!("0.0.0.0:{}", state.config.port);
    let app = api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Pehchan server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
