//! HTTP API handlers.
//!
//! - `POST /api/auth/register`         multipart archive + account fields
//! - `POST /api/auth/login`            JSON credentials + typed identity
//! - `POST /api/auth/forgot-password`  multipart archive (rate limited)
//! - `POST /api/auth/reset-password`   JSON reset token + new password
//! - `GET  /api/auth/me`               bearer
//! - `POST /api/auth/logout`           bearer
//! - `POST /api/aadhaar/verify`        multipart archive, no account effect
//! - `GET  /api/health`

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, ConnectInfo, DefaultBodyLimit,
        Multipart, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use pehchan_core::{
    AccountSummary, Authenticated, CommitGate, IdentityService, LoginRequest, PublicAccount,
    RegistrationRequest, ResetRequest,
};

use crate::auth::CurrentAccount;
use crate::error::ApiError;
use crate::state::AppState;

// ── Router ───────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/reset-password", post(reset_password))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        .route("/api/aadhaar/verify", post(verify_document))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

// ── Response Types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub message: &'static str,
    pub account: PublicAccount,
    pub token: String,
}

impl SessionResponse {
    fn new(message: &'static str, auth: Authenticated) -> Self {
        Self {
            success: true,
            message,
            account: auth.account,
            token: auth.token,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetGrantResponse {
    pub success: bool,
    pub message: &'static str,
    pub account: AccountSummary,
    pub reset_token: String,
}

#[derive(Serialize)]
pub struct DocumentPreview {
    pub name: String,
    pub dob: String,
    pub co: String,
}

#[derive(Serialize)]
pub struct PreviewResponse {
    pub success: bool,
    /// Always false: the issuer signature is not checked.
    pub verified: bool,
    pub data: DocumentPreview,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetPasswordBody {
    pub reset_token: String,
    pub new_password: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /api/health
async fn health() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "status": "ok",
        "service": "pehchan-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

/// POST /api/auth/register
///
/// Multipart form fields:
/// - `file`: the offline-eKYC zip
/// - `shareCode`, `username`, `displayName`, `password`
async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = read_form(multipart).await?;
    let upload = form
        .file
        .take()
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;

    let request = RegistrationRequest {
        archive: upload.bytes,
        share_code: form.field("shareCode").trim().to_string(),
        username: form.field("username"),
        display_name: form.field("displayName"),
        password: form.field("password"),
    };

    let auth = run_blocking(&state, move |service, gate| {
        service.register_gated(request, gate)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse::new(
            "Registration successful with Aadhaar verification",
            auth,
        )),
    ))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let auth = run_blocking(&state, move |service, _| service.login(request)).await?;

    Ok(Json(SessionResponse::new(
        "Login successful with Aadhaar and password verification",
        auth,
    )))
}

/// POST /api/auth/forgot-password
///
/// Multipart form fields:
/// - `file` (or `xmlFile`): the offline-eKYC zip, or a bare `.xml` when
///   plain-XML resets are enabled
/// - `shareCode`
async fn forgot_password(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let client = client_key(
        &headers,
        connect_info.as_ref().map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_for,
    );
    if !state.reset_limiter.check(&client) {
        tracing::warn!(client = client.as_str(), "Forgot-password rate limit hit");
        return Err(ApiError::RateLimited);
    }

    let mut form = read_form(multipart).await?;
    let upload = form
        .file
        .take()
        .ok_or_else(|| ApiError::BadRequest("Please upload your XML file".into()))?;

    let request = ResetRequest {
        plain_xml: upload.is_plain_xml(),
        document: upload.bytes,
        share_code: form.field("shareCode").trim().to_string(),
    };

    let grant = run_blocking(&state, move |service, gate| {
        service.initiate_reset_gated(request, gate)
    })
    .await?;

    Ok(Json(ResetGrantResponse {
        success: true,
        message: "XML verified successfully. You can now reset your password.",
        account: grant.account,
        reset_token: grant.reset_token,
    }))
}

/// POST /api/auth/reset-password
async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let auth = run_blocking(&state, move |service, gate| {
        service.complete_reset_gated(&body.reset_token, &body.new_password, gate)
    })
    .await?;

    Ok(Json(SessionResponse::new("Password reset successful", auth)))
}

/// GET /api/auth/me
async fn me(CurrentAccount(account): CurrentAccount) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "account": account,
    }))
}

/// POST /api/auth/logout
///
/// Sessions are stateless; the client discards its token.
async fn logout(CurrentAccount(account): CurrentAccount) -> impl IntoResponse {
    tracing::debug!(account_id = account.account_id.as_str(), "Logout");
    Json(json!({
        "success": true,
        "message": "Logged out successfully",
    }))
}

/// POST /api/aadhaar/verify
///
/// Decrypts and reads the document without touching any account.
async fn verify_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = read_form(multipart).await?;
    let upload = form
        .file
        .take()
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;
    let share_code = form.field("shareCode").trim().to_string();

    let identity = run_blocking(&state, move |service, _| {
        service.preview_document(&upload.bytes, &share_code)
    })
    .await?;

    Ok(Json(PreviewResponse {
        success: true,
        verified: false,
        data: DocumentPreview {
            name: identity.name,
            dob: identity.date_of_birth,
            co: identity.care_of,
        },
    }))
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Run a blocking service call on the blocking pool under the configured
/// time budget.
///
/// The budget only covers the work before the call's write step. On expiry
/// the gate is abandoned and the worker stops short of writing; if the
/// write already started, the real result is awaited instead.
async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&IdentityService, &CommitGate) -> pehchan_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let service = state.service.clone();
    let gate = CommitGate::new();
    let worker_gate = gate.clone();
    let mut task = tokio::task::spawn_blocking(move || f(&service, &worker_gate));

    let joined = match tokio::time::timeout(state.config.pipeline_timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) if gate.abandon() => return Err(ApiError::Timeout),
        Err(_) => task.await,
    };

    match joined {
        Err(join_error) => Err(ApiError::Internal(join_error.to_string())),
        Ok(result) => result.map_err(ApiError::from),
    }
}

struct Upload {
    bytes: Vec<u8>,
    file_name: Option<String>,
    content_type: Option<String>,
}

impl Upload {
    fn is_plain_xml(&self) -> bool {
        let xml_type = matches!(
            self.content_type.as_deref(),
            Some("text/xml") | Some("application/xml")
        );
        let xml_name = self
            .file_name
            .as_deref()
            .map(|name| name.to_ascii_lowercase().ends_with(".xml"))
            .unwrap_or(false);
        xml_type || xml_name
    }
}

#[derive(Default)]
struct UploadForm {
    file: Option<Upload>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    fn field(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(e)),
        };
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" | "xmlFile" => {
                let file_name = field.file_name().map(str::to_owned);
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.file = Some(Upload {
                    bytes: bytes.to_vec(),
                    file_name,
                    content_type,
                });
            }
            "" => {}
            _ => {
                let text = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, text);
            }
        }
    }

    Ok(form)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge;
    }
    tracing::warn!(error = %err, "Failed to read multipart body");
    ApiError::BadRequest("Failed to read form data".into())
}

/// Peer address of the connection. The first `X-Forwarded-For` hop is only
/// used when the server sits behind a trusted proxy; otherwise any client
/// could pick its own key.
fn client_key(
    headers: &HeaderMap,
    peer: Option<&SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = if trust_forwarded_for {
        headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    } else {
        None
    };

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use pehchan_core::testing::{sample_archive, sample_xml};
    use pehchan_core::{IdentityConfig, Registry};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::state::ServerConfig;

    const BOUNDARY: &str = "pehchan-test-boundary";
    const SHARE_CODE: &str = "4821";

    fn test_state(config: ServerConfig, identity: IdentityConfig) -> AppState {
        let service = IdentityService::new(identity, Registry::open(None).unwrap()).unwrap();
        AppState::new(service, config)
    }

    fn app_with(config: ServerConfig) -> Router {
        router(test_state(config, IdentityConfig::new("test-secret")))
    }

    fn test_config() -> ServerConfig {
        // Argon2 is slow in debug builds
        ServerConfig {
            pipeline_timeout: Duration::from_secs(120),
            ..ServerConfig::default()
        }
    }

    fn app() -> Router {
        app_with(test_config())
    }

    fn jane_archive() -> Vec<u8> {
        sample_archive("Jane Q Public", "01-01-1990", "S/O: John Public", SHARE_CODE)
    }

    fn multipart_body(
        file_field: &str,
        file_name: &str,
        file: &[u8],
        fields: &[(&str, &str)],
    ) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{file_field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(uri: &str, value: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap()
    }

    fn register_request(username: &str, archive: &[u8]) -> Request<Body> {
        multipart_request(
            "/api/auth/register",
            multipart_body(
                "file",
                "offlineaadhaar.zip",
                archive,
                &[
                    ("username", username),
                    ("displayName", "Jane"),
                    ("password", "s3cret!"),
                    ("shareCode", SHARE_CODE),
                ],
            ),
        )
    }

    fn jane_login(password: &str, dob: &str) -> Value {
        json!({
            "username": "jane",
            "password": password,
            "name": "Jane Q Public",
            "dob": dob,
            "careOf": "John Public",
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(
            &app(),
            Request::get("/api/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_login_me() {
        let app = app();

        let (status, body) = send(&app, register_request("jane", &jane_archive())).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["success"], true);
        assert_eq!(body["account"]["username"], "jane");
        assert!(body["account"].get("passwordHash").is_none());

        let (status, body) = send(
            &app,
            json_request("/api/auth/login", jane_login("s3cret!", "01-01-1990")),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let token = body["token"].as_str().unwrap().to_string();

        let request = Request::get("/api/auth/me")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["account"]["legalName"], "Jane Q Public");

        let request = Request::post("/api/auth/logout")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_field_errors() {
        let app = app();
        send(&app, register_request("jane", &jane_archive())).await;

        let (status, body) = send(
            &app,
            json_request("/api/auth/login", jane_login("s3cret!", "02-01-1990")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        let fields = body["fieldErrors"].as_object().unwrap();
        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key("dob"));
    }

    #[tokio::test]
    async fn test_login_missing_fields() {
        let (status, body) = send(
            &app(),
            json_request("/api/auth/login", json!({ "username": "jane" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let app = app();
        let (status, _) = send(&app, register_request("jane", &jane_archive())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, register_request("jane_again", &jane_archive())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Aadhaar already exists");
    }

    #[tokio::test]
    async fn test_wrong_share_code() {
        let archive = jane_archive();
        let body = multipart_body(
            "file",
            "offlineaadhaar.zip",
            &archive,
            &[
                ("username", "jane"),
                ("displayName", "Jane"),
                ("password", "s3cret!"),
                ("shareCode", "0000"),
            ],
        );
        let (status, _) = send(&app(), multipart_request("/api/auth/register", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_forgot_and_reset_password() {
        let app = app();
        send(&app, register_request("jane", &jane_archive())).await;

        let body = multipart_body(
            "xmlFile",
            "offlineaadhaar.zip",
            &jane_archive(),
            &[("shareCode", SHARE_CODE)],
        );
        let (status, body) =
            send(&app, multipart_request("/api/auth/forgot-password", body)).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["account"]["username"], "jane");
        let reset_token = body["resetToken"].as_str().unwrap().to_string();

        let reset = json!({ "resetToken": reset_token, "newPassword": "n3w-pass" });
        let (status, body) = send(
            &app,
            json_request("/api/auth/reset-password", reset.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(body["token"].is_string());

        let (status, _) = send(&app, json_request("/api/auth/reset-password", reset)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            json_request("/api/auth/login", jane_login("n3w-pass", "01-01-1990")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_identity() {
        let body = multipart_body(
            "file",
            "offlineaadhaar.zip",
            &jane_archive(),
            &[("shareCode", SHARE_CODE)],
        );
        let (status, _) = send(&app(), multipart_request("/api/auth/forgot-password", body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_plain_xml_reset_disabled_by_default() {
        let app = app();
        send(&app, register_request("jane", &jane_archive())).await;

        let xml = sample_xml("Jane Q Public", "01-01-1990", "S/O: John Public");
        let body = multipart_body("xmlFile", "offlineaadhaar.xml", xml.as_bytes(), &[]);
        let (status, _) = send(&app, multipart_request("/api/auth/forgot-password", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    fn forgot_request(peer: &str, forwarded_for: &str) -> Request<Body> {
        let mut request = multipart_request(
            "/api/auth/forgot-password",
            multipart_body("file", "a.zip", b"not a zip", &[("shareCode", SHARE_CODE)]),
        );
        let addr: SocketAddr = format!("{peer}:40000").parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
            .headers_mut()
            .insert("x-forwarded-for", forwarded_for.parse().unwrap());
        request
    }

    #[tokio::test]
    async fn test_forgot_password_rate_limited() {
        let app = app_with(ServerConfig {
            reset_rate_limit: 2,
            ..test_config()
        });

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let (status, _) = send(&app, forgot_request("192.0.2.10", "203.0.113.7")).await;
            statuses.push(status);
        }

        assert_eq!(
            statuses,
            vec![
                StatusCode::BAD_REQUEST,
                StatusCode::BAD_REQUEST,
                StatusCode::TOO_MANY_REQUESTS
            ]
        );
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_does_not_bypass_limit() {
        let app = app_with(ServerConfig {
            reset_rate_limit: 2,
            ..test_config()
        });

        let mut statuses = Vec::new();
        for i in 0..5 {
            let forwarded = format!("10.0.0.{i}");
            let (status, _) = send(&app, forgot_request("192.0.2.10", &forwarded)).await;
            statuses.push(status);
        }

        assert_eq!(&statuses[..2], &[StatusCode::BAD_REQUEST; 2]);
        assert!(statuses[2..]
            .iter()
            .all(|status| *status == StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn test_trusted_proxy_limits_per_forwarded_client() {
        let app = app_with(ServerConfig {
            reset_rate_limit: 1,
            trust_forwarded_for: true,
            ..test_config()
        });

        // Same proxy peer, distinct clients behind it
        let (first, _) = send(&app, forgot_request("192.0.2.10", "198.51.100.1")).await;
        let (second, _) = send(&app, forgot_request("192.0.2.10", "198.51.100.2")).await;
        let (repeat, _) = send(&app, forgot_request("192.0.2.10", "198.51.100.1")).await;

        assert_eq!(first, StatusCode::BAD_REQUEST);
        assert_eq!(second, StatusCode::BAD_REQUEST);
        assert_eq!(repeat, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_timed_out_registration_creates_no_account() {
        let state = test_state(
            ServerConfig {
                pipeline_timeout: Duration::from_millis(10),
                ..test_config()
            },
            IdentityConfig::new("test-secret"),
        );
        let service = state.service.clone();

        let request = RegistrationRequest {
            archive: jane_archive(),
            share_code: SHARE_CODE.into(),
            username: "jane".into(),
            display_name: "Jane".into(),
            password: "s3cret!".into(),
        };
        // Document stage slower than the budget
        let result = run_blocking(&state, move |service, gate| {
            std::thread::sleep(Duration::from_millis(300));
            service.register_gated(request, gate)
        })
        .await;
        assert!(matches!(result, Err(ApiError::Timeout)));

        // Let the abandoned worker finish
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(service.registry().account_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_started_write_outlives_the_budget() {
        let state = test_state(
            ServerConfig {
                pipeline_timeout: Duration::from_millis(10),
                ..test_config()
            },
            IdentityConfig::new("test-secret"),
        );

        let result = run_blocking(&state, |_, gate| {
            assert!(gate.begin_commit());
            std::thread::sleep(Duration::from_millis(300));
            Ok(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_register_route_timeout_is_clean() {
        let app_state = test_state(
            ServerConfig {
                pipeline_timeout: Duration::from_millis(1),
                ..test_config()
            },
            IdentityConfig::new("test-secret"),
        );
        let service = app_state.service.clone();
        let app = router(app_state);

        let (status, _) = send(&app, register_request("jane", &jane_archive())).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        let accounts = service.registry().account_count().unwrap();

        // Either the budget expired before the write and nothing exists, or
        // the write won the race and the client was told so.
        match status {
            StatusCode::REQUEST_TIMEOUT => assert_eq!(accounts, 0),
            StatusCode::CREATED => assert_eq!(accounts, 1),
            other => panic!("unexpected status {other}"),
        }
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let app = app();

        let (status, _) = send(
            &app,
            Request::get("/api/auth/me").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::get("/api/auth/me")
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_verify_document_preview() {
        let body = multipart_body(
            "file",
            "offlineaadhaar.zip",
            &jane_archive(),
            &[("shareCode", SHARE_CODE)],
        );
        let (status, body) = send(&app(), multipart_request("/api/aadhaar/verify", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], false);
        assert_eq!(body["data"]["name"], "Jane Q Public");
        assert_eq!(body["data"]["co"], "John Public");
    }

    #[tokio::test]
    async fn test_upload_size_limit() {
        let app = app_with(ServerConfig {
            max_upload_bytes: 1024,
            ..test_config()
        });
        let body = multipart_body(
            "file",
            "big.zip",
            &vec![b'x'; 8 * 1024],
            &[("shareCode", SHARE_CODE)],
        );
        let (status, _) = send(&app, multipart_request("/api/aadhaar/verify", body)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_client_key() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.0.2.1:4000".parse().unwrap();
        assert_eq!(client_key(&headers, Some(&peer), false), "192.0.2.1");
        assert_eq!(client_key(&headers, None, false), "unknown");

        headers.insert("x-forwarded-for", "198.51.100.2, 10.0.0.1".parse().unwrap());
        assert_eq!(client_key(&headers, Some(&peer), false), "192.0.2.1");
        assert_eq!(client_key(&headers, Some(&peer), true), "198.51.100.2");
    }
}
