use axum::{
    Json, Router, async_trait,
    extract::{ConnectInfo, DefaultBodyLimit, FromRequestParts, Multipart, Path, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use sv_core::{LoginForm, RegistrationForm, ShareForm, ValidationErrors, Viewer};
use sv_engine::{DocumentService, Download, Upload};
use time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::{error_response, unauthorized};
use crate::session::SessionStore;

/// Lifetime of a "remember me" session
const REMEMBER_ME_DAYS: i64 = 30;
/// Headroom over the file size limit for multipart framing
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: DocumentService,
    pub sessions: Arc<SessionStore>,
    pub session_lifetime: Duration,
}

impl AppState {
    pub fn new(service: DocumentService, session_lifetime_hours: u64) -> Self {
        Self {
            service,
            sessions: Arc::new(SessionStore::new()),
            session_lifetime: Duration::hours(session_lifetime_hours as i64),
        }
    }
}

pub struct SecureVisionServer;

impl SecureVisionServer {
    pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(StdDuration::from_secs(600));
            loop {
                ticker.tick().await;
                sessions.purge_expired();
            }
        });

        let app = router(state);
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr).await?;

        info!("Secure Vision listening on {}", addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    // Add CORS layer to allow connections from any origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.service.settings().max_content_length + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(handle_info))
        .route("/api/register", post(api_register))
        .route("/api/login", post(api_login))
        .route("/api/logout", post(api_logout))
        .route("/api/files", get(api_dashboard).post(api_upload))
        .route("/api/files/:id", get(api_view))
        .route("/api/files/:id/download", get(api_download))
        .route("/api/files/:id/share", post(api_share))
        .route("/api/files/:id/history", get(api_history))
        .route("/api/files/:id/preview", get(api_preview))
        .route("/api/files/:id/return", get(api_return))
        .route("/api/files/:id/return-auto", get(api_return_auto))
        .route("/api/subscription", post(api_subscribe))
        .route("/api/admin", get(api_admin))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(cors),
        )
        .with_state(state)
}

/// Authenticated caller, resolved from the bearer token
pub struct Caller(pub Viewer);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Response> {
        let user_id = bearer_token(&parts.headers)
            .and_then(|token| state.sessions.resolve(token))
            .ok_or_else(unauthorized)?;

        let viewer = state.service.viewer(user_id).await.map_err(|e| {
            tracing::warn!("Session for user {} no longer valid: {}", user_id, e);
            unauthorized()
        })?;

        let ip_address = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string());
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Ok(Caller(viewer.with_request(ip_address, user_agent)))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// GET / - Service info/health check
async fn handle_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "secure-vision",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// Accounts
// ============================================================================

/// POST /api/register - Create an account
async fn api_register(
    State(state): State<AppState>,
    Json(form): Json<RegistrationForm>,
) -> Response {
    match state.service.register(&form).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/login - Exchange credentials for a bearer token
async fn api_login(State(state): State<AppState>, Json(form): Json<LoginForm>) -> Response {
    match state.service.login(&form).await {
        Ok(user) => {
            let lifetime = if form.remember_me {
                Duration::days(REMEMBER_ME_DAYS)
            } else {
                state.session_lifetime
            };
            let token = state.sessions.create(user.id, lifetime);
            Json(serde_json::json!({
                "token": token,
                "expires_in": lifetime.whole_seconds(),
                "user": user,
            }))
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /api/logout - Revoke the caller's token
async fn api_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match bearer_token(&headers) {
        Some(token) => {
            state.sessions.revoke(token);
            StatusCode::NO_CONTENT.into_response()
        }
        None => unauthorized(),
    }
}

/// POST /api/subscription - Simulated subscription purchase
async fn api_subscribe(State(state): State<AppState>, Caller(viewer): Caller) -> Response {
    match state.service.subscribe(&viewer).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/admin - Users, files and recent access logs
async fn api_admin(State(state): State<AppState>, Caller(viewer): Caller) -> Response {
    match state.service.admin_overview(&viewer).await {
        Ok(overview) => Json(overview).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Files
// ============================================================================

/// GET /api/files - Caller's files and those shared with them
async fn api_dashboard(State(state): State<AppState>, Caller(viewer): Caller) -> Response {
    match state.service.dashboard(&viewer).await {
        Ok(dashboard) => Json(dashboard).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/files - Multipart upload with `file` and optional `encrypt`
async fn api_upload(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    mut multipart: Multipart,
) -> Response {
    let mut filename = String::new();
    let mut bytes = Vec::new();
    let mut encrypt = false;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        };
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                filename = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(data) => bytes = data.to_vec(),
                    Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
                }
            }
            Some("encrypt") => match field.text().await {
                Ok(value) => encrypt = matches!(value.trim(), "true" | "on" | "1" | "yes"),
                Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            },
            _ => {}
        }
    }

    if filename.is_empty() {
        return error_response(ValidationErrors::single("file", "No file selected").into());
    }

    let upload = Upload {
        filename,
        bytes,
        encrypt,
    };
    match state.service.upload(&viewer, upload).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/files/:id - Content, masked for subscribed callers
async fn api_view(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    Path(id): Path<i64>,
) -> Response {
    match state.service.view(&viewer, id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/files/:id/download - Stored bytes as an attachment
async fn api_download(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    Path(id): Path<i64>,
) -> Response {
    match state.service.download(&viewer, id).await {
        Ok(download) => attachment(download),
        Err(e) => error_response(e),
    }
}

/// POST /api/files/:id/share - Grant another account access
async fn api_share(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    Path(id): Path<i64>,
    Json(form): Json<ShareForm>,
) -> Response {
    match state.service.share(&viewer, id, &form).await {
        Ok(()) => Json(serde_json::json!({
            "message": format!("File shared with {}", form.user_email)
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/files/:id/history - Access log of one file
async fn api_history(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    Path(id): Path<i64>,
) -> Response {
    match state.service.file_history(&viewer, id).await {
        Ok(history) => Json(history).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/files/:id/preview - Leading characters of the content
async fn api_preview(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    Path(id): Path<i64>,
) -> Response {
    match state.service.file_preview(&viewer, id).await {
        Ok(preview) => Json(preview).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/files/:id/return - Admin return
async fn api_return(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    Path(id): Path<i64>,
) -> Response {
    match state.service.return_file(&viewer, id).await {
        Ok(download) => attachment(download),
        Err(e) => error_response(e),
    }
}

/// GET /api/files/:id/return-auto - Subscriber return
async fn api_return_auto(
    State(state): State<AppState>,
    Caller(viewer): Caller,
    Path(id): Path<i64>,
) -> Response {
    match state.service.return_file_auto(&viewer, id).await {
        Ok(download) => attachment(download),
        Err(e) => error_response(e),
    }
}

fn attachment(download: Download) -> Response {
    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                "application/octet-stream".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.filename),
            ),
        ],
        download.bytes,
    )
        .into_response()
}
