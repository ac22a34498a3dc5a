//! HTTP API server.
//!
//! Exposes the record store and export pipeline as a JSON HTTP API for the
//! web frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/login` | Exchange a password for a session cookie |
//! | `POST` | `/api/logout` | Clear the session cookie |
//! | `GET`  | `/api/dashboard` | Group → record summaries |
//! | `GET`  | `/api/items` | Paginated item listing, newest first |
//! | `GET`  | `/api/export/archive` | Stream a ZIP of selected attachments |
//! | `GET`  | `/api/export/text` | JSON attachment of selected item texts |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no matching records" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found`
//! (404), `internal` (500).
//!
//! # Auth
//!
//! Sessions are HMAC-signed cookies (see [`crate::auth`]). Every route
//! except login accepts anonymous callers; an authenticated identity only
//! changes which desired-list the exports resolve.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients on other ports.

use axum::{
    body::Body,
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::io::{Seek, SeekFrom};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};

use crate::auth;
use crate::config::Config;
use crate::export::{self, ExportError};
use crate::fetch::{Fetch, StoreFetcher};
use crate::models::{Item, Record};
use crate::prompts;
use crate::report::NoProgress;
use crate::select::{self, ExportFilter, ExportRequest};
use crate::store;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub fetcher: Arc<dyn Fetch>,
}

/// Starts the HTTP server on the configured bind address.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        fetcher: Arc::new(StoreFetcher::new(&config.export)?),
    };

    let app = router(state);

    println!("timeline-vault listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the application router. Split out so tests can drive the API
/// without binding a socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        .route("/api/dashboard", get(handle_dashboard))
        .route("/api/items", get(handle_items))
        .route("/api/export/archive", get(handle_export_archive))
        .route("/api/export/text", get(handle_export_text))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map pipeline errors onto the HTTP contract. NotFound is an expected
/// steady-state answer; everything else is a defect or environment
/// failure and logs before turning into a 500.
fn map_export_error(e: ExportError) -> AppError {
    match e {
        ExportError::NotFound => not_found("no matching records"),
        other => {
            eprintln!("Export error: {}", other);
            internal(other.to_string())
        }
    }
}

// ============ Session extraction ============

/// The optional session identity. Extraction never rejects: a missing or
/// invalid cookie is simply an anonymous caller.
struct AuthUser(Option<String>);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| auth::user_from_cookie_header(h, &state.config.auth.secret));
        Ok(AuthUser(user))
    }
}

// ============ POST /api/login, /api/logout ============

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    user: Option<String>,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    user: String,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let user = auth::check_password(&state.config.auth, body.user.as_deref(), &body.password)
        .ok_or_else(|| unauthorized("incorrect password"))?;

    let token = auth::mint_token(user, &state.config.auth.secret);
    let cookie = format!(
        "{}={}; HttpOnly; Path=/; Max-Age=86400",
        auth::TOKEN_COOKIE,
        token
    );

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            user: user.to_string(),
        }),
    )
        .into_response())
}

async fn handle_logout() -> Response {
    let cookie = format!("{}=; HttpOnly; Path=/; Max-Age=0", auth::TOKEN_COOKIE);
    (
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "ok": true })),
    )
        .into_response()
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/dashboard ============

#[derive(Serialize)]
struct DashboardGroup {
    group: String,
    records: Vec<RecordSummary>,
}

#[derive(Serialize)]
struct RecordSummary {
    name: String,
    item_count: usize,
    last_published_at: Option<DateTime<Utc>>,
    thumbnail: Option<String>,
}

async fn handle_dashboard(State(state): State<AppState>) -> Json<Vec<DashboardGroup>> {
    let mut dashboard = Vec::new();

    for group in &state.config.groups {
        let records = store::load_group_records(&state.config, &group.name);
        let summaries: Vec<RecordSummary> = records
            .iter()
            .map(|record| RecordSummary {
                name: record.name.clone(),
                item_count: record.items.len(),
                last_published_at: Item::latest(&record.items),
                thumbnail: latest_thumbnail(record, group.base_url.as_deref()),
            })
            .collect();

        dashboard.push(DashboardGroup {
            group: group.name.clone(),
            records: summaries,
        });
    }

    Json(dashboard)
}

/// First attachment of the newest item, as a fetchable URL string where
/// possible.
fn latest_thumbnail(record: &Record, base_url: Option<&str>) -> Option<String> {
    let latest = record
        .items
        .iter()
        .filter(|i| !i.attachments.is_empty())
        .max_by_key(|i| i.published_at)?;
    let raw = latest.attachments.first()?;

    if raw.starts_with('/') {
        if let Some(base) = base_url {
            return Some(format!("{}{}", base.trim_end_matches('/'), raw));
        }
    }
    Some(raw.clone())
}

// ============ GET /api/items ============

#[derive(Deserialize)]
struct ItemsParams {
    name: Option<String>,
    group: Option<String>,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_page() -> usize {
    1
}
fn default_limit() -> usize {
    20
}

#[derive(Serialize)]
struct ItemView {
    id: String,
    record: String,
    group: String,
    published_at: DateTime<Utc>,
    text: Option<String>,
    attachments: Vec<String>,
}

#[derive(Serialize)]
struct ItemsResponse {
    list: Vec<ItemView>,
    has_more: bool,
}

async fn handle_items(
    State(state): State<AppState>,
    Query(params): Query<ItemsParams>,
) -> Result<Json<ItemsResponse>, AppError> {
    if params.page == 0 || params.limit == 0 {
        return Err(bad_request("page and limit must be >= 1"));
    }

    let records = match (&params.name, &params.group) {
        (Some(name), Some(group)) => {
            let request = ExportRequest {
                filter: ExportFilter::Single {
                    name: name.clone(),
                    group: group.clone(),
                },
                cutoff: None,
                item: None,
            };
            select::resolve_records(&state.config, &request)
        }
        _ => store::load_all_records(&state.config),
    };

    let mut items: Vec<ItemView> = records
        .iter()
        .flat_map(|record| {
            record.items.iter().map(|item| ItemView {
                id: item.id.clone(),
                record: record.name.clone(),
                group: record.group.clone(),
                published_at: item.published_at,
                text: item.text.clone(),
                attachments: item.attachments.clone(),
            })
        })
        .collect();
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let start = (params.page - 1) * params.limit;
    let end = params.page * params.limit;
    let has_more = end < items.len();
    let list: Vec<ItemView> = items.into_iter().skip(start).take(params.limit).collect();

    Ok(Json(ItemsResponse { list, has_more }))
}

// ============ GET /api/export/* ============

#[derive(Deserialize)]
struct ExportParams {
    name: Option<String>,
    group: Option<String>,
    /// Cutoff date, `yyyyMMdd`.
    date: Option<String>,
    /// Narrow the export to one item id.
    item: Option<String>,
    /// Export every record instead of the desired-list.
    #[serde(default)]
    all: bool,
}

/// Translate query parameters plus the session identity into a pipeline
/// request.
fn build_request(
    config: &Config,
    params: &ExportParams,
    user: Option<&str>,
) -> Result<ExportRequest, AppError> {
    let cutoff = params
        .date
        .as_deref()
        .map(select::parse_cutoff)
        .transpose()
        .map_err(|e| bad_request(e.to_string()))?;

    let filter = match (&params.name, &params.group) {
        (Some(name), Some(group)) => ExportFilter::Single {
            name: name.clone(),
            group: group.clone(),
        },
        (None, None) if params.all => ExportFilter::All,
        (None, None) => ExportFilter::Desired(store::load_desired_list(config, user)),
        _ => return Err(bad_request("name and group must be given together")),
    };

    Ok(ExportRequest {
        filter,
        cutoff,
        item: params.item.clone(),
    })
}

async fn handle_export_archive(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    let request = build_request(&state.config, &params, user.as_deref())?;

    // Assemble into an unlinked temp file so memory stays bounded no
    // matter how large the export grows.
    let sink = tempfile::tempfile().map_err(|e| internal(format!("temp file: {}", e)))?;

    let (mut file, outcome) = export::run_export(
        &state.config,
        &request,
        Arc::clone(&state.fetcher),
        sink,
        &NoProgress,
    )
    .await
    .map_err(map_export_error)?;

    for (locator, reason) in &outcome.failures {
        eprintln!("Export: skipped {} ({})", locator, reason);
    }
    eprintln!(
        "Export completed: {} attempted, {} archived, {} failed",
        outcome.attempted, outcome.succeeded, outcome.failed
    );

    file.seek(SeekFrom::Start(0))
        .map_err(|e| internal(format!("archive rewind: {}", e)))?;
    let content_length = file.metadata().map(|m| m.len()).ok();

    let stream = ReaderStream::new(tokio::fs::File::from_std(file));
    let body = Body::from_stream(stream);

    let disposition = format!(
        "attachment; filename=\"{}\"",
        state.config.export.archive_name
    );
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .map_err(|e| internal(format!("archive name: {}", e)))?,
    );
    if let Some(len) = content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    Ok((headers, body).into_response())
}

async fn handle_export_text(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    let request = build_request(&state.config, &params, user.as_deref())?;
    let entries = prompts::run_text_export(&state.config, &request).map_err(map_export_error)?;

    Ok((
        [(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"prompts.json\"",
        )],
        Json(entries),
    )
        .into_response())
}
