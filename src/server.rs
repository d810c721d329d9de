//! HTTP server for the chat UI and its JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Single-page chat UI |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/register` | Create an account and sign in |
//! | `POST` | `/api/login` | Sign in |
//! | `POST` | `/api/logout` | End the session |
//! | `GET`/`POST` | `/api/chats` | List / create chats |
//! | `GET`/`DELETE` | `/api/chats/{name}` | Read / delete a chat |
//! | `POST` | `/api/chats/{name}/messages` | Send a message, get the reply |
//! | `GET`  | `/api/chats/{name}/history` | Transcript of the chat |
//! | `GET`  | `/api/chats/{name}/export` | Transcript as CSV |
//! | `POST`/`GET`/`DELETE` | `/api/documents` | Upload / list / clear documents |
//! | `POST` | `/api/feedback` | Rate an assistant message |
//!
//! Everything under `/api` except register and login requires
//! `Authorization: Bearer <token>` with a token from one of those two calls.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "chat not found: Q3" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `conflict` (409), `payload_too_large` (413), `unsupported_media_type` (415),
//! `internal` (500).

use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::assistant::{handle_user_message, TurnError};
use crate::chats::{create_chat, delete_chat, load_chats, save_chats};
use crate::collection;
use crate::config::Config;
use crate::db;
use crate::extract::ExtractError;
use crate::ingest::{ingest_upload, IngestError, UploadSummary};
use crate::interaction_log::{save_feedback, FeedbackEntry, FeedbackKind};
use crate::llm::LlmClient;
use crate::migrate::apply_schema;
use crate::models::{Interaction, Message, Role, StoredDocument};
use crate::paths::{collection_name, sanitize_component, user_key, DataLayout};
use crate::session::{Session, SessionStore};
use crate::transcript::{interactions_to_csv, load_interactions};
use crate::ui;
use crate::users::{self, AuthError};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub sessions: SessionStore,
    pub layout: DataLayout,
    pub llm: LlmClient,
    /// Serializes read-modify-write of a user's chat file, keyed by
    /// [`user_key`] so that every email sharing a chat file shares a lock.
    user_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool) -> anyhow::Result<Self> {
        let llm = LlmClient::new(&config.llm)?;
        Ok(Self {
            sessions: SessionStore::new(Duration::from_secs(config.server.session_ttl_secs)),
            layout: DataLayout::new(&config.storage.data_dir),
            config: Arc::new(config),
            pool,
            llm,
            user_locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    async fn user_lock(&self, email: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        // a lock only the map holds is idle
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(user_key(email))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/register", post(handle_register))
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        .route("/api/chats", get(handle_list_chats).post(handle_create_chat))
        .route(
            "/api/chats/{name}",
            get(handle_get_chat).delete(handle_delete_chat),
        )
        .route("/api/chats/{name}/messages", post(handle_send_message))
        .route("/api/chats/{name}/history", get(handle_history))
        .route("/api/chats/{name}/export", get(handle_export))
        .route(
            "/api/documents",
            post(handle_upload)
                .get(handle_list_documents)
                .delete(handle_clear_documents),
        )
        .route("/api/feedback", post(handle_feedback))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// Applies the schema first, so a fresh database works without `init`.
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;

    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), pool)?;
    let app = build_router(state);

    tracing::info!(bind = %bind_addr, "docchat server listening");
    println!("docchat listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into a JSON error response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        internal(err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmailTaken => conflict(err.to_string()),
            AuthError::InvalidCredentials | AuthError::InvalidApiKey => {
                unauthorized(err.to_string())
            }
            AuthError::MissingFields
            | AuthError::PasswordMismatch
            | AuthError::PasswordTooShort
            | AuthError::MissingApiKey => bad_request(err.to_string()),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::CONFLICT, "conflict", message)
}

fn payload_too_large(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
}

fn unsupported_media_type(message: impl Into<String>) -> AppError {
    AppError::new(
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        "unsupported_media_type",
        message,
    )
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Map upload pipeline failures: bad input is the client's fault,
/// everything else (storage, embedding provider) is ours.
fn classify_upload_error(err: anyhow::Error) -> AppError {
    if let Some(extract_err) = err.downcast_ref::<ExtractError>() {
        return match extract_err {
            ExtractError::UnsupportedType(_) => unsupported_media_type(extract_err.to_string()),
            _ => bad_request(extract_err.to_string()),
        };
    }
    if let Some(ingest_err) = err.downcast_ref::<IngestError>() {
        return bad_request(ingest_err.to_string());
    }
    tracing::error!(error = %err, "upload failed");
    internal(err.to_string())
}

fn turn_error(err: TurnError) -> AppError {
    match err {
        TurnError::ChatNotFound(_) => not_found(err.to_string()),
        TurnError::EmptyMessage => bad_request(err.to_string()),
        TurnError::Other(e) => AppError::from(e),
    }
}

// ============ Authentication ============

/// The signed-in user, resolved from the `Authorization: Bearer` header.
pub struct CurrentUser {
    pub token: String,
    pub session: Session,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then(|| token.to_string())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = bearer_token(parts).ok_or_else(|| unauthorized("missing bearer token"))?;
        let session = state
            .sessions
            .get(&token)
            .await
            .ok_or_else(|| unauthorized("session expired or invalid"))?;
        Ok(CurrentUser { token, session })
    }
}

/// Pick the user's key or the configured fallback, then check it.
async fn resolve_api_key(state: &AppState, supplied: Option<&str>) -> Result<String, AppError> {
    let key = supplied
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| state.config.llm.fallback_api_key())
        .ok_or(AuthError::MissingApiKey)?;

    if state.config.llm.validate_api_key && !state.llm.validate_api_key(&key).await {
        return Err(AuthError::InvalidApiKey.into());
    }
    Ok(key)
}

// ============ GET / and /health ============

async fn handle_index() -> Html<String> {
    Html(ui::render_index_page())
}

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

// ============ Register / login / logout ============

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirm_password: String,
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Serialize)]
struct AuthResponse {
    token: String,
    email: String,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let email = req.email.trim().to_string();
    users::validate_registration(&email, &req.password, &req.confirm_password)?;
    let api_key = resolve_api_key(&state, req.api_key.as_deref()).await?;

    if !users::create_user(&state.pool, &email, &req.password).await? {
        return Err(AuthError::EmailTaken.into());
    }

    tracing::info!(user = %email, "user registered");
    let token = state.sessions.create(&email, &api_key).await;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, email })))
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = req.email.trim().to_string();
    if email.is_empty() || req.password.is_empty() {
        return Err(AuthError::MissingFields.into());
    }
    if !users::validate_user(&state.pool, &email, &req.password).await? {
        tracing::warn!(user = %email, "failed login");
        return Err(AuthError::InvalidCredentials.into());
    }
    let api_key = resolve_api_key(&state, req.api_key.as_deref()).await?;

    tracing::info!(user = %email, "user logged in");
    let token = state.sessions.create(&email, &api_key).await;
    Ok(Json(AuthResponse { token, email }))
}

async fn handle_logout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> StatusCode {
    state.sessions.remove(&user.token).await;
    StatusCode::NO_CONTENT
}

// ============ Chats ============

#[derive(Serialize)]
struct ChatSummary {
    name: String,
    messages: usize,
}

#[derive(Serialize)]
struct ChatListResponse {
    chats: Vec<ChatSummary>,
}

#[derive(Deserialize)]
struct CreateChatRequest {
    name: String,
}

#[derive(Serialize)]
struct ChatResponse {
    name: String,
    messages: Vec<Message>,
}

async fn handle_list_chats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ChatListResponse>, AppError> {
    let chats = load_chats(&state.layout, &user.session.email)?;
    let chats = chats
        .iter()
        .map(|(name, messages)| ChatSummary {
            name: name.clone(),
            messages: messages.len(),
        })
        .collect();
    Ok(Json(ChatListResponse { chats }))
}

async fn handle_create_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), AppError> {
    let email = &user.session.email;
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(bad_request("chat name must not be empty"));
    }

    let lock = state.user_lock(email).await;
    let _guard = lock.lock().await;

    let mut chats = load_chats(&state.layout, email)?;
    if !create_chat(&mut chats, &name) {
        return Err(conflict(format!("chat already exists: {}", name)));
    }
    save_chats(&state.layout, email, &chats)?;

    Ok((
        StatusCode::CREATED,
        Json(ChatResponse {
            name,
            messages: Vec::new(),
        }),
    ))
}

async fn handle_get_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(name): Path<String>,
) -> Result<Json<ChatResponse>, AppError> {
    let mut chats = load_chats(&state.layout, &user.session.email)?;
    let messages = chats
        .remove(&name)
        .ok_or_else(|| not_found(format!("chat not found: {}", name)))?;
    Ok(Json(ChatResponse { name, messages }))
}

async fn handle_delete_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    let email = &user.session.email;
    let lock = state.user_lock(email).await;
    let _guard = lock.lock().await;

    let mut chats = load_chats(&state.layout, email)?;
    if !delete_chat(&mut chats, &name) {
        return Err(not_found(format!("chat not found: {}", name)));
    }
    save_chats(&state.layout, email, &chats)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SendMessageRequest {
    content: String,
}

#[derive(Serialize)]
struct SendMessageResponse {
    reply: String,
    messages: Vec<Message>,
}

async fn handle_send_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(name): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let email = &user.session.email;
    let lock = state.user_lock(email).await;
    let _guard = lock.lock().await;

    let outcome = handle_user_message(
        &state.config,
        &state.pool,
        &state.layout,
        &state.llm,
        &user.session.api_key,
        email,
        &name,
        &req.content,
    )
    .await
    .map_err(turn_error)?;

    Ok(Json(SendMessageResponse {
        reply: outcome.reply,
        messages: outcome.messages,
    }))
}

#[derive(Serialize)]
struct HistoryResponse {
    chat: String,
    interactions: Vec<Interaction>,
}

async fn handle_history(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(name): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let interactions = load_interactions(&state.layout, &user.session.email, &name)?;
    Ok(Json(HistoryResponse {
        chat: name,
        interactions,
    }))
}

async fn handle_export(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let interactions = load_interactions(&state.layout, &user.session.email, &name)?;
    if interactions.is_empty() {
        return Err(not_found(format!("no history for chat: {}", name)));
    }
    let csv = interactions_to_csv(&interactions)?;
    let disposition = format!(
        "attachment; filename=\"{}.csv\"",
        sanitize_component(&name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

// ============ Documents ============

async fn handle_upload(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadSummary>), AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(|name| name.to_string())
            .ok_or_else(|| bad_request("file field has no filename"))?;
        let content_type = field.content_type().map(|ct| ct.to_string());
        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            return Err(bad_request("uploaded file is empty"));
        }

        let summary = ingest_upload(
            &state.config,
            &state.pool,
            &state.layout,
            &user.session.email,
            &filename,
            content_type.as_deref(),
            &data,
        )
        .await
        .map_err(classify_upload_error)?;
        return Ok((StatusCode::CREATED, Json(summary)));
    }

    Err(bad_request("multipart field 'file' is required"))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        payload_too_large(err.body_text())
    } else {
        bad_request(err.body_text())
    }
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<StoredDocument>,
    chunks: i64,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<DocumentListResponse>, AppError> {
    let collection = collection_name(&user.session.email);
    let documents = collection::list_documents(&state.pool, &collection).await?;
    let chunks = collection::count(&state.pool, &collection).await?;
    Ok(Json(DocumentListResponse { documents, chunks }))
}

#[derive(Serialize)]
struct ClearResponse {
    removed: u64,
}

async fn handle_clear_documents(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ClearResponse>, AppError> {
    let collection = collection_name(&user.session.email);
    let removed = collection::clear(&state.pool, &collection).await?;
    tracing::info!(user = %user.session.email, removed, "collection cleared");
    Ok(Json(ClearResponse { removed }))
}

// ============ Feedback ============

#[derive(Deserialize)]
struct FeedbackRequest {
    chat: String,
    message_index: usize,
    feedback: FeedbackKind,
}

async fn handle_feedback(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<FeedbackRequest>,
) -> Result<StatusCode, AppError> {
    let email = &user.session.email;
    let chats = load_chats(&state.layout, email)?;
    let messages = chats
        .get(&req.chat)
        .ok_or_else(|| not_found(format!("chat not found: {}", req.chat)))?;
    let latest = messages.len().checked_sub(1);
    match messages.last() {
        Some(m) if m.role == Role::Assistant && latest == Some(req.message_index) => {}
        _ => {
            return Err(bad_request(
                "message_index must refer to the latest assistant message",
            ))
        }
    }

    save_feedback(
        &state.layout,
        &FeedbackEntry::new(email, &req.chat, req.message_index, req.feedback),
    )?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn state() -> AppState {
        let config = parse_config(
            r#"
[db]
path = "/tmp/unused.sqlite"

[storage]
data_dir = "/tmp/unused"

[embedding]
provider = "disabled"
"#,
        )
        .unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        AppState::new(config, pool).unwrap()
    }

    #[tokio::test]
    async fn user_locks_are_keyed_per_account_and_pruned() {
        let state = state().await;

        let a = state.user_lock("ana.lima@example.com").await;
        let again = state.user_lock(" ana.lima@example.com ").await;
        assert!(Arc::ptr_eq(&a, &again));
        let b = state.user_lock("ana_lima@other.org").await;
        assert!(!Arc::ptr_eq(&a, &b));
        drop((a, again, b));

        let _c = state.user_lock("bo@example.com").await;
        let locks = state.user_locks.lock().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key(&user_key("bo@example.com")));
    }

    #[test]
    fn upload_errors_are_classified_by_type() {
        let err = classify_upload_error(IngestError::NoText("a.txt".into()).into());
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = classify_upload_error(IngestError::EmbeddingDisabled.into());
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = classify_upload_error(ExtractError::UnsupportedType("png".into()).into());
        assert_eq!(err.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let err = classify_upload_error(anyhow::anyhow!("Ollama API error 403: account disabled"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "internal");
    }
}
