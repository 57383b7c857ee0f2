//! HTTP server for the reader.
//!
//! Exposes document upload, chapter navigation and the four query contracts
//! as a JSON API over one shared [`ReaderSession`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/documents` | Upload raw bytes (`?filename=&format=&title=&language=`) |
//! | `GET`  | `/documents/current` | Current document with digest and navigation |
//! | `GET`  | `/documents/current/sections/{index}` | One section for rendering |
//! | `POST` | `/query/analyze` | Book analysis |
//! | `POST` | `/query/discover` | Book recommendations |
//! | `POST` | `/query/refine` | Refine a reader's note |
//! | `POST` | `/query/assist` | Free-form help on a passage |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unsupported_format", "message": "could not load this file: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `unsupported_format`,
//! `corrupt_document`, `too_large` (422), `provider_unavailable` (502).
//!
//! Query responses carry the `document_id` they were computed against, or
//! `null` when no document was loaded.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::extract::ExtractError;
use crate::gateway::{QueryParameters, StructuredResponse};
use crate::models::{
    title_from_filename, ChapterSection, DocumentDigest, DocumentFormat, Language, LoadedDocument,
    RawDocument, SectionHeading,
};
use crate::provider::{create_provider, Provider, ProviderError};
use crate::session::{Attributed, ReaderSession};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    session: ReaderSession,
    max_upload_bytes: usize,
}

/// Starts the server with the provider selected in `[provider]`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let provider = create_provider(&config.provider)?;
    run_server_with_provider(config, provider).await
}

/// Starts the server around an injected provider.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server_with_provider(
    config: &Config,
    provider: Arc<dyn Provider>,
) -> anyhow::Result<()> {
    let session = ReaderSession::from_config(config, provider)?;
    let app = router(session, config.reader.max_upload_bytes);

    tracing::info!(
        bind = %config.server.bind,
        provider = %config.provider.kind,
        model = %config.provider.model,
        "reader server listening"
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the route table over `session`.
///
/// Request bodies above `max_upload_bytes` stop buffering at the limit and
/// are answered with `too_large`.
pub fn router(session: ReaderSession, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", post(handle_upload))
        .route("/documents/current", get(handle_current))
        .route("/documents/current/sections/{index}", get(handle_section))
        .route("/query/analyze", post(handle_analyze))
        .route("/query/discover", post(handle_discover))
        .route("/query/refine", post(handle_refine))
        .route("/query/assist", post(handle_assist))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(AppState {
            session,
            max_upload_bytes,
        })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Machine-readable code plus a human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        let code = match err {
            ExtractError::UnsupportedFormat(_) => "unsupported_format",
            ExtractError::CorruptDocument(_) => "corrupt_document",
            ExtractError::TooLarge { .. } => "too_large",
        };
        AppError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: code.to_string(),
            message: format!("could not load this file: {}", err),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "provider_unavailable".to_string(),
            message: err.to_string(),
        }
    }
}

/// Upload refused by the body limit, reported like a library `TooLarge`.
fn too_large(limit: usize) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        code: "too_large".to_string(),
        message: format!(
            "could not load this file: document exceeds the upload limit of {} bytes",
            limit
        ),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn parse_language(raw: Option<&str>) -> Result<Option<Language>, AppError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<Language>().map_err(bad_request))
        .transpose()
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
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

// ============ Documents ============

#[derive(Deserialize)]
struct UploadParams {
    filename: Option<String>,
    format: Option<String>,
    title: Option<String>,
    language: Option<String>,
}

/// JSON view of a loaded document, without its full text.
#[derive(Serialize)]
struct DocumentView {
    id: Uuid,
    title: String,
    format: DocumentFormat,
    fingerprint: String,
    language: Language,
    loaded_at: DateTime<Utc>,
    digest: Option<DocumentDigest>,
    sections: Vec<SectionHeading>,
}

impl From<&LoadedDocument> for DocumentView {
    fn from(doc: &LoadedDocument) -> Self {
        Self {
            id: doc.id,
            title: doc.title.clone(),
            format: doc.format,
            fingerprint: doc.fingerprint.clone(),
            language: doc.language,
            loaded_at: doc.loaded_at,
            digest: doc.digest(),
            sections: doc.navigation(),
        }
    }
}

#[derive(Serialize)]
struct UploadResponse {
    /// False when a newer upload was committed first.
    committed: bool,
    document: DocumentView,
}

/// Handler for `POST /documents`.
///
/// The format comes from `format` if given, otherwise from the extension of
/// `filename`. The title defaults to the file name without its extension.
async fn handle_upload(
    State(state): State<AppState>,
    params: Result<Query<UploadParams>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Query(params) = params?;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large(state.max_upload_bytes)
        } else {
            bad_request(rejection.body_text())
        }
    })?;
    let format = match (params.format.as_deref(), params.filename.as_deref()) {
        (Some(tag), _) => tag.parse::<DocumentFormat>()?,
        (None, Some(name)) => DocumentFormat::from_filename(name)?,
        (None, None) => return Err(bad_request("either filename or format is required")),
    };
    let title = params
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| params.filename.as_deref().map(title_from_filename))
        .unwrap_or_else(|| "Untitled".to_string());
    let language = parse_language(params.language.as_deref())?;

    let raw = RawDocument::new(title, format, body.to_vec());
    let outcome = state.session.load(raw, language).await?;
    Ok(Json(UploadResponse {
        committed: outcome.is_committed(),
        document: DocumentView::from(outcome.document().as_ref()),
    }))
}

/// Handler for `GET /documents/current`.
async fn handle_current(State(state): State<AppState>) -> Result<Json<DocumentView>, AppError> {
    let doc = state
        .session
        .current()
        .ok_or_else(|| not_found("no document loaded"))?;
    Ok(Json(DocumentView::from(doc.as_ref())))
}

#[derive(Serialize)]
struct SectionResponse {
    document_id: Uuid,
    #[serde(flatten)]
    section: ChapterSection,
}

/// Handler for `GET /documents/current/sections/{index}`.
async fn handle_section(
    State(state): State<AppState>,
    index: Result<Path<usize>, PathRejection>,
) -> Result<Json<SectionResponse>, AppError> {
    let Path(index) = index?;
    let doc = state
        .session
        .current()
        .ok_or_else(|| not_found("no document loaded"))?;
    let section = doc
        .section(index)
        .cloned()
        .ok_or_else(|| not_found(format!("section {} not found", index)))?;
    Ok(Json(SectionResponse {
        document_id: doc.id,
        section,
    }))
}

// ============ Queries ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    title: String,
    #[serde(default)]
    intent: String,
    language: Option<String>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct DiscoverRequest {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    goal: String,
    language: Option<String>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct RefineRequest {
    #[serde(default)]
    author_view: String,
    my_understanding: String,
    language: Option<String>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct AssistRequest {
    target_text: String,
    action: String,
    language: Option<String>,
    model: Option<String>,
}

type QueryResult = Result<Json<Attributed<StructuredResponse>>, AppError>;

async fn dispatch(
    state: &AppState,
    parameters: QueryParameters,
    language: Option<String>,
    model: Option<String>,
) -> QueryResult {
    let language = parse_language(language.as_deref())?;
    let result = state.session.query(parameters, language, model).await?;
    Ok(Json(result))
}

/// Handler for `POST /query/analyze`.
async fn handle_analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> QueryResult {
    let Json(req) = body?;
    require("title", &req.title)?;
    let parameters = QueryParameters::AnalyzeBook {
        title: req.title,
        intent: req.intent,
    };
    dispatch(&state, parameters, req.language, req.model).await
}

/// Handler for `POST /query/discover`.
async fn handle_discover(
    State(state): State<AppState>,
    body: Result<Json<DiscoverRequest>, JsonRejection>,
) -> QueryResult {
    let Json(req) = body?;
    let tags: Vec<String> = req
        .tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() && req.goal.trim().is_empty() {
        return Err(bad_request("tags or goal must be provided"));
    }
    let parameters = QueryParameters::DiscoveryRecommendations {
        tags,
        goal: req.goal,
    };
    dispatch(&state, parameters, req.language, req.model).await
}

/// Handler for `POST /query/refine`.
async fn handle_refine(
    State(state): State<AppState>,
    body: Result<Json<RefineRequest>, JsonRejection>,
) -> QueryResult {
    let Json(req) = body?;
    require("my_understanding", &req.my_understanding)?;
    let parameters = QueryParameters::RefineInsight {
        author_view: req.author_view,
        my_understanding: req.my_understanding,
    };
    dispatch(&state, parameters, req.language, req.model).await
}

/// Handler for `POST /query/assist`.
async fn handle_assist(
    State(state): State<AppState>,
    body: Result<Json<AssistRequest>, JsonRejection>,
) -> QueryResult {
    let Json(req) = body?;
    require("target_text", &req.target_text)?;
    require("action", &req.action)?;
    let parameters = QueryParameters::AssistReading {
        target_text: req.target_text,
        action: req.action,
    };
    dispatch(&state, parameters, req.language, req.model).await
}
