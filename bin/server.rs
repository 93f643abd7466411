// Money Ledger - Web Server
// REST API with Axum: categories, transactions, uploads, analytics

use anyhow::Context;
use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{header, request::Parts, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use clap::Parser;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use money_ledger::db::{self, TransactionPage, TransactionQuery};
use money_ledger::{
    ingest_receipt, ingest_statement, open_database, summarize_for_user, AnalyticsSummary, AppConfig,
    Category, DateRange, ImportSummary, IngestError, LedgerError, NewCategory, NewTransaction,
    PdfTextExtractor, ReceiptExtraction, TesseractOcr, Transaction, UserId,
};

/// Header carrying the id of the user authenticated upstream
const USER_HEADER: &str = "x-user-id";

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<AppConfig>,
    ocr: Arc<TesseractOcr>,
    pdf: Arc<PdfTextExtractor>,
}

impl AppState {
    fn new(conn: Connection, config: AppConfig) -> Self {
        AppState {
            ocr: Arc::new(TesseractOcr::from_config(&config.ingest)),
            pdf: Arc::new(PdfTextExtractor::from_config(&config.ingest)),
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        }
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal(anyhow::anyhow!("ledger lock poisoned")))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
enum ApiError {
    Unauthorized,
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Ingest(IngestError),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(ledger) = err.downcast_ref::<LedgerError>() {
            return ApiError::BadRequest(ledger.to_string());
        }
        if db::is_constraint_violation(&err) {
            return ApiError::Conflict(format!("{:#}", err));
        }
        ApiError::Internal(err)
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::Ingest(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                format!("missing or invalid {} header", USER_HEADER),
            ),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Ingest(err) => {
                let status = match err {
                    IngestError::MalformedInput { .. } => StatusCode::BAD_REQUEST,
                    IngestError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    IngestError::Extraction(_) => StatusCode::BAD_GATEWAY,
                    IngestError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err)),
        };

        if status.is_server_error() {
            error!(%status, %message, "request failed");
        } else {
            warn!(%status, %message, "request rejected");
        }

        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// The authenticated user, taken from the `x-user-id` header
struct CurrentUser(UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<UserId>().ok())
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeParams {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionParams {
    page: Option<u32>,
    limit: Option<u32>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    category_id: Option<i64>,
}

/// Bytes of the multipart field called `name`
async fn read_upload(mut multipart: Multipart, name: &str) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some(name) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            return Ok(bytes.to_vec());
        }
    }

    Err(ApiError::BadRequest(format!("multipart field '{}' is required", name)))
}

fn require_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    Ok(())
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Vec<Category>> {
    let conn = state.ledger()?;
    Ok(Json(ApiResponse::ok(db::list_categories(&conn, user)?)))
}

/// POST /api/categories
async fn create_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<NewCategory>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), ApiError> {
    require_name(&body.name)?;
    let body = NewCategory::new(body.name.trim(), body.kind);

    let conn = state.ledger()?;
    let category = db::create_category(&conn, user, &body)?;
    info!(user, category_id = category.id, name = %category.name, "category created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(category))))
}

/// PUT /api/categories/:id
async fn update_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<NewCategory>,
) -> ApiResult<Category> {
    require_name(&body.name)?;
    let body = NewCategory::new(body.name.trim(), body.kind);

    let conn = state.ledger()?;
    db::update_category(&conn, user, id, &body)?
        .map(|category| Json(ApiResponse::ok(category)))
        .ok_or_else(|| ApiError::NotFound(format!("category {}", id)))
}

/// DELETE /api/categories/:id - refused while transactions use it
async fn delete_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let conn = state.ledger()?;
    match db::delete_category(&conn, user, id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(ApiError::NotFound(format!("category {}", id))),
        Err(e) if db::is_constraint_violation(&e) => Err(ApiError::Conflict(format!(
            "category {} is still used by transactions",
            id
        ))),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/transactions?page&limit&startDate&endDate&categoryId
async fn list_transactions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<TransactionParams>,
) -> ApiResult<TransactionPage> {
    let defaults = TransactionQuery::default();
    let query = TransactionQuery {
        page: params.page.unwrap_or(defaults.page),
        limit: params.limit.unwrap_or(defaults.limit),
        category_id: params.category_id,
        range: DateRange::from_bounds(params.start_date, params.end_date),
    };

    let conn = state.ledger()?;
    Ok(Json(ApiResponse::ok(db::list_transactions_page(&conn, user, &query)?)))
}

/// POST /api/transactions
async fn create_transaction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<NewTransaction>,
) -> Result<(StatusCode, Json<ApiResponse<Transaction>>), ApiError> {
    if body.description.trim().is_empty() {
        return Err(ApiError::BadRequest("description must not be empty".to_string()));
    }

    let conn = state.ledger()?;
    let transaction = db::create_transaction(&conn, user, &body)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(transaction))))
}

/// PUT /api/transactions/:id
async fn update_transaction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<NewTransaction>,
) -> ApiResult<Transaction> {
    if body.description.trim().is_empty() {
        return Err(ApiError::BadRequest("description must not be empty".to_string()));
    }

    let conn = state.ledger()?;
    db::update_transaction(&conn, user, id, &body)?
        .map(|transaction| Json(ApiResponse::ok(transaction)))
        .ok_or_else(|| ApiError::NotFound(format!("transaction {}", id)))
}

/// DELETE /api/transactions/:id
async fn delete_transaction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let conn = state.ledger()?;
    if db::delete_transaction(&conn, user, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("transaction {}", id)))
    }
}

/// POST /api/upload/receipt - multipart field `receipt`; nothing is stored
async fn upload_receipt(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    multipart: Multipart,
) -> ApiResult<ReceiptExtraction> {
    let bytes = read_upload(multipart, "receipt").await?;
    let extraction = ingest_receipt(state.ocr.as_ref(), bytes).await?;
    Ok(Json(ApiResponse::ok(extraction)))
}

/// POST /api/transactions/upload-pdf - multipart field `statement`
async fn upload_statement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> ApiResult<ImportSummary> {
    let bytes = read_upload(multipart, "statement").await?;
    let summary = ingest_statement(state.pdf.as_ref(), bytes, &state.db, user).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// GET /api/analytics/summary?startDate&endDate
async fn analytics_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<RangeParams>,
) -> ApiResult<AnalyticsSummary> {
    let range = DateRange::from_bounds(params.start_date, params.end_date);
    let conn = state.ledger()?;
    Ok(Json(ApiResponse::ok(summarize_for_user(&conn, user, range)?)))
}

// ============================================================================
// Router
// ============================================================================

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(USER_HEADER)]);

    if origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin '{}'", origin))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(layer.allow_origin(origins))
}

fn app(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.server.cors_origins)?;
    let body_limit = state.config.ingest.max_upload_bytes;

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/upload-pdf", post(upload_statement))
        .route("/transactions/:id", put(update_transaction).delete(delete_transaction))
        .route("/upload/receipt", post(upload_receipt))
        .route("/analytics/summary", get(analytics_summary))
        .with_state(state);

    Ok(Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors))
}

// ============================================================================
// Main Server
// ============================================================================

#[derive(Parser)]
#[command(name = "money-ledger-server", version, about = "Money ledger REST API")]
struct Args {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let conn = open_database(&config.database.path)?;
    let addr = config.bind_address();
    let app = app(AppState::new(conn, config))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "money ledger API listening");
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
