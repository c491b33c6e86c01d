use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use search_core::engine::TermWeight;
use search_core::{
    BatchOutcome, ClearCacheOutcome, Document, DocumentInput, EngineStats, Explanation, Metadata,
    PerformanceStats, RankerKind, SearchEngine, SearchError, SearchHit, DEFAULT_TOP_N,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
}

/// Maps core errors onto HTTP statuses with a JSON `{"error": ..}` body.
pub struct ApiError(SearchError);

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self { ApiError(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SearchError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SearchError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_limit", alias = "k")]
    pub limit: i64,
}
fn default_limit() -> i64 { DEFAULT_TOP_N as i64 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub limit: usize,
    pub count: usize,
    pub took_s: f64,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct MutationResponse {
    pub success: bool,
    pub id: String,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
}

impl From<Document> for DocumentResponse {
    fn from(d: Document) -> Self { Self { id: d.id, content: d.content, metadata: d.metadata } }
}

#[derive(Deserialize)]
pub struct BatchRequest {
    pub documents: Vec<serde_json::Value>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub stats: EngineStats,
}

#[derive(Deserialize)]
pub struct ExplainParams {
    pub q: String,
}

#[derive(Deserialize)]
pub struct TermsParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Serialize, Deserialize)]
pub struct RankerBody {
    pub ranker: String,
}

#[derive(Serialize)]
pub struct CacheToggleResponse {
    pub enabled: bool,
}

/// CORS from `CORS_ALLOW_ORIGIN` (comma-separated), any origin otherwise.
pub fn cors_layer() -> CorsLayer {
    match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    }
}

pub fn build_app(engine: Arc<SearchEngine>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({ "status": "ok" })) }))
        .route("/search", get(search_handler))
        .route("/documents", post(index_handler))
        .route("/documents/batch", post(batch_handler))
        .route("/documents/:id", get(get_document_handler).delete(remove_handler))
        .route("/documents/:id/explain", get(explain_handler))
        .route("/documents/:id/terms", get(terms_handler))
        .route("/stats", get(stats_handler))
        .route("/stats/performance", get(performance_handler))
        .route("/cache/clear", post(clear_cache_handler))
        .route("/cache/enable", post(enable_cache_handler))
        .route("/cache/disable", post(disable_cache_handler))
        .route("/ranker", get(get_ranker_handler).post(change_ranker_handler))
        .with_state(AppState { engine })
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

fn positive(limit: i64, what: &str) -> Result<usize, ApiError> {
    usize::try_from(limit)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ApiError(SearchError::invalid_input(format!("{what} must be a positive integer"))))
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<SearchResponse> {
    let start = std::time::Instant::now();
    let limit = positive(params.limit, "limit")?;
    let results = state.engine.search(&params.q, limit)?;
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, limit, count: results.len(), took_s: elapsed.as_secs_f64(), results }))
}

pub async fn index_handler(State(state): State<AppState>, Json(doc): Json<DocumentInput>) -> ApiResult<MutationResponse> {
    state.engine.index_document(&doc.id, &doc.content, doc.metadata)?;
    Ok(Json(MutationResponse { success: true, id: doc.id }))
}

/// Entries that do not parse as documents count against `indexed_count`
/// instead of failing the whole batch.
pub async fn batch_handler(State(state): State<AppState>, Json(req): Json<BatchRequest>) -> Json<BatchOutcome> {
    let total_count = req.documents.len();
    let docs: Vec<DocumentInput> = req
        .documents
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<DocumentInput>(v) {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed batch entry");
                None
            }
        })
        .collect();
    let outcome = state.engine.index_documents(docs);
    Json(BatchOutcome { indexed_count: outcome.indexed_count, total_count })
}

pub async fn get_document_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<DocumentResponse> {
    match state.engine.get_document(&id)? {
        Some(doc) => Ok(Json(doc.into())),
        None => Err(SearchError::not_found(format!("document {id:?}")).into()),
    }
}

pub async fn remove_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<MutationResponse> {
    let success = state.engine.remove_document(&id)?;
    Ok(Json(MutationResponse { success, id }))
}

pub async fn explain_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ExplainParams>,
) -> ApiResult<Explanation> {
    match state.engine.explain(&params.q, &id)? {
        Some(exp) => Ok(Json(exp)),
        None => Err(SearchError::not_found(format!("document {id:?}")).into()),
    }
}

pub async fn terms_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TermsParams>,
) -> ApiResult<Vec<TermWeight>> {
    let limit = positive(params.limit, "limit")?;
    match state.engine.document_terms(&id, limit)? {
        Some(terms) => Ok(Json(terms)),
        None => Err(SearchError::not_found(format!("document {id:?}")).into()),
    }
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse { stats: state.engine.get_stats() })
}

pub async fn performance_handler(State(state): State<AppState>) -> Json<PerformanceStats> {
    Json(state.engine.performance_stats())
}

pub async fn clear_cache_handler(State(state): State<AppState>) -> Json<ClearCacheOutcome> {
    Json(state.engine.clear_cache())
}

pub async fn enable_cache_handler(State(state): State<AppState>) -> Json<CacheToggleResponse> {
    state.engine.enable_caching();
    Json(CacheToggleResponse { enabled: true })
}

pub async fn disable_cache_handler(State(state): State<AppState>) -> Json<CacheToggleResponse> {
    state.engine.disable_caching();
    Json(CacheToggleResponse { enabled: false })
}

pub async fn get_ranker_handler(State(state): State<AppState>) -> Json<RankerBody> {
    Json(RankerBody { ranker: state.engine.ranker_kind().to_string() })
}

pub async fn change_ranker_handler(State(state): State<AppState>, Json(body): Json<RankerBody>) -> ApiResult<RankerBody> {
    let kind: RankerKind = body.ranker.parse()?;
    state.engine.change_ranker(kind);
    Ok(Json(RankerBody { ranker: kind.to_string() }))
}
