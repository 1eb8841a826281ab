use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use fieldsync_core::models::{ConflictFilter, ConflictRecord, ResolutionStrategy, SyncOperation};
use fieldsync_core::sync::{BatchReport, BatchStatus, OperationResult, OperationType, RawOperation};
use fieldsync_core::util::user_fingerprint;
use fieldsync_core::{Inspection, InspectionId, SyncService};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::{operation_status, AppError};
use crate::rate_limit::{EndpointClass, EndpointRateLimiter, RateLimitMetricsSnapshot};

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    service: SyncService,
    jwt_verifier: Arc<JwtVerifier>,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, service: SyncService) -> Self {
        Self {
            jwt_verifier: Arc::new(JwtVerifier::new(&config)),
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(&config)),
            service,
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync/batch", post(sync_batch))
        .route("/sync/operations", get(list_operations))
        .route("/inspections", get(list_inspections).post(create_inspection))
        .route(
            "/inspections/{id}",
            get(get_inspection)
                .put(update_inspection)
                .delete(delete_inspection),
        )
        .route("/inspections/{id}/approve", post(approve_inspection))
        .route("/inspections/{id}/reject", post(reject_inspection))
        .route("/conflicts", get(list_conflicts))
        .route("/conflicts/{id}/resolve", post(resolve_conflict))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Run blocking engine work off the async executor
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| AppError::internal(format!("Worker task failed: {error}")))?
}

#[derive(Debug, Deserialize)]
struct SyncBatchRequest {
    operations: Vec<RawOperation>,
}

async fn sync_batch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<SyncBatchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchReport>), AppError> {
    state
        .endpoint_rate_limiter
        .check(EndpointClass::SyncBatch, &user.user_id)
        .await?;
    let Json(request) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let identity = user.identity();
    let service = state.service.clone();
    let report =
        blocking(move || Ok(service.process_batch(&request.operations, &identity)?)).await?;

    tracing::info!(
        endpoint = "sync_batch",
        user = user_fingerprint(&user.user_id),
        total = report.summary.total,
        conflicted = report.summary.conflicted,
        failed = report.summary.failed,
        "Processed sync batch"
    );
    let status = match report.status {
        BatchStatus::Completed => StatusCode::OK,
        BatchStatus::Partial => StatusCode::MULTI_STATUS,
    };
    Ok((status, Json(report)))
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

impl PageQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

async fn list_operations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<SyncOperation>>, AppError> {
    let identity = user.identity();
    let service = state.service;
    let operations =
        blocking(move || Ok(service.history(&identity, page.limit(), page.offset())?)).await?;
    Ok(Json(operations))
}

async fn list_inspections(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Inspection>>, AppError> {
    let identity = user.identity();
    let service = state.service;
    let inspections =
        blocking(move || Ok(service.list_inspections(&identity, page.limit(), page.offset())?))
            .await?;
    Ok(Json(inspections))
}

async fn get_inspection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<Inspection>, AppError> {
    let id = parse_inspection_id(&id)?;
    let identity = user.identity();
    let service = state.service;
    let inspection = blocking(move || Ok(service.get_inspection(&identity, &id)?)).await?;
    Ok(Json(inspection))
}

async fn create_inspection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let data = json_object(body)?;
    run_single(&state, &user, &headers, OperationType::CreateInspection, data).await
}

async fn update_inspection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let data = with_id(json_object(body)?, &id)?;
    run_single(&state, &user, &headers, OperationType::UpdateInspection, data).await
}

#[derive(Debug, Deserialize)]
struct VersionQuery {
    version: Option<i64>,
}

async fn delete_inspection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Query(query): Query<VersionQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let version = query
        .version
        .ok_or_else(|| AppError::bad_request("`version` query parameter is required"))?;
    let mut data = Map::new();
    data.insert("version".to_string(), Value::from(version));
    let data = with_id(Value::Object(data), &id)?;
    run_single(&state, &user, &headers, OperationType::DeleteInspection, data).await
}

async fn approve_inspection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let data = with_id(json_object(body)?, &id)?;
    run_single(&state, &user, &headers, OperationType::ApproveInspection, data).await
}

async fn reject_inspection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let data = with_id(json_object(body)?, &id)?;
    run_single(&state, &user, &headers, OperationType::RejectInspection, data).await
}

/// Process one write as a batch of one and map its result onto an HTTP status
async fn run_single(
    state: &AppState,
    user: &AuthenticatedUser,
    headers: &HeaderMap,
    operation_type: OperationType,
    data: Value,
) -> Result<Response, AppError> {
    state
        .endpoint_rate_limiter
        .check(EndpointClass::Write, &user.user_id)
        .await?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .ok_or_else(|| AppError::bad_request("Idempotency-Key header is required"))?
        .to_str()
        .map_err(|_| AppError::bad_request("Idempotency-Key header is not valid UTF-8"))?
        .trim()
        .to_string();

    let operation = RawOperation::new(operation_type.as_str(), idempotency_key, data);
    let identity = user.identity();
    let service = state.service.clone();
    let processed = blocking(move || Ok(service.process_single(&operation, &identity))).await?;

    tracing::info!(
        endpoint = operation_type.as_str(),
        user = user_fingerprint(&user.user_id),
        outcome = processed.outcome.as_str(),
        "Processed single operation"
    );

    // A replayed create answers exactly like the original
    let status = match &processed.result {
        OperationResult::Success(_) if operation_type == OperationType::CreateInspection => {
            StatusCode::CREATED
        }
        OperationResult::Success(_) => StatusCode::OK,
        OperationResult::Conflict(_) => StatusCode::CONFLICT,
        OperationResult::Failure(failure) => operation_status(failure.error),
    };
    Ok((status, Json(processed.result)).into_response())
}

#[derive(Debug, Deserialize)]
struct ConflictQuery {
    entity_id: Option<String>,
    resolved: Option<bool>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_conflicts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ConflictQuery>,
) -> Result<Json<Vec<ConflictRecord>>, AppError> {
    let page = PageQuery {
        limit: query.limit,
        offset: query.offset,
    };
    let filter = ConflictFilter {
        entity_id: query.entity_id.as_deref().map(parse_inspection_id).transpose()?,
        resolved: query.resolved,
        limit: Some(page.limit()),
        offset: Some(page.offset()),
    };
    let identity = user.identity();
    let service = state.service;
    let conflicts = blocking(move || Ok(service.list_conflicts(&identity, &filter)?)).await?;
    Ok(Json(conflicts))
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    strategy: ResolutionStrategy,
}

async fn resolve_conflict(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ConflictRecord>, AppError> {
    state
        .endpoint_rate_limiter
        .check(EndpointClass::Write, &user.user_id)
        .await?;
    let Json(request) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let identity = user.identity();
    let service = state.service.clone();
    let record =
        blocking(move || Ok(service.resolve_conflict(&identity, id, request.strategy)?)).await?;
    tracing::info!(
        endpoint = "conflict_resolve",
        user = user_fingerprint(&user.user_id),
        conflict_id = id,
        "Resolved conflict"
    );
    Ok(Json(record))
}

fn parse_inspection_id(value: &str) -> Result<InspectionId, AppError> {
    value
        .parse()
        .map_err(|_| AppError::bad_request(format!("`{value}` is not a valid inspection id")))
}

fn json_object(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    let Json(value) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    if !value.is_object() {
        return Err(AppError::bad_request("Request body must be a JSON object"));
    }
    Ok(value)
}

/// Put the path id into the operation payload, overriding any body value
fn with_id(mut data: Value, id: &str) -> Result<Value, AppError> {
    let id = parse_inspection_id(id)?;
    if let Value::Object(fields) = &mut data {
        fields.insert("id".to_string(), Value::String(id.to_string()));
    }
    Ok(data)
}
