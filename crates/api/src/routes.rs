use std::sync::Arc;
use std::time::Duration;

use analysis::{InsightService, ReputationService};
use axum::error_handling::HandleErrorLayer;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{BoxError, Json, Router};
use db::{EventSearch, LookupKind, Repositories};
use once_cell::sync::Lazy;
use prometheus::{register_int_gauge, Encoder, IntGauge};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tracing::instrument;

use crate::dto::{LookupDto, MinDateDto, ScopeParams};
use crate::error::{ApiError, ApiResult};

pub const METRICS_PATH: &str = "/metrics";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_LOOKUP_LIMIT: i64 = 20;
const DEFAULT_LIST_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct ApiState {
    pub repositories: Arc<dyn Repositories>,
    pub insights: InsightService,
    pub reputation: Arc<ReputationService>,
}

impl ApiState {
    pub fn new(repositories: Arc<dyn Repositories>, reputation: Arc<ReputationService>) -> Self {
        Self {
            insights: InsightService::new(repositories.clone()),
            repositories,
            reputation,
        }
    }
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(METRICS_PATH, get(metrics))
        .route("/data/min-date", get(min_date))
        .route("/data/query", get(lookup))
        .route("/data/type", get(event_types))
        .route("/data/entity", get(entity_shares))
        .route("/data/developer", get(developer_shares))
        .route("/data/search", post(search))
        .route("/data/entity/developers", get(entity_developers))
        .route("/data/insights/summary", get(summary))
        .route("/data/insights/retention", get(retention))
        .route("/data/insights/pr-ratio", get(pr_ratio))
        .route("/data/insights/time-to-merge", get(time_to_merge))
        .route("/data/insights/time-to-close", get(time_to_close))
        .route("/data/insights/forks-and-activity", get(forks_and_activity))
        .route("/data/insights/repo-meta", get(repo_meta))
        .route("/data/insights/release-cadence", get(release_cadence))
        .route("/data/insights/release-downloads", get(release_downloads))
        .route("/data/insights/release-downloads-by-tag", get(release_downloads_by_tag))
        .route("/data/insights/reputation", get(reputation_list))
        .route("/data/insights/reputation/user", get(reputation_user))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(REQUEST_TIMEOUT),
        )
        .with_state(state)
}

async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::Internal(err.to_string())
    }
}

static STORED_EVENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("devpulse_stored_events", "Events currently in the store")
        .expect("stored events gauge")
});

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[instrument(skip(state))]
async fn metrics(State(state): State<Arc<ApiState>>) -> ApiResult<impl IntoResponse> {
    match state.repositories.events().count().await {
        Ok(count) => STORED_EVENTS.set(count),
        Err(err) => tracing::warn!(error = %err, "failed to refresh stored event count"),
    }
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let content_type = encoder.format_type().to_string();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok((
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, content_type)],
        buffer,
    ))
}

#[instrument(skip(state))]
async fn min_date(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ScopeParams>,
) -> ApiResult<Json<MinDateDto>> {
    let min_date = state
        .insights
        .min_date(params.o.as_deref(), params.r.as_deref())
        .await?;
    Ok(Json(MinDateDto { min_date }))
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    q: Option<String>,
    v: Option<String>,
    limit: Option<i64>,
}

#[instrument(skip(state))]
async fn lookup(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<LookupParams>,
) -> ApiResult<Json<Vec<LookupDto>>> {
    let kind: LookupKind = params
        .v
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("missing lookup kind `v`"))?
        .parse()
        .map_err(ApiError::bad_request)?;
    let rows = state
        .repositories
        .events()
        .lookup(
            kind,
            params.q.as_deref().unwrap_or("").trim(),
            params.limit.unwrap_or(DEFAULT_LOOKUP_LIMIT).clamp(1, 500),
        )
        .await?;
    Ok(Json(rows.into_iter().map(LookupDto::from).collect()))
}

async fn event_types(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ScopeParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.insight_query()?;
    Ok(Json(state.insights.event_types(&query).await?))
}

async fn entity_shares(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ScopeParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.insight_query()?;
    Ok(Json(state.insights.entity_shares(&query, &params.exclusions()).await?))
}

async fn developer_shares(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ScopeParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.insight_query()?;
    Ok(Json(state.insights.developer_shares(&query, &params.exclusions()).await?))
}

#[instrument(skip(state))]
async fn search(
    State(state): State<Arc<ApiState>>,
    Json(search): Json<EventSearch>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.repositories.events().search(search).await?))
}

#[derive(Debug, Deserialize)]
struct EntityParams {
    e: Option<String>,
    limit: Option<i64>,
}

async fn entity_developers(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<EntityParams>,
) -> ApiResult<impl IntoResponse> {
    let entity = params
        .e
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing entity `e`"))?;
    let details = state
        .repositories
        .developers()
        .entity_details(entity, params.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("entity {entity} not found")))?;
    Ok(Json(details.developers))
}

macro_rules! insight_route {
    ($name:ident, $method:ident) => {
        async fn $name(
            State(state): State<Arc<ApiState>>,
            Query(params): Query<ScopeParams>,
        ) -> ApiResult<impl IntoResponse> {
            let query = params.insight_query()?;
            Ok(Json(state.insights.$method(&query).await?))
        }
    };
}

insight_route!(summary, summary);
insight_route!(retention, retention);
insight_route!(pr_ratio, pr_ratio);
insight_route!(time_to_merge, time_to_merge);
insight_route!(time_to_close, time_to_close);
insight_route!(forks_and_activity, forks_and_activity);
insight_route!(repo_meta, repo_meta);
insight_route!(release_cadence, release_cadence);
insight_route!(release_downloads, release_downloads);
insight_route!(release_downloads_by_tag, release_downloads_by_tag);

async fn reputation_list(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ScopeParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.insight_query()?;
    let scope = db::Scope {
        since: None,
        ..query.scope()
    };
    let rows = state
        .reputation
        .list(scope, params.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
struct UserParams {
    u: Option<String>,
}

#[instrument(skip(state))]
async fn reputation_user(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<UserParams>,
) -> ApiResult<impl IntoResponse> {
    let username = params
        .u
        .as_deref()
        .map(common::text::normalize_username)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing username `u`"))?;
    Ok(Json(state.reputation.get_or_compute_deep(&username).await?))
}
