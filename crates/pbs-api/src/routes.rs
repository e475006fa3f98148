use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pbs_auth::{AuthInterceptor, AuthorizationMetadata};
use pbs_common::errors::PbsError;
use pbs_metrics::{record_client_error, record_request, record_server_error, ReportingOriginClass,
    RequestLabels, TransactionPhase};
use pbs_request::{headers, ExhaustedResponseLegacy, ExhaustedResponseProto, TransactionRequest};
use pbs_service::ConsumeBudgetService;
use pbs_site::Site;
use serde_json::json;
use tracing::instrument;

use crate::error::ApiError;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ConsumeBudgetService>,
    pub auth: AuthInterceptor,
    pub reporting_origin_class: ReportingOriginClass,
    pub metrics_path: &'static str,
    pub require_claimed_identity: bool,
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    let metrics_path: &'static str = state.metrics_path;
    Router::new()
        .route("/v1/transactions:begin", post(begin))
        .route("/v1/transactions:prepare", post(prepare))
        .route("/v1/transactions:consume-budget", post(prepare))
        .route("/v1/transactions:commit", post(commit))
        .route("/v1/transactions:notify", post(notify))
        .route("/v1/transactions:abort", post(abort))
        .route("/v1/transactions:end", post(end))
        .route("/v1/transactions:status", get(get_transaction_status))
        .route("/v1/service:status", get(get_service_status))
        .route(metrics_path, get(metrics))
        .with_state(state)
}

/// The per-request identity the front end resolves ahead of routing, per
/// §2's "AuthInterceptor → FrontEnd" flow.
struct RequestContext {
    claimed_identity: String,
    user_agent: String,
    transaction_origin: String,
    site: Site,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn extract_context(state: &ApiState, headers: &HeaderMap) -> Result<RequestContext, PbsError> {
    let claimed_identity = header_str(headers, headers::CLAIMED_IDENTITY)
        .unwrap_or_default()
        .to_string();
    if claimed_identity.is_empty() {
        return Err(PbsError::InvalidRequest(format!(
            "missing header: {}",
            headers::CLAIMED_IDENTITY
        )));
    }

    let auth_token = header_str(headers, headers::AUTH_TOKEN).unwrap_or_default();
    if state.require_claimed_identity || !auth_token.is_empty() {
        let metadata = AuthorizationMetadata {
            authorization_token: auth_token.to_string(),
            claimed_identity: claimed_identity.clone(),
        };
        state.auth.validate_inbound(&metadata)?;
    }

    let site = pbs_site::resolve(&claimed_identity)
        .map_err(|_| PbsError::InvalidRequest("invalid claimed identity".to_string()))?;
    let transaction_origin = headers::obtain_transaction_origin(
        header_str(headers, headers::TRANSACTION_ORIGIN),
        site.as_str(),
    );
    let user_agent = header_str(headers, axum::http::header::USER_AGENT.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(RequestContext {
        claimed_identity,
        user_agent,
        transaction_origin,
        site,
    })
}

fn labels<'a>(
    state: &ApiState,
    phase: TransactionPhase,
    claimed_identity: &'a str,
    user_agent: &'a str,
) -> RequestLabels<'a> {
    RequestLabels {
        transaction_phase: phase,
        reporting_origin_class: state.reporting_origin_class,
        claimed_identity,
        user_agent,
    }
}

fn record_outcome(state: &ApiState, phase: TransactionPhase, claimed_identity: &str, user_agent: &str, status: u16) {
    record_request(labels(state, phase, claimed_identity, user_agent));
    if (400..500).contains(&status) {
        record_client_error(labels(state, phase, claimed_identity, user_agent));
    } else if status >= 500 {
        record_server_error(labels(state, phase, claimed_identity, user_agent));
    }
}

/// Every phase this engine treats as a no-op: it still validates the caller
/// and emits request-path metrics, but performs no budget mutation. Only
/// `:prepare` (and its `:consume-budget` alias) reach `ConsumeBudgetService`.
async fn respond_noop(state: Arc<ApiState>, headers: HeaderMap, phase: TransactionPhase) -> Response {
    match extract_context(&state, &headers) {
        Ok(ctx) => {
            record_outcome(&state, phase, &ctx.claimed_identity, &ctx.user_agent, 204);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            let status = err.status_code();
            record_outcome(&state, phase, "", "", status);
            ApiError::from(err).into_response()
        }
    }
}

async fn begin(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    respond_noop(state, headers, TransactionPhase::Begin).await
}

async fn commit(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    respond_noop(state, headers, TransactionPhase::Commit).await
}

async fn notify(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    respond_noop(state, headers, TransactionPhase::Notify).await
}

async fn abort(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    respond_noop(state, headers, TransactionPhase::Abort).await
}

async fn end(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    respond_noop(state, headers, TransactionPhase::End).await
}

async fn get_transaction_status(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let (claimed_identity, user_agent) = match extract_context(&state, &headers) {
        Ok(ctx) => (ctx.claimed_identity, ctx.user_agent),
        Err(_) => (String::new(), String::new()),
    };
    record_outcome(&state, TransactionPhase::GetStatus, &claimed_identity, &user_agent, 404);
    StatusCode::NOT_FOUND.into_response()
}

async fn get_service_status() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Encodes a budget-exhausted outcome per §6: the response serialization
/// mirrors the request's own wire version, legacy `{"v":"1.0","f":[...]}`
/// for v1 callers and the proto-JSON shape for v2 callers.
fn exhausted_response(request: &TransactionRequest, exhausted_indices: Vec<u32>) -> Response {
    match request {
        TransactionRequest::V1(_) => {
            (StatusCode::CONFLICT, Json(ExhaustedResponseLegacy::new(exhausted_indices))).into_response()
        }
        TransactionRequest::V2(_) => {
            (StatusCode::CONFLICT, Json(ExhaustedResponseProto::new(exhausted_indices))).into_response()
        }
    }
}

#[instrument(skip(state, headers, body))]
async fn prepare(State(state): State<Arc<ApiState>>, headers: HeaderMap, body: Bytes) -> Response {
    let phase = TransactionPhase::Prepare;

    let ctx = match extract_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(err) => {
            let status = err.status_code();
            record_outcome(&state, phase, "", "", status);
            return ApiError::from(err).into_response();
        }
    };

    let request = match TransactionRequest::parse(&body) {
        Ok(request) => request,
        Err(err) => {
            let status = err.status_code();
            record_outcome(&state, phase, &ctx.claimed_identity, &ctx.user_agent, status);
            return ApiError::from(err).into_response();
        }
    };

    let outcome = state
        .service
        .consume_budget(&ctx.transaction_origin, &ctx.site, &request)
        .await;

    match outcome {
        Ok(_) => {
            record_outcome(&state, phase, &ctx.claimed_identity, &ctx.user_agent, 204);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(PbsError::BudgetExhausted { exhausted_indices }) => {
            record_outcome(&state, phase, &ctx.claimed_identity, &ctx.user_agent, 409);
            exhausted_response(&request, exhausted_indices)
        }
        Err(err) => {
            let status = err.status_code();
            record_outcome(&state, phase, &ctx.claimed_identity, &ctx.user_agent, status);
            ApiError::from(err).into_response()
        }
    }
}

async fn metrics() -> impl IntoResponse {
    match pbs_metrics::gather_text() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => ApiError::from(PbsError::Other(err.into())).into_response(),
    }
}
