use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pbs_api::routes::{build_router, ApiState};
use pbs_auth::AuthInterceptor;
use pbs_common::config::MigrationPhase;
use pbs_metrics::ReportingOriginClass;
use pbs_service::ConsumeBudgetService;
use pbs_site::SiteResolver;
use pbs_store::mem::InMemoryBudgetStore;
use pbs_store::BudgetStore;
use tower::ServiceExt;

fn app() -> axum::Router {
    let store: Arc<dyn BudgetStore> = Arc::new(InMemoryBudgetStore::new());
    let service = Arc::new(ConsumeBudgetService::new(
        store,
        SiteResolver::default(),
        MigrationPhase::Phase1,
        4,
    ));
    let state = Arc::new(ApiState {
        service,
        auth: AuthInterceptor::new(),
        reporting_origin_class: ReportingOriginClass::Operator,
        metrics_path: "/metrics",
        require_claimed_identity: false,
    });
    build_router(state)
}

fn prepare_request(claimed_identity: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/transactions:prepare")
        .header("x-gscp-claimed-identity", claimed_identity)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn v2_body(origin: &str, key: &str, reporting_time: &str) -> serde_json::Value {
    serde_json::json!({
        "v": "2.0",
        "data": [{
            "reporting_origin": origin,
            "keys": [{"key": key, "token": 1, "reporting_time": reporting_time}]
        }]
    })
}

#[tokio::test]
async fn s1_new_key_succeeds_with_no_content() {
    let response = app()
        .oneshot(prepare_request(
            "https://a.test",
            v2_body("https://a.test", "k", "2019-12-11T07:20:50Z"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn s2_repeat_consumption_returns_409_with_proto_shape() {
    let app = app();
    let body = v2_body("https://a.test", "k", "2019-12-11T07:20:50Z");

    let first = app
        .clone()
        .oneshot(prepare_request("https://a.test", body.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::NO_CONTENT);

    let second = app
        .oneshot(prepare_request("https://a.test", body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let bytes = axum::body::to_bytes(second.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed["exhausted_budget_indices"], serde_json::json!([0]));
}

#[tokio::test]
async fn s5_reporting_origin_mismatch_is_a_client_error() {
    let response = app()
        .oneshot(prepare_request(
            "https://a.test",
            v2_body("https://b.test", "k", "2019-12-11T07:20:50Z"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_claimed_identity_header_is_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/transactions:prepare")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&v2_body("https://a.test", "k", "2019-12-11T07:20:50Z")).unwrap(),
        ))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn begin_commit_notify_abort_end_are_no_ops() {
    for phase in ["begin", "commit", "notify", "abort", "end"] {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/v1/transactions:{phase}"))
            .header("x-gscp-claimed-identity", "https://a.test")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT, "phase {phase}");
    }
}

#[tokio::test]
async fn transaction_status_defaults_to_404() {
    let request = Request::builder()
        .method("GET")
        .uri("/v1/transactions:status")
        .header("x-gscp-claimed-identity", "https://a.test")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn service_status_is_always_ok() {
    let request = Request::builder()
        .method("GET")
        .uri("/v1/service:status")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_route_serves_prometheus_text() {
    let request = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn consume_budget_path_is_an_alias_for_prepare() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/transactions:consume-budget")
        .header("x-gscp-claimed-identity", "https://a.test")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&v2_body("https://a.test", "k", "2019-12-11T07:20:50Z")).unwrap(),
        ))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
