use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tenancy_api::{build_router, AppState, AuthorizationGate, OpenGate, StaticTokenGate};
use tenancy_archive::{MemoryArchive, StaticTemplate};
use tenancy_core::{NamespaceName, QuotaPolicy};
use tenancy_kubehub::{ClusterOp, MemoryCluster};
use tenancy_provision::{CallPolicy, Provisioner, ProvisionerConfig, StatusAggregator};
use tower::ServiceExt;

struct Fixture {
    cluster: Arc<MemoryCluster>,
    archive: Arc<MemoryArchive>,
    app: axum::Router,
}

fn fixture(gate: Arc<dyn AuthorizationGate>) -> Fixture {
    let cluster = Arc::new(MemoryCluster::new());
    let archive = Arc::new(MemoryArchive::new());
    let provisioner = Provisioner::new(
        cluster.clone(),
        archive.clone(),
        Arc::new(StaticTemplate::default()),
        QuotaPolicy::default(),
        ProvisionerConfig::default(),
    );
    let status = StatusAggregator::new(cluster.clone(), CallPolicy::default());
    let app = build_router(AppState::new(provisioner, status, gate), None);
    Fixture { cluster, archive, app }
}

async fn send(app: &axum::Router, method: &str, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header("authorization", format!("Bearer {t}"));
    }
    let response = app.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn ping_needs_no_token() {
    let f = fixture(Arc::new(StaticTokenGate::new("t0ken")));
    let (status, body) = send(&f.app, "GET", "/api/v1/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"message": "pong"}));
}

#[tokio::test]
async fn refused_requests_never_reach_the_cluster() {
    let f = fixture(Arc::new(StaticTokenGate::new("t0ken")));
    let (status, body) = send(&f.app, "POST", "/api/v1/create/team-a", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, serde_json::json!({"message": "Unauthorized"}));
    let (status, _) = send(&f.app, "GET", "/api/v1/list", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(f.cluster.calls(ClusterOp::Exists), 0);
    assert_eq!(f.cluster.calls(ClusterOp::ListAll), 0);
}

#[tokio::test]
async fn create_then_create_again() {
    let f = fixture(Arc::new(StaticTokenGate::new("t0ken")));
    let (status, body) = send(&f.app, "POST", "/api/v1/create/team-a", Some("t0ken")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, serde_json::json!({"message": {"outcome": "created"}}));

    let (status, body) = send(&f.app, "POST", "/api/v1/create/team-a", Some("t0ken")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"message": {"outcome": "already_exists"}}));
}

#[tokio::test]
async fn partial_failure_is_multi_status() {
    let f = fixture(Arc::new(OpenGate));
    f.archive.set_failing(true);
    let (status, body) = send(&f.app, "POST", "/api/v1/create/team-b", None).await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body, serde_json::json!({"message": {"outcome": "partially_failed", "failed": ["archive_write"]}}));
}

#[tokio::test]
async fn unreachable_cluster_is_service_unavailable() {
    let f = fixture(Arc::new(OpenGate));
    f.cluster.fail(ClusterOp::Exists);
    let (status, body) = send(&f.app, "POST", "/api/v1/create/team-c", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"]["outcome"], "failed");

    let (status, _) = send(&f.app, "GET", "/api/v1/status/team-c", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn invalid_name_is_rejected_before_the_core() {
    let f = fixture(Arc::new(OpenGate));
    let (status, _) = send(&f.app, "POST", "/api/v1/create/Team_A", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(f.cluster.calls(ClusterOp::Exists), 0);
}

#[tokio::test]
async fn status_and_list() {
    let f = fixture(Arc::new(OpenGate));
    let (status, body) = send(&f.app, "GET", "/api/v1/status/team-d", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, serde_json::json!({"message": {"state": "not_found"}}));

    send(&f.app, "POST", "/api/v1/create/team-d", None).await;
    let (status, body) = send(&f.app, "GET", "/api/v1/status/team-d", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"]["state"], "found");
    assert_eq!(body["message"]["quota"]["present"]["max_pods"], 5);

    f.cluster.insert_namespace(&NamespaceName::new_unchecked("kube-system"));
    let (status, body) = send(&f.app, "GET", "/api/v1/list", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"message": ["kube-system", "team-d"]}));
}
