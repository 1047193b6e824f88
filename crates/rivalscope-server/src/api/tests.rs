use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use rivalscope_core::{
    AnalysisRecord, CollectionJob, LedgerPatch, LedgerRecord, SourceKind, SourcePayload, Stages,
};
use rivalscope_ledger::{Ledger, LedgerError, MemoryStore, ResultStore, Store};
use rivalscope_pipeline::{
    AnalysisHandoff, Coordinator, PollerConfig, StatusPoller, StoreStatusSource,
};
use rivalscope_sources::{CollectorPolicy, CollectorRegistry, SourceError, SourceFetcher};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::*;

struct StaticFetcher(SourceKind);

#[async_trait]
impl SourceFetcher for StaticFetcher {
    fn kind(&self) -> SourceKind {
        self.0
    }

    async fn fetch(&self, subject_id: &str, _area_id: &str) -> Result<SourcePayload, SourceError> {
        let lift = if subject_id == "acme" { 0.3 } else { 0.0 };
        Ok(match self.0 {
            SourceKind::News => SourcePayload::News {
                sentiment: lift,
                article_count: 4,
                headlines: vec![format!("{subject_id} expands")],
            },
            SourceKind::SocialMedia => SourcePayload::SocialMedia {
                sentiment: lift,
                mention_count: 10,
                engagement: 120,
            },
            SourceKind::EmployerReviews => SourcePayload::EmployerReviews {
                rating: 3.6 + lift,
                review_count: 25,
                recommend_pct: 65.0,
            },
            SourceKind::WebsiteQuality => SourcePayload::WebsiteQuality {
                quality_score: 55.0 + lift * 100.0,
                response_ms: 250,
                https: true,
                page_bytes: 4096,
                has_title: true,
                has_meta_description: false,
                has_viewport: true,
            },
        })
    }
}

fn registry() -> Arc<CollectorRegistry> {
    let policy = CollectorPolicy {
        timeout: Duration::from_secs(2),
        max_retries: 1,
        backoff_base_ms: 0,
        min_interval: Duration::ZERO,
        burst: 1,
    };
    let mut registry = CollectorRegistry::new();
    for kind in SourceKind::ALL {
        registry.register(Arc::new(StaticFetcher(kind)), policy);
    }
    Arc::new(registry)
}

struct Harness {
    app: Router,
    store: Arc<dyn Store>,
    coordinator: Coordinator,
}

fn harness(trigger_analysis: bool) -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let coordinator = if trigger_analysis {
        let handoff = AnalysisHandoff::new(Arc::clone(&store));
        Coordinator::with_hook(registry(), Arc::clone(&store), Arc::new(handoff))
    } else {
        Coordinator::new(registry(), Arc::clone(&store))
    };
    let state = AppState {
        store: Arc::clone(&store),
        coordinator: Some(coordinator.clone()),
    };
    Harness {
        app: build_app(state, Stages::ALL, RateLimitState::per_minute(1_000)),
        store,
        coordinator,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = serde_json::from_slice(&body).expect("json parse");
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn start_body(request_id: &str) -> Value {
    json!({
        "requestId": request_id,
        "brandId": "acme",
        "competitorId": "globex",
        "areaId": "us",
        "sources": ["news", "website_quality"]
    })
}

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("VALIDATION_ERROR", StatusCode::BAD_REQUEST),
        ("NOT_FOUND", StatusCode::NOT_FOUND),
        ("RATE_LIMIT_EXCEEDED", StatusCode::TOO_MANY_REQUESTS),
        ("SERVICE_UNAVAILABLE", StatusCode::SERVICE_UNAVAILABLE),
        ("INTERNAL_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        let response = ApiError::new(code, "x").into_response();
        assert_eq!(response.status(), status, "{code}");
    }
}

#[tokio::test]
async fn health_reports_store_ok() {
    let h = harness(false);
    let (status, json) = send(&h.app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["store"], "ok");
    assert!(json["timestamp"].is_string());
}

/// Serves reads from memory but fails every liveness check.
#[derive(Default)]
struct UnreachableStore(MemoryStore);

#[async_trait]
impl Ledger for UnreachableStore {
    async fn create(&self, request_id: &str) -> Result<LedgerRecord, LedgerError> {
        self.0.create(request_id).await
    }

    async fn update(
        &self,
        request_id: &str,
        patch: &LedgerPatch,
    ) -> Result<LedgerRecord, LedgerError> {
        self.0.update(request_id, patch).await
    }

    async fn get(&self, request_id: &str) -> Result<LedgerRecord, LedgerError> {
        self.0.get(request_id).await
    }

    async fn list_ready_for_analysis(
        &self,
        limit: usize,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        self.0.list_ready_for_analysis(limit).await
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        Err(LedgerError::Corrupt {
            what: "connection",
            reason: "pool closed".to_string(),
        })
    }
}

#[async_trait]
impl ResultStore for UnreachableStore {
    async fn save_job(&self, job: &CollectionJob) -> Result<(), LedgerError> {
        self.0.save_job(job).await
    }

    async fn load_job(&self, job_id: Uuid) -> Result<CollectionJob, LedgerError> {
        self.0.load_job(job_id).await
    }

    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<(), LedgerError> {
        self.0.save_analysis(record).await
    }

    async fn load_analysis(&self, analysis_job_id: Uuid) -> Result<AnalysisRecord, LedgerError> {
        self.0.load_analysis(analysis_job_id).await
    }
}

#[tokio::test]
async fn health_reports_unavailable_store() {
    let store: Arc<dyn Store> = Arc::new(UnreachableStore::default());
    let app = build_app(
        AppState {
            store,
            coordinator: None,
        },
        Stages::ALL,
        RateLimitState::per_minute(1_000),
    );

    let (status, json) = send(&app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(json["error"]["details"]["store"], "unavailable");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn start_returns_job_id_and_estimate_then_progress_completes() {
    let h = harness(false);
    let (status, json) = send(
        &h.app,
        post_json("/api/v1/collection/start", &start_body("req-start")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "started");
    assert_eq!(json["data"]["estimatedDuration"], 4);

    let job_id: Uuid = json["data"]["jobId"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("job id");
    h.coordinator.wait(job_id).await.expect("job finishes");

    let (status, json) = send(&h.app, get(&format!("/api/v1/collection/{job_id}/status"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["progress"], 100);
    assert_eq!(
        json["data"]["remainingSources"].as_array().map(Vec::len),
        Some(0)
    );

    let (status, json) = send(&h.app, get(&format!("/api/v1/collection/{job_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["requestId"], "req-start");

    let (status, json) = send(&h.app, get("/api/v1/ledger/req-start")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["dataCollectionStatus"], "completed");
    assert_eq!(json["data"]["dataCollectionJobId"], job_id.to_string());
    assert_eq!(json["data"]["analysisStatus"], "pending");
}

#[tokio::test]
async fn triggered_analysis_is_readable_through_the_api() {
    let h = harness(true);
    let (status, _) = send(
        &h.app,
        post_json("/api/v1/collection/start", &start_body("req-flow")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let poller = StatusPoller::new(
        StoreStatusSource::new(Arc::clone(&h.store)),
        PollerConfig {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(10),
            max_consecutive_errors: 3,
        },
    );
    let result = poller
        .wait_for_result("req-flow", |_| {})
        .await
        .expect("analysis completes");

    let (status, json) = send(
        &h.app,
        get(&format!("/api/v1/analysis/{}", result.analysis_job_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["result"]["requestId"], "req-flow");
    assert!(json["data"]["result"]["insights"].is_array());
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let h = harness(false);
    let (status, json) = send(
        &h.app,
        post_json(
            "/api/v1/collection/start",
            &json!({ "requestId": "req-bad", "areaId": "us" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_source_is_a_validation_error() {
    let h = harness(false);
    let mut body = start_body("req-tiktok");
    body["sources"] = json!(["tiktok"]);
    let (status, json) = send(&h.app, post_json("/api/v1/collection/start", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = send(&h.app, get("/api/v1/ledger/req-tiktok")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_request_id_is_rejected() {
    let h = harness(false);
    let body = start_body("req-dup");
    let (status, _) = send(&h.app, post_json("/api/v1/collection/start", &body)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = send(&h.app, post_json("/api/v1/collection/start", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn job_lookups_validate_and_report_missing_ids() {
    let h = harness(false);
    let (status, json) = send(&h.app, get("/api/v1/collection/not-a-uuid/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["details"]["field"], "jobId");

    let missing = Uuid::new_v4();
    let (status, json) = send(&h.app, get(&format!("/api/v1/collection/{missing}/status"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&h.app, get(&format!("/api/v1/analysis/{missing}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&h.app, get("/api/v1/ledger/nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analysis_only_process_does_not_expose_collection() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let app = build_app(
        AppState {
            store,
            coordinator: None,
        },
        Stages {
            collection: false,
            analysis: true,
        },
        RateLimitState::per_minute(1_000),
    );
    let (status, json) = send(
        &app,
        post_json("/api/v1/collection/start", &start_body("req-x")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, get("/api/v1/ledger/req-x")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_routes_are_rate_limited_but_health_is_not() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let app = build_app(
        AppState {
            store,
            coordinator: None,
        },
        Stages::ALL,
        RateLimitState::new(1, Duration::from_secs(60)),
    );

    let (status, _) = send(&app, get("/api/v1/ledger/req-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, json) = send(&app, get("/api/v1/ledger/req-1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"]["code"], "RATE_LIMIT_EXCEEDED");

    let (status, _) = send(&app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
}
