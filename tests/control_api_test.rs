use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use uploadbox::api::{self, AppState};
use uploadbox::observability::Metrics;
use uploadbox::operation::{ProgressFn, ResultCode, UploadOperation};
use uploadbox::preferences::Preferences;
use uploadbox::records::FjallUploadStore;
use uploadbox::registry::ActiveOperationRegistry;
use uploadbox::storage::StorageClient;

/// Stand-in for an upload that is mid-transfer
#[derive(Default)]
struct InFlight {
    id: u64,
    cancelled: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl UploadOperation for InFlight {
    fn upload_id(&self) -> u64 {
        self.id
    }

    async fn execute(&self, _client: &StorageClient, _progress: ProgressFn<'_>) -> ResultCode {
        ResultCode::Ok
    }

    fn cancel(&self) {
        self.cancelled
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    _temp_dir: TempDir,
}

/// Builds a test app with isolated dependencies
fn build_test_app() -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(
        FjallUploadStore::open(temp_dir.path().join("uploads"))
            .expect("Failed to open test store"),
    );
    let preferences = Arc::new(store.preferences().expect("Failed to open preferences"));

    let state = AppState::new(
        store,
        Arc::new(ActiveOperationRegistry::new()),
        preferences,
        Arc::new(Metrics::new()),
    );

    TestApp {
        router: api::router(state.clone()),
        state,
        _temp_dir: temp_dir,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_reports_running() {
    let app = build_test_app();

    let (status, body) = send(&app.router, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["uploads"], "running");
}

#[tokio::test]
async fn test_active_uploads_lists_registry() {
    let app = build_test_app();
    let registry = app.state.registry.clone();

    let (_, body) = send(&app.router, "GET", "/uploads/active", None).await;
    assert_eq!(body["ids"], json!([]));

    let _a = registry.register(4, Arc::new(InFlight { id: 4, ..Default::default() }));
    let _b = registry.register(2, Arc::new(InFlight { id: 2, ..Default::default() }));

    let (status, body) = send(&app.router, "GET", "/uploads/active", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ids"], json!([2, 4]));
}

#[tokio::test]
async fn test_cancel_in_flight_upload() {
    let app = build_test_app();
    let op = Arc::new(InFlight {
        id: 9,
        ..Default::default()
    });
    let _guard = app.state.registry.register(9, op.clone());

    let (status, body) = send(&app.router, "POST", "/uploads/9/cancel", None).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["cancelled"], true);
    assert!(op.is_cancelled());
}

#[tokio::test]
async fn test_cancel_unknown_upload_is_404() {
    let app = build_test_app();

    let (status, body) = send(&app.router, "POST", "/uploads/77/cancel", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_pause_and_resume_toggle_preference() {
    let app = build_test_app();

    let (status, body) = send(&app.router, "POST", "/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paused"], true);
    assert!(app.state.preferences.is_global_upload_paused());

    let (_, health) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(health["components"]["uploads"], "paused");

    let (_, body) = send(&app.router, "POST", "/resume", None).await;
    assert_eq!(body["paused"], false);
    assert!(!app.state.preferences.is_global_upload_paused());
}

#[tokio::test]
async fn test_enqueue_then_list() {
    let app = build_test_app();

    let (status, created) = send(
        &app.router,
        "POST",
        "/uploads",
        Some(json!({
            "account": "alice",
            "local_path": "/tmp/photo.jpg",
            "remote_path": "/photos/photo.jpg",
            "name_collision_policy": "rename"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["created_by"], "api");
    assert_eq!(created["name_collision_policy"], "rename");

    let (status, listed) = send(&app.router, "GET", "/accounts/alice/uploads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["uploads"].as_array().unwrap().len(), 1);

    let (_, other) = send(&app.router, "GET", "/accounts/bob/uploads", None).await;
    assert_eq!(other["uploads"], json!([]));
}

#[tokio::test]
async fn test_enqueue_rejects_blank_account() {
    let app = build_test_app();

    let (status, body) = send(
        &app.router,
        "POST",
        "/uploads",
        Some(json!({
            "account": " ",
            "local_path": "/tmp/a",
            "remote_path": "a"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn test_metrics_snapshot() {
    let app = build_test_app();

    let (status, body) = send(&app.router, "GET", "/metrics", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uploads_succeeded"], 0);
    assert_eq!(body["batches_failed"], 0);
}
