//! # WHEP Signaling Integration Tests
//!
//! Runs `WhepSignaling` against a local axum server playing the media
//! server's `/cam_{camera}/whep` endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use url::Url;

use lib_catcams::streams::signaling::SDP_CONTENT_TYPE;
use lib_catcams::streams::StreamEndpoints;
use lib_catcams::{CameraId, ConnectionStatus, LifecyclePolicy, StreamError, StreamManager, StreamSettings, WhepSignaling};
use lib_catcams::streams::Signaling;
use project_tests::{settings, settle, MockPlatform, RecordingSurface};

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<(String, Option<String>, String)>>>,
}

async fn whep(
    State(seen): State<Seen>,
    Path(segment): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let offer = String::from_utf8_lossy(&body).to_string();
    seen.requests
        .lock()
        .unwrap()
        .push((segment.clone(), content_type, offer));

    match segment.strip_prefix("cam_") {
        Some("broken") => (StatusCode::INTERNAL_SERVER_ERROR, "stream not found".to_string()),
        Some(camera) => (StatusCode::CREATED, format!("v=0\r\ns=answer-{camera}\r\n")),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

async fn start_media_server() -> (Url, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/{segment}/whep", post(whep))
        .with_state(seen.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (Url::parse(&format!("http://{addr}/")).unwrap(), seen)
}

#[tokio::test]
async fn posts_offer_as_sdp_and_returns_answer() {
    let (base, seen) = start_media_server().await;
    let signaling = WhepSignaling::new(&StreamEndpoints::new(base, "video1_stream"), 0).unwrap();

    let answer = signaling
        .exchange(&CameraId::from("left"), "v=0\r\ns=offer\r\n".to_string())
        .await
        .unwrap();
    assert_eq!(answer, "v=0\r\ns=answer-left\r\n");

    let requests = seen.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "cam_left");
    assert_eq!(requests[0].1.as_deref(), Some(SDP_CONTENT_TYPE));
    assert_eq!(requests[0].2, "v=0\r\ns=offer\r\n");
}

#[tokio::test]
async fn non_success_status_is_a_signaling_failure() {
    let (base, _seen) = start_media_server().await;
    let signaling = WhepSignaling::new(&StreamEndpoints::new(base, "video1_stream"), 0).unwrap();

    let err = signaling
        .exchange(&CameraId::from("broken"), "v=0\r\n".to_string())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StreamError::SignalingFailure {
            status: Some(500),
            detail: "stream not found".to_string(),
        }
    );
}

#[tokio::test]
async fn unreachable_server_is_a_signaling_failure_without_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    let signaling = WhepSignaling::new(&StreamEndpoints::new(base, "video1_stream"), 0).unwrap();
    let err = signaling
        .exchange(&CameraId::from("left"), "v=0\r\n".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::SignalingFailure { status: None, .. }));
}

#[tokio::test]
async fn server_error_drives_manager_into_fallback() {
    let (base, seen) = start_media_server().await;
    let endpoints = StreamEndpoints::new(base, "video1_stream");
    let signaling = Arc::new(WhepSignaling::new(&endpoints, 0).unwrap());
    let platform = Arc::new(MockPlatform::default());
    let surface = Arc::new(RecordingSurface::default());

    let mut settings: StreamSettings = settings(LifecyclePolicy::Negotiated, &["broken", "left"]);
    settings.endpoints = endpoints;
    settings.fallback_delay = Duration::from_millis(50);
    let manager = StreamManager::new(settings, platform.clone(), signaling, surface.clone());

    manager.initialize_all().await;
    assert_eq!(seen.requests.lock().unwrap().len(), 2);
    assert!(settle(|| manager.status(&CameraId::from("left")) == ConnectionStatus::Connected).await);

    let broken = CameraId::from("broken");
    assert_eq!(manager.status(&broken), ConnectionStatus::Error);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(settle(|| platform.counts("broken").engines_opened == 1).await);
    assert!(settle(|| manager.status(&broken) == ConnectionStatus::Connected).await);
}
