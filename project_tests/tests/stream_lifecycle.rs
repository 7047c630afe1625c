//! # Stream Lifecycle Integration Tests
//!
//! Drives `StreamManager` against the mock platform and mock signaling, with
//! tokio's paused clock standing in for the fallback delay.

use std::sync::Arc;
use std::time::Duration;

use lib_catcams::streams::transport::{PeerState, PlaylistSupport, TransportEvent, TransportKind};
use lib_catcams::{CameraId, ConnectionStatus, LifecyclePolicy, MediaSource, StatusLabel, StreamError, StreamManager};
use project_tests::{settings, settle, MockPlatform, MockSignaling, RecordingSurface};

const CAMERAS: [&str; 4] = ["left", "right", "top", "other"];

struct Rig {
    manager: Arc<StreamManager>,
    platform: Arc<MockPlatform>,
    signaling: Arc<MockSignaling>,
    surface: Arc<RecordingSurface>,
}

impl Rig {
    fn status(&self, camera: &str) -> ConnectionStatus {
        self.manager.status(&cam(camera))
    }

    async fn settle_status(&self, camera: &str, status: ConnectionStatus) -> bool {
        settle(|| self.status(camera) == status).await
    }
}

fn cam(camera: &str) -> CameraId {
    CameraId::from(camera)
}

fn rig_with(policy: LifecyclePolicy, platform: MockPlatform, signaling: MockSignaling) -> Rig {
    let platform = Arc::new(platform);
    let signaling = Arc::new(signaling);
    let surface = Arc::new(RecordingSurface::default());
    let manager = StreamManager::new(
        settings(policy, &CAMERAS),
        platform.clone(),
        signaling.clone(),
        surface.clone(),
    );
    Rig {
        manager,
        platform,
        signaling,
        surface,
    }
}

fn rig() -> Rig {
    rig_with(LifecyclePolicy::Negotiated, MockPlatform::default(), MockSignaling::default())
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn successful_negotiation_reaches_connected() {
    let rig = rig();
    rig.manager.connect(&cam("left")).await.unwrap();

    assert!(rig.settle_status("left", ConnectionStatus::Connected).await);
    assert_eq!(rig.surface.labels("left"), vec![StatusLabel::Connecting, StatusLabel::Connected]);
    assert_eq!(rig.surface.media("left"), vec![MediaSource::RealtimeStream]);
    assert_eq!(rig.signaling.calls(), vec![cam("left")]);
    assert!(rig.signaling.offers()[0].contains("a=recvonly"));

    let snapshot = rig.manager.snapshot();
    assert_eq!(snapshot[0].transport, Some(TransportKind::Realtime));
    assert_eq!(snapshot[1].status, ConnectionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn signaling_failure_falls_back_after_delay() {
    let rig = rig();
    rig.signaling.fail("left", 500);

    let status = rig.manager.connect(&cam("left")).await.unwrap();
    assert_eq!(status, ConnectionStatus::Error);
    assert_eq!(rig.status("left"), ConnectionStatus::Error);
    assert_eq!(rig.surface.last_label("left"), Some(StatusLabel::Error));

    advance(1999).await;
    assert_eq!(rig.platform.counts("left").engines_opened, 0);

    advance(2).await;
    assert!(settle(|| rig.platform.counts("left").engines_opened == 1).await);
    assert!(rig.settle_status("left", ConnectionStatus::Connected).await);
    assert_eq!(
        rig.surface.labels("left"),
        vec![
            StatusLabel::Connecting,
            StatusLabel::Error,
            StatusLabel::HlsMode,
            StatusLabel::Connected
        ]
    );
    assert_eq!(rig.platform.counts("left").realtime_closed, 1);
    assert_eq!(
        rig.platform.loaded_playlists()[0].as_str(),
        "http://localhost:8889/cam_left/video1_stream.m3u8"
    );
}

#[tokio::test(start_paused = true)]
async fn fallback_is_scheduled_once_per_failure() {
    let rig = rig();
    rig.signaling.fail("left", 500);
    rig.manager.connect(&cam("left")).await.unwrap();

    // A second failure report from the same attempt must not schedule another fallback.
    rig.platform.emit(
        "left",
        TransportEvent::Error {
            fatal: true,
            detail: "ice failed".into(),
        },
    );
    settle(|| false).await;

    advance(2001).await;
    assert!(settle(|| rig.platform.counts("left").engines_opened == 1).await);
    advance(10_000).await;
    settle(|| false).await;
    assert_eq!(rig.platform.counts("left").engines_opened, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_fallback_is_not_retried() {
    let rig = rig_with(
        LifecyclePolicy::Negotiated,
        MockPlatform::default().without_auto_parse(),
        MockSignaling::default(),
    );
    rig.signaling.fail("left", 500);
    rig.manager.connect(&cam("left")).await.unwrap();

    advance(2001).await;
    assert!(settle(|| rig.platform.counts("left").engines_opened == 1).await);
    rig.platform.emit(
        "left",
        TransportEvent::Error {
            fatal: true,
            detail: "manifest load error".into(),
        },
    );
    assert!(rig.settle_status("left", ConnectionStatus::Error).await);

    advance(60_000).await;
    settle(|| false).await;
    let counts = rig.platform.counts("left");
    assert_eq!(counts.realtime_opened, 1);
    assert_eq!(counts.engines_opened, 1);
    assert_eq!(rig.signaling.calls().len(), 1);

    // Only a health sweep starts over.
    rig.signaling.succeed("left");
    assert_eq!(rig.manager.health_sweep().await, vec![cam("left")]);
    assert!(rig.settle_status("left", ConnectionStatus::Connected).await);
    assert_eq!(rig.platform.counts("left").engines_destroyed, 1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_cancels_pending_fallback() {
    let rig = rig();
    rig.signaling.fail("left", 503);
    rig.manager.connect(&cam("left")).await.unwrap();

    rig.signaling.succeed("left");
    rig.manager.reconnect(&cam("left")).await.unwrap();
    assert!(rig.settle_status("left", ConnectionStatus::Connected).await);

    advance(5000).await;
    settle(|| false).await;
    assert_eq!(rig.platform.counts("left").engines_opened, 0);
    assert_eq!(rig.status("left"), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn reconnect_tears_down_exactly_once() {
    let rig = rig();
    rig.manager.connect(&cam("left")).await.unwrap();
    assert!(rig.settle_status("left", ConnectionStatus::Connected).await);

    rig.manager.reconnect(&cam("left")).await.unwrap();
    assert!(rig.settle_status("left", ConnectionStatus::Connected).await);

    let counts = rig.platform.counts("left");
    assert_eq!(counts.realtime_opened, 2);
    assert_eq!(counts.realtime_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn health_sweep_leaves_healthy_cameras_alone() {
    let rig = rig();
    rig.manager.initialize_all().await;
    for camera in CAMERAS {
        assert!(rig.settle_status(camera, ConnectionStatus::Connected).await);
    }

    assert!(rig.manager.health_sweep().await.is_empty());
    assert!(rig.manager.health_sweep().await.is_empty());
    for camera in CAMERAS {
        assert_eq!(rig.platform.counts(camera).realtime_opened, 1);
        assert_eq!(rig.platform.counts(camera).realtime_closed, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn dropped_session_waits_for_health_sweep() {
    let rig = rig();
    rig.manager.initialize_all().await;
    assert!(rig.settle_status("top", ConnectionStatus::Connected).await);

    rig.platform.set_peer_state("top", PeerState::Disconnected);
    assert!(rig.settle_status("top", ConnectionStatus::Disconnected).await);
    assert_eq!(rig.surface.last_label("top"), Some(StatusLabel::Disconnected));

    advance(60_000).await;
    settle(|| false).await;
    assert_eq!(rig.platform.counts("top").realtime_opened, 1);

    let reconnected = rig.manager.health_sweep().await;
    assert_eq!(reconnected, vec![cam("top")]);
    assert!(rig.settle_status("top", ConnectionStatus::Connected).await);
    assert_eq!(rig.platform.counts("top").realtime_opened, 2);
    assert_eq!(rig.platform.counts("left").realtime_opened, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_peer_state_marks_error_without_reconnecting() {
    let rig = rig();
    rig.manager.connect(&cam("right")).await.unwrap();
    assert!(rig.settle_status("right", ConnectionStatus::Connected).await);

    rig.platform.set_peer_state("right", PeerState::Failed);
    assert!(rig.settle_status("right", ConnectionStatus::Error).await);

    advance(5000).await;
    settle(|| false).await;
    assert_eq!(rig.platform.counts("right").realtime_opened, 1);
    assert_eq!(rig.platform.counts("right").engines_opened, 0);
}

#[tokio::test(start_paused = true)]
async fn peer_failure_before_connecting_falls_back() {
    let rig = rig_with(
        LifecyclePolicy::Negotiated,
        MockPlatform::default().without_auto_connect(),
        MockSignaling::default(),
    );
    rig.manager.connect(&cam("left")).await.unwrap();
    assert_eq!(rig.status("left"), ConnectionStatus::Connecting);

    rig.platform.set_peer_state("left", PeerState::Failed);
    assert!(rig.settle_status("left", ConnectionStatus::Error).await);
    assert_eq!(rig.surface.last_label("left"), Some(StatusLabel::Error));

    advance(2001).await;
    assert!(settle(|| rig.platform.counts("left").engines_opened == 1).await);
    assert!(rig.settle_status("left", ConnectionStatus::Connected).await);
    assert_eq!(rig.platform.counts("left").realtime_closed, 1);

    // A repeated failure report from the replaced session changes nothing.
    rig.platform.emit_on("left", 0, TransportEvent::PeerStateChanged(PeerState::Failed));
    advance(5000).await;
    settle(|| false).await;
    assert_eq!(rig.platform.counts("left").engines_opened, 1);
}

#[tokio::test(start_paused = true)]
async fn health_sweep_skips_camera_with_attempt_in_progress() {
    let rig = rig_with(
        LifecyclePolicy::Negotiated,
        MockPlatform::default(),
        MockSignaling::with_delay(Duration::from_secs(24 * 3600)),
    );
    let manager = rig.manager.clone();
    let startup = tokio::spawn(async move { manager.initialize_all().await });
    assert!(settle(|| rig.signaling.calls().len() == 1).await);

    advance(600_000).await;
    let sweep = rig.manager.clone();
    tokio::spawn(async move { sweep.health_sweep().await });
    assert!(settle(|| rig.signaling.calls().len() == CAMERAS.len()).await);

    let mut calls = rig.signaling.calls();
    calls.sort();
    let mut expected: Vec<CameraId> = CAMERAS.iter().map(|c| cam(c)).collect();
    expected.sort();
    assert_eq!(calls, expected);
    assert_eq!(rig.platform.counts("left").realtime_opened, 1);
    startup.abort();
}

#[tokio::test(start_paused = true)]
async fn one_camera_failing_does_not_affect_the_others() {
    let rig = rig();
    rig.signaling.fail("left", 500);
    rig.manager.initialize_all().await;

    assert_eq!(rig.status("left"), ConnectionStatus::Error);
    for camera in ["right", "top", "other"] {
        assert!(rig.settle_status(camera, ConnectionStatus::Connected).await);
        assert_eq!(rig.platform.counts(camera).engines_opened, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn initialize_all_connects_in_order_one_at_a_time() {
    let rig = rig_with(
        LifecyclePolicy::Negotiated,
        MockPlatform::default(),
        MockSignaling::with_delay(Duration::from_millis(100)),
    );
    rig.manager.initialize_all().await;

    let expected: Vec<CameraId> = CAMERAS.iter().map(|c| cam(c)).collect();
    assert_eq!(rig.signaling.calls(), expected);
    assert_eq!(rig.signaling.max_concurrency(), 1);
}

#[tokio::test(start_paused = true)]
async fn health_sweep_reconnects_cameras_concurrently() {
    let rig = rig_with(
        LifecyclePolicy::Negotiated,
        MockPlatform::default(),
        MockSignaling::with_delay(Duration::from_millis(100)),
    );

    let reconnected = rig.manager.health_sweep().await;
    assert_eq!(reconnected.len(), CAMERAS.len());
    assert_eq!(rig.signaling.max_concurrency(), CAMERAS.len());
}

#[tokio::test(start_paused = true)]
async fn playlist_only_policy_never_negotiates() {
    let rig = rig_with(
        LifecyclePolicy::PlaylistOnly,
        MockPlatform::default(),
        MockSignaling::default(),
    );
    rig.manager.connect(&cam("other")).await.unwrap();

    assert!(rig.settle_status("other", ConnectionStatus::Connected).await);
    assert_eq!(rig.platform.counts("other").realtime_opened, 0);
    assert_eq!(rig.platform.counts("other").engines_opened, 1);
    assert!(rig.signaling.calls().is_empty());
    assert_eq!(rig.surface.labels("other"), vec![StatusLabel::Connecting, StatusLabel::Connected]);
}

#[tokio::test(start_paused = true)]
async fn playlist_fatal_error_is_terminal() {
    let rig = rig_with(
        LifecyclePolicy::PlaylistOnly,
        MockPlatform::default().without_auto_parse(),
        MockSignaling::default(),
    );
    rig.manager.connect(&cam("left")).await.unwrap();
    assert_eq!(rig.status("left"), ConnectionStatus::Connecting);

    rig.platform.emit(
        "left",
        TransportEvent::Error {
            fatal: false,
            detail: "segment 404".into(),
        },
    );
    settle(|| false).await;
    assert_eq!(rig.status("left"), ConnectionStatus::Connecting);

    rig.platform.emit(
        "left",
        TransportEvent::Error {
            fatal: true,
            detail: "manifest load error".into(),
        },
    );
    assert!(rig.settle_status("left", ConnectionStatus::Error).await);

    advance(10_000).await;
    settle(|| false).await;
    assert_eq!(rig.platform.counts("left").engines_opened, 1);
}

#[tokio::test(start_paused = true)]
async fn missing_playlist_capability_ends_in_error() {
    let rig = rig_with(
        LifecyclePolicy::Negotiated,
        MockPlatform::default()
            .refusing_realtime()
            .with_playlist_support(PlaylistSupport::Unsupported),
        MockSignaling::default(),
    );

    rig.manager.connect(&cam("left")).await.unwrap();
    assert_eq!(rig.status("left"), ConnectionStatus::Error);
    assert!(rig.signaling.calls().is_empty());

    advance(2001).await;
    settle(|| rig.surface.labels("left").contains(&StatusLabel::HlsMode)).await;
    assert_eq!(rig.status("left"), ConnectionStatus::Error);
    assert_eq!(rig.surface.last_label("left"), Some(StatusLabel::Error));

    advance(10_000).await;
    settle(|| false).await;
    let labels = rig.surface.labels("left");
    assert_eq!(labels.iter().filter(|l| **l == StatusLabel::HlsMode).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn native_playlist_playback_attaches_url() {
    let rig = rig_with(
        LifecyclePolicy::Negotiated,
        MockPlatform::default().with_playlist_support(PlaylistSupport::Native),
        MockSignaling::default(),
    );

    rig.manager.fallback(&cam("left")).await.unwrap();
    assert_eq!(rig.platform.counts("left").native_attached, 1);
    let url = url::Url::parse("http://localhost:8889/cam_left/video1_stream.m3u8").unwrap();
    assert_eq!(rig.surface.media("left"), vec![MediaSource::Playlist(url)]);
    assert_eq!(rig.surface.last_label("left"), Some(StatusLabel::HlsMode));

    rig.platform.emit("left", TransportEvent::MetadataLoaded);
    assert!(rig.settle_status("left", ConnectionStatus::Connected).await);

    rig.manager.reconnect(&cam("left")).await.unwrap();
    assert_eq!(rig.platform.counts("left").native_detached, 1);
}

#[tokio::test(start_paused = true)]
async fn events_from_replaced_transport_are_ignored() {
    let rig = rig();
    rig.manager.connect(&cam("left")).await.unwrap();
    rig.manager.reconnect(&cam("left")).await.unwrap();
    assert!(rig.settle_status("left", ConnectionStatus::Connected).await);

    rig.platform
        .emit_on("left", 0, TransportEvent::PeerStateChanged(PeerState::Failed));
    settle(|| false).await;
    assert_eq!(rig.status("left"), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn release_all_tears_everything_down() {
    let rig = rig();
    rig.manager.initialize_all().await;
    for camera in CAMERAS {
        assert!(rig.settle_status(camera, ConnectionStatus::Connected).await);
    }

    rig.manager.release_all().await;
    for camera in CAMERAS {
        assert_eq!(rig.status(camera), ConnectionStatus::Idle);
        assert_eq!(rig.platform.counts(camera).realtime_closed, 1);
    }
    assert!(rig.manager.snapshot().iter().all(|s| s.transport.is_none()));
}

#[tokio::test]
async fn unknown_camera_is_rejected() {
    let rig = rig();
    let err = rig.manager.connect(&cam("garage")).await.unwrap_err();
    assert_eq!(err, StreamError::UnknownCamera("garage".into()));
}
