//! # Test Fixtures
//!
//! In-process stand-ins for everything the dashboard talks to: the host media
//! platform, the signaling endpoint, the display surface, the page and the
//! identity provider. Each fixture records what happened to it so tests can
//! assert on call counts and ordering.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use futures_util::future::BoxFuture;
use url::Url;

use lib_catcams::identity::IdentityProvider;
use lib_catcams::streams::transport::{
    MediaPlatform, NativePlayback, PeerState, PlaylistEngine, PlaylistEngineOptions, PlaylistSupport, RealtimeSession,
    SessionOptions, TrackKind, TransportError, TransportEvent, TransportEventSender, TransportEvents,
};
use lib_catcams::streams::{Signaling, StreamEndpoints};
use lib_catcams::{
    CameraId, DisplaySurface, LifecyclePolicy, MediaSource, PageView, StatusLabel, StreamError, StreamSettings,
};

/// Media origin used by every fixture.
pub const MEDIA_BASE: &str = "http://localhost:8889/";

/// Settings with the production defaults for `cameras` under `policy`.
pub fn settings(policy: LifecyclePolicy, cameras: &[&str]) -> StreamSettings {
    StreamSettings {
        cameras: cameras.iter().map(|c| CameraId::from(*c)).collect(),
        policy,
        fallback_delay: Duration::from_millis(2000),
        endpoints: StreamEndpoints::new(Url::parse(MEDIA_BASE).expect("static url"), "video1_stream"),
        session_options: SessionOptions::default(),
        engine_options: PlaylistEngineOptions::default(),
    }
}

/// A provider-shaped token whose payload carries `email`.
pub fn signed_token(email: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = serde_json::json!({ "email": email, "name": "Test User", "picture": null });
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

/// Yields to the runtime until `predicate` holds. Does not advance a paused clock.
pub async fn settle(mut predicate: impl FnMut() -> bool) -> bool {
    for _ in 0..10_000 {
        if predicate() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    predicate()
}

/// Per-camera lifecycle counters of the mock platform.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub realtime_opened: usize,
    pub realtime_closed: usize,
    pub engines_opened: usize,
    pub engines_destroyed: usize,
    pub native_attached: usize,
    pub native_detached: usize,
}

#[derive(Default)]
struct PlatformState {
    counts: HashMap<CameraId, Counts>,
    senders: HashMap<CameraId, Vec<TransportEventSender>>,
    peer_states: HashMap<CameraId, Arc<Mutex<PeerState>>>,
    loaded: Vec<Url>,
}

type Shared = Arc<Mutex<PlatformState>>;

fn bump(shared: &Shared, camera: &CameraId, f: impl FnOnce(&mut Counts)) {
    let mut state = shared.lock().unwrap();
    f(state.counts.entry(camera.clone()).or_default());
}

/// Scriptable [`MediaPlatform`].
///
/// By default real-time sessions connect as soon as the answer is applied,
/// playlists go through an engine, and engines report a parsed manifest once
/// bound to a media element.
pub struct MockPlatform {
    shared: Shared,
    refuse_realtime: bool,
    auto_connect: bool,
    auto_parse: bool,
    playlist_support: PlaylistSupport,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            shared: Shared::default(),
            refuse_realtime: false,
            auto_connect: true,
            auto_parse: true,
            playlist_support: PlaylistSupport::Engine,
        }
    }
}

impl MockPlatform {
    /// Real-time sessions cannot be opened at all.
    pub fn refusing_realtime(mut self) -> Self {
        self.refuse_realtime = true;
        self
    }

    /// Sessions stay `New` after the answer; tests drive state by hand.
    pub fn without_auto_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    /// Engines never report a parsed manifest on their own.
    pub fn without_auto_parse(mut self) -> Self {
        self.auto_parse = false;
        self
    }

    pub fn with_playlist_support(mut self, support: PlaylistSupport) -> Self {
        self.playlist_support = support;
        self
    }

    pub fn counts(&self, camera: &str) -> Counts {
        let state = self.shared.lock().unwrap();
        state.counts.get(&CameraId::from(camera)).copied().unwrap_or_default()
    }

    /// Playlist URLs handed to engines or native playback, in order.
    pub fn loaded_playlists(&self) -> Vec<Url> {
        self.shared.lock().unwrap().loaded.clone()
    }

    /// Sends `event` on the newest transport of `camera`.
    pub fn emit(&self, camera: &str, event: TransportEvent) -> bool {
        let state = self.shared.lock().unwrap();
        state
            .senders
            .get(&CameraId::from(camera))
            .and_then(|senders| senders.last())
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Sends `event` on the `index`-th transport ever opened for `camera`.
    pub fn emit_on(&self, camera: &str, index: usize, event: TransportEvent) -> bool {
        let state = self.shared.lock().unwrap();
        state
            .senders
            .get(&CameraId::from(camera))
            .and_then(|senders| senders.get(index))
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Moves the newest real-time session of `camera` to `peer_state` and reports it.
    pub fn set_peer_state(&self, camera: &str, peer_state: PeerState) {
        let camera_id = CameraId::from(camera);
        {
            let state = self.shared.lock().unwrap();
            if let Some(current) = state.peer_states.get(&camera_id) {
                *current.lock().unwrap() = peer_state;
            }
        }
        self.emit(camera, TransportEvent::PeerStateChanged(peer_state));
    }

    fn channel(&self, camera: &CameraId) -> (TransportEventSender, TransportEvents) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut state = self.shared.lock().unwrap();
        state.senders.entry(camera.clone()).or_default().push(tx.clone());
        (tx, rx)
    }
}

impl MediaPlatform for MockPlatform {
    fn open_realtime(
        &self,
        camera: &CameraId,
        options: SessionOptions,
    ) -> Result<(Box<dyn RealtimeSession>, TransportEvents), TransportError> {
        if self.refuse_realtime {
            return Err(TransportError::Unsupported("no real-time stack".to_string()));
        }
        assert_eq!(options, SessionOptions::default(), "sessions are receive-only for video and audio");

        let (tx, rx) = self.channel(camera);
        let peer_state = Arc::new(Mutex::new(PeerState::New));
        {
            let mut state = self.shared.lock().unwrap();
            state.peer_states.insert(camera.clone(), Arc::clone(&peer_state));
        }
        bump(&self.shared, camera, |c| c.realtime_opened += 1);

        let session = MockSession {
            camera: camera.clone(),
            shared: Arc::clone(&self.shared),
            peer_state,
            events: tx,
            auto_connect: self.auto_connect,
        };
        Ok((Box::new(session), rx))
    }

    fn playlist_support(&self, _camera: &CameraId) -> PlaylistSupport {
        self.playlist_support
    }

    fn attach_native_playlist(
        &self,
        camera: &CameraId,
        url: &Url,
    ) -> Result<(Box<dyn NativePlayback>, TransportEvents), TransportError> {
        let (_tx, rx) = self.channel(camera);
        self.shared.lock().unwrap().loaded.push(url.clone());
        bump(&self.shared, camera, |c| c.native_attached += 1);
        Ok((
            Box::new(MockNative {
                camera: camera.clone(),
                shared: Arc::clone(&self.shared),
            }),
            rx,
        ))
    }

    fn open_playlist_engine(
        &self,
        camera: &CameraId,
        options: PlaylistEngineOptions,
    ) -> Result<(Box<dyn PlaylistEngine>, TransportEvents), TransportError> {
        assert_eq!(options.max_live_sync_playback_rate, 1.5);
        let (tx, rx) = self.channel(camera);
        bump(&self.shared, camera, |c| c.engines_opened += 1);
        Ok((
            Box::new(MockEngine {
                camera: camera.clone(),
                shared: Arc::clone(&self.shared),
                events: tx,
                auto_parse: self.auto_parse,
            }),
            rx,
        ))
    }
}

struct MockSession {
    camera: CameraId,
    shared: Shared,
    peer_state: Arc<Mutex<PeerState>>,
    events: TransportEventSender,
    auto_connect: bool,
}

impl RealtimeSession for MockSession {
    fn create_offer(&mut self) -> Result<String, TransportError> {
        *self.peer_state.lock().unwrap() = PeerState::Connecting;
        Ok(format!("v=0\r\ns=offer-{}\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\n", self.camera))
    }

    fn apply_answer(&mut self, answer: &str) -> Result<(), TransportError> {
        if !answer.starts_with("v=0") {
            return Err(TransportError::Negotiation(format!("not an answer: {answer}")));
        }
        if self.auto_connect {
            *self.peer_state.lock().unwrap() = PeerState::Connected;
            let _ = self.events.send(TransportEvent::TrackArrived(TrackKind::Audio));
            let _ = self.events.send(TransportEvent::TrackArrived(TrackKind::Video));
            let _ = self.events.send(TransportEvent::PeerStateChanged(PeerState::Connected));
        }
        Ok(())
    }

    fn peer_state(&self) -> PeerState {
        *self.peer_state.lock().unwrap()
    }

    fn close(&mut self) {
        *self.peer_state.lock().unwrap() = PeerState::Closed;
        bump(&self.shared, &self.camera, |c| c.realtime_closed += 1);
    }
}

struct MockEngine {
    camera: CameraId,
    shared: Shared,
    events: TransportEventSender,
    auto_parse: bool,
}

impl PlaylistEngine for MockEngine {
    fn load_source(&mut self, url: &Url) {
        self.shared.lock().unwrap().loaded.push(url.clone());
    }

    fn attach_media(&mut self, video_element: &str) {
        assert_eq!(video_element, format!("video-{}", self.camera));
        if self.auto_parse {
            let _ = self.events.send(TransportEvent::ManifestParsed);
        }
    }

    fn destroy(&mut self) {
        bump(&self.shared, &self.camera, |c| c.engines_destroyed += 1);
    }
}

struct MockNative {
    camera: CameraId,
    shared: Shared,
}

impl NativePlayback for MockNative {
    fn detach(&mut self) {
        bump(&self.shared, &self.camera, |c| c.native_detached += 1);
    }
}

/// Scriptable [`Signaling`]: answers by default, fails per camera on request,
/// and tracks call order and concurrency.
#[derive(Default)]
pub struct MockSignaling {
    failures: Mutex<HashMap<CameraId, u16>>,
    calls: Mutex<Vec<CameraId>>,
    offers: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSignaling {
    /// Every exchange takes `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Answers for `camera` come back with `status` from now on.
    pub fn fail(&self, camera: &str, status: u16) {
        self.failures.lock().unwrap().insert(CameraId::from(camera), status);
    }

    /// Answers for `camera` succeed again.
    pub fn succeed(&self, camera: &str) {
        self.failures.lock().unwrap().remove(&CameraId::from(camera));
    }

    pub fn calls(&self) -> Vec<CameraId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn offers(&self) -> Vec<String> {
        self.offers.lock().unwrap().clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Signaling for MockSignaling {
    fn exchange<'a>(&'a self, camera: &'a CameraId, offer: String) -> BoxFuture<'a, Result<String, StreamError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(camera.clone());
            self.offers.lock().unwrap().push(offer);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let failure = self.failures.lock().unwrap().get(camera).copied();
            match failure {
                Some(status) => Err(StreamError::SignalingFailure {
                    status: Some(status),
                    detail: "mock media server refused".to_string(),
                }),
                None => Ok(format!("v=0\r\ns=answer-{camera}\r\n")),
            }
        })
    }
}

/// One recorded display mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Status(CameraId, StatusLabel),
    Loading(CameraId, bool),
    Error(CameraId, bool),
    Attach(CameraId, MediaSource),
    Clear(CameraId),
}

/// [`DisplaySurface`] that records every call.
#[derive(Default)]
pub struct RecordingSurface {
    calls: Mutex<Vec<SurfaceCall>>,
}

impl RecordingSurface {
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Status labels shown for `camera`, in order.
    pub fn labels(&self, camera: &str) -> Vec<StatusLabel> {
        let camera = CameraId::from(camera);
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SurfaceCall::Status(c, label) if c == camera => Some(label),
                _ => None,
            })
            .collect()
    }

    pub fn last_label(&self, camera: &str) -> Option<StatusLabel> {
        self.labels(camera).pop()
    }

    /// Media attached to `camera`, in order.
    pub fn media(&self, camera: &str) -> Vec<MediaSource> {
        let camera = CameraId::from(camera);
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SurfaceCall::Attach(c, source) if c == camera => Some(source),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DisplaySurface for RecordingSurface {
    fn set_status(&self, camera: &CameraId, label: StatusLabel) {
        self.record(SurfaceCall::Status(camera.clone(), label));
    }

    fn set_loading(&self, camera: &CameraId, visible: bool) {
        self.record(SurfaceCall::Loading(camera.clone(), visible));
    }

    fn set_error(&self, camera: &CameraId, visible: bool) {
        self.record(SurfaceCall::Error(camera.clone(), visible));
    }

    fn attach_media(&self, camera: &CameraId, source: MediaSource) {
        self.record(SurfaceCall::Attach(camera.clone(), source));
    }

    fn clear_media(&self, camera: &CameraId) {
        self.record(SurfaceCall::Clear(camera.clone()));
    }
}

/// One recorded page mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCall {
    Login,
    Streams(String),
    Banner(String),
    BannerHidden,
}

/// [`PageView`] that records every call.
#[derive(Default)]
pub struct RecordingPage {
    calls: Mutex<Vec<PageCall>>,
}

impl RecordingPage {
    pub fn calls(&self) -> Vec<PageCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The banner currently up, if any.
    pub fn banner(&self) -> Option<String> {
        let mut banner = None;
        for call in self.calls() {
            match call {
                PageCall::Banner(message) => banner = Some(message),
                PageCall::BannerHidden => banner = None,
                _ => {}
            }
        }
        banner
    }
}

impl PageView for RecordingPage {
    fn show_login(&self) {
        self.calls.lock().unwrap().push(PageCall::Login);
    }

    fn show_streams(&self, email: &str) {
        self.calls.lock().unwrap().push(PageCall::Streams(email.to_string()));
    }

    fn show_banner(&self, message: &str) {
        self.calls.lock().unwrap().push(PageCall::Banner(message.to_string()));
    }

    fn hide_banner(&self) {
        self.calls.lock().unwrap().push(PageCall::BannerHidden);
    }
}

/// [`IdentityProvider`] that counts its calls.
#[derive(Default)]
pub struct MockProvider {
    rendered: AtomicUsize,
    auto_select_disabled: AtomicUsize,
}

impl MockProvider {
    pub fn rendered(&self) -> usize {
        self.rendered.load(Ordering::SeqCst)
    }

    pub fn auto_select_disabled(&self) -> usize {
        self.auto_select_disabled.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for MockProvider {
    fn render_sign_in(&self, _client_id: &str) {
        self.rendered.fetch_add(1, Ordering::SeqCst);
    }

    fn disable_auto_select(&self) {
        self.auto_select_disabled.fetch_add(1, Ordering::SeqCst);
    }
}
