//! # Stream Manager
//!
//! Owns one connection record per configured camera and drives its lifecycle:
//!
//! ```text
//! idle -> connecting -> connected | error
//! connected -> disconnected | error        (observed from the transport)
//! error | disconnected -> connecting       (reconnect)
//! ```
//!
//! Under the `negotiated` policy a camera first negotiates a real-time
//! session; any failure marks it `error` and schedules a one-shot fallback to
//! the playlist transport after a fixed delay. Under `playlist-only` the
//! playlist transport is engaged straight away and is the only path.
//!
//! A real-time session that fails before it ever connected counts as a
//! failed negotiation and falls back like any other. Once connected, nothing
//! reconnects on its own: a dropped transport only updates the status and
//! recovery happens when the host asks for a [`StreamManager::health_sweep`].
//!
//! ## Ownership
//! - Every lifecycle operation on a camera first takes that camera's
//!   lifecycle lock, so connect, fallback and reconnect never interleave for
//!   the same camera. Different cameras never share a lock. A health sweep
//!   only try-locks: a camera whose lock is held is mid-attempt and skipped.
//! - Each attempt gets a generation number and a cancellation token. Starting
//!   a new attempt or releasing the camera tears the old transport down,
//!   cancels its token (stopping its event observer and any pending fallback
//!   timer) and bumps the generation so late events are ignored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use super::camera::{CameraId, ConnectionStatus};
use super::endpoints::StreamEndpoints;
use super::signaling::Signaling;
use super::transport::{
    MediaPlatform, PeerState, PlaylistEngineOptions, PlaylistSession, PlaylistSupport, RealtimeSession,
    SessionOptions, TrackKind, TransportError, TransportEvent, TransportEvents, TransportHandle, TransportKind,
};
use super::StreamError;
use crate::configs::{ConfigError, DashboardConfig, LifecyclePolicy};
use crate::surface::{DisplaySurface, MediaSource, StatusLabel, SurfaceIds};

/// Static inputs of a [`StreamManager`].
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Cameras in initialization order.
    pub cameras: Vec<CameraId>,
    /// Lifecycle realization.
    pub policy: LifecyclePolicy,
    /// Delay before the playlist fallback.
    pub fallback_delay: Duration,
    /// Endpoint layout.
    pub endpoints: StreamEndpoints,
    /// Media sections of the real-time offer.
    pub session_options: SessionOptions,
    /// Playlist-engine tuning.
    pub engine_options: PlaylistEngineOptions,
}

impl StreamSettings {
    /// Derives the settings from the dashboard config.
    pub fn from_config(config: &DashboardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cameras: config.cameras.iter().map(|c| CameraId::from(c.as_str())).collect(),
            policy: config.lifecycle,
            fallback_delay: config.fallback_delay(),
            endpoints: StreamEndpoints::new(config.media_url()?, config.playlist_name.clone()),
            session_options: SessionOptions::default(),
            engine_options: PlaylistEngineOptions {
                max_live_sync_playback_rate: config.max_live_sync_playback_rate,
            },
        })
    }
}

/// Point-in-time view of one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSnapshot {
    /// The camera.
    pub camera: CameraId,
    /// Its lifecycle status.
    pub status: ConnectionStatus,
    /// The active transport, if any.
    pub transport: Option<TransportKind>,
}

#[derive(Default)]
struct ConnectionRecord {
    handle: Option<TransportHandle>,
    status: ConnectionStatus,
    generation: u64,
    cancel: CancellationToken,
    fallback_pending: bool,
    reached_connected: bool,
}

impl ConnectionRecord {
    /// Cancels the current attempt and releases its transport.
    fn retire(&mut self) -> bool {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => {
                handle.teardown();
                true
            }
            None => false,
        }
    }
}

#[derive(Clone)]
struct Attempt {
    generation: u64,
    cancel: CancellationToken,
}

/// See the module docs.
pub struct StreamManager {
    settings: StreamSettings,
    platform: Arc<dyn MediaPlatform>,
    signaling: Arc<dyn Signaling>,
    surface: Arc<dyn DisplaySurface>,
    records: Mutex<HashMap<CameraId, ConnectionRecord>>,
    lifecycles: HashMap<CameraId, Arc<AsyncMutex<()>>>,
}

impl StreamManager {
    /// Creates the manager. Records are created lazily on first attempt.
    pub fn new(
        settings: StreamSettings,
        platform: Arc<dyn MediaPlatform>,
        signaling: Arc<dyn Signaling>,
        surface: Arc<dyn DisplaySurface>,
    ) -> Arc<Self> {
        let lifecycles = settings
            .cameras
            .iter()
            .map(|camera| (camera.clone(), Arc::new(AsyncMutex::new(()))))
            .collect();

        Arc::new(Self {
            settings,
            platform,
            signaling,
            surface,
            records: Mutex::new(HashMap::new()),
            lifecycles,
        })
    }

    /// Configured cameras, in order.
    pub fn cameras(&self) -> &[CameraId] {
        &self.settings.cameras
    }

    /// Current status of `camera`; `Idle` before its first attempt.
    pub fn status(&self, camera: &CameraId) -> ConnectionStatus {
        self.records().get(camera).map(|r| r.status).unwrap_or_default()
    }

    /// Status and transport of every camera.
    pub fn snapshot(&self) -> Vec<CameraSnapshot> {
        let records = self.records();
        self.settings
            .cameras
            .iter()
            .map(|camera| {
                let record = records.get(camera);
                CameraSnapshot {
                    camera: camera.clone(),
                    status: record.map(|r| r.status).unwrap_or_default(),
                    transport: record.and_then(|r| r.handle.as_ref().map(TransportHandle::kind)),
                }
            })
            .collect()
    }

    /// Connects every camera in configured order, one at a time.
    ///
    /// A camera that already left `idle` by the time its turn comes (a health
    /// sweep got to it first) is left as it is.
    pub async fn initialize_all(self: &Arc<Self>) {
        log::info!("Initializing {} cameras...", self.settings.cameras.len());
        for camera in &self.settings.cameras {
            let lifecycle = match self.lifecycle(camera) {
                Ok(lifecycle) => lifecycle,
                Err(e) => {
                    log::warn!("[{}] {}", camera, e);
                    continue;
                }
            };
            let _turn = lifecycle.lock().await;
            if self.status(camera) != ConnectionStatus::Idle {
                log::debug!("[{}] Already started, skipping", camera);
                continue;
            }
            self.connect_locked(camera).await;
        }
    }

    /// Starts a connection attempt and waits until it settles.
    ///
    /// Settled means the signaling exchange finished (or the playlist
    /// transport was engaged); the final `connected` may arrive later from
    /// the transport.
    pub async fn connect(self: &Arc<Self>, camera: &CameraId) -> Result<ConnectionStatus, StreamError> {
        let lifecycle = self.lifecycle(camera)?;
        let _turn = lifecycle.lock().await;
        Ok(self.connect_locked(camera).await)
    }

    /// Engages the playlist transport now.
    pub async fn fallback(self: &Arc<Self>, camera: &CameraId) -> Result<ConnectionStatus, StreamError> {
        let lifecycle = self.lifecycle(camera)?;
        let _turn = lifecycle.lock().await;
        Ok(self.engage_playlist(camera, StatusLabel::HlsMode))
    }

    /// Tears down the current transport, then connects again.
    pub async fn reconnect(self: &Arc<Self>, camera: &CameraId) -> Result<ConnectionStatus, StreamError> {
        let lifecycle = self.lifecycle(camera)?;
        let _turn = lifecycle.lock().await;
        log::info!("[{}] Reconnecting...", camera);
        self.release_locked(camera);
        Ok(self.connect_locked(camera).await)
    }

    /// Reconnects every camera that has no transport or whose transport is
    /// not connected. Healthy cameras are left alone, and so are cameras with
    /// an attempt still in progress. Returns the cameras that were reconnected.
    pub async fn health_sweep(self: &Arc<Self>) -> Vec<CameraId> {
        let mut turns = Vec::new();
        for camera in &self.settings.cameras {
            if self.is_healthy(camera) {
                continue;
            }
            let Ok(lifecycle) = self.lifecycle(camera) else {
                continue;
            };
            match lifecycle.try_lock_owned() {
                Ok(turn) => turns.push((camera.clone(), turn)),
                Err(_) => log::debug!("[{}] Health sweep: attempt in progress, skipping", camera),
            }
        }

        if turns.is_empty() {
            log::debug!("Health sweep: nothing to reconnect");
            return Vec::new();
        }
        log::info!("Health sweep: reconnecting {} camera(s)", turns.len());

        join_all(turns.into_iter().map(|(camera, turn)| async move {
            log::info!("[{}] Reconnecting...", camera);
            self.release_locked(&camera);
            self.connect_locked(&camera).await;
            drop(turn);
            camera
        }))
        .await
    }

    /// Releases every camera's transport and returns it to `idle`.
    pub async fn release_all(self: &Arc<Self>) {
        for camera in &self.settings.cameras {
            let Ok(lifecycle) = self.lifecycle(camera) else {
                continue;
            };
            let _turn = lifecycle.lock().await;
            if self.release_locked(camera) {
                log::info!("[{}] Transport released", camera);
            }
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<CameraId, ConnectionRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self, camera: &CameraId) -> Result<Arc<AsyncMutex<()>>, StreamError> {
        self.lifecycles
            .get(camera)
            .cloned()
            .ok_or_else(|| StreamError::UnknownCamera(camera.to_string()))
    }

    fn is_current(&self, camera: &CameraId, attempt: &Attempt) -> bool {
        self.records()
            .get(camera)
            .is_some_and(|r| r.generation == attempt.generation)
    }

    fn reached_connected(&self, camera: &CameraId, attempt: &Attempt) -> bool {
        self.records()
            .get(camera)
            .is_some_and(|r| r.generation == attempt.generation && r.reached_connected)
    }

    fn is_healthy(&self, camera: &CameraId) -> bool {
        let records = self.records();
        let Some(record) = records.get(camera) else {
            return false;
        };
        match &record.handle {
            None => false,
            Some(TransportHandle::Realtime(session)) => session.peer_state() == PeerState::Connected,
            Some(TransportHandle::Playlist(_)) => record.status == ConnectionStatus::Connected,
        }
    }

    async fn connect_locked(self: &Arc<Self>, camera: &CameraId) -> ConnectionStatus {
        match self.settings.policy {
            LifecyclePolicy::PlaylistOnly => self.engage_playlist(camera, StatusLabel::Connecting),
            LifecyclePolicy::Negotiated => {
                let attempt = self.begin_attempt(camera, StatusLabel::Connecting);
                match self.negotiate(camera, &attempt).await {
                    Ok(()) => self.status(camera),
                    Err(err) => {
                        log::error!("[{}] Connection error: {}", camera, err);
                        self.fail_primary(camera, &attempt);
                        ConnectionStatus::Error
                    }
                }
            }
        }
    }

    /// Retires whatever the camera had and opens a fresh attempt in `connecting`.
    fn begin_attempt(&self, camera: &CameraId, label: StatusLabel) -> Attempt {
        let (attempt, released) = {
            let mut records = self.records();
            let record = records.entry(camera.clone()).or_default();
            let released = record.retire();
            record.generation += 1;
            record.cancel = CancellationToken::new();
            record.status = ConnectionStatus::Connecting;
            record.fallback_pending = false;
            record.reached_connected = false;
            let attempt = Attempt {
                generation: record.generation,
                cancel: record.cancel.clone(),
            };
            (attempt, released)
        };

        if released {
            self.surface.clear_media(camera);
        }
        self.surface.set_loading(camera, true);
        self.surface.set_error(camera, false);
        self.surface.set_status(camera, label);
        attempt
    }

    fn release_locked(&self, camera: &CameraId) -> bool {
        let released = {
            let mut records = self.records();
            match records.get_mut(camera) {
                Some(record) => {
                    let released = record.retire();
                    record.generation += 1;
                    record.status = ConnectionStatus::Idle;
                    record.fallback_pending = false;
                    released
                }
                None => false,
            }
        };
        if released {
            self.surface.clear_media(camera);
        }
        released
    }

    async fn negotiate(self: &Arc<Self>, camera: &CameraId, attempt: &Attempt) -> Result<(), StreamError> {
        let (mut session, events) = self.platform.open_realtime(camera, self.settings.session_options)?;
        let offer = match session.create_offer() {
            Ok(offer) => offer,
            Err(e) => {
                session.close();
                return Err(e.into());
            }
        };

        self.install(camera, attempt, TransportHandle::Realtime(session));
        self.observe(camera, attempt, TransportKind::Realtime, events);

        let answer = self.signaling.exchange(camera, offer).await?;
        self.with_realtime(camera, attempt, |session| session.apply_answer(&answer))?;
        log::info!("[{}] Negotiation complete", camera);
        Ok(())
    }

    fn install(&self, camera: &CameraId, attempt: &Attempt, handle: TransportHandle) {
        let mut records = self.records();
        match records.get_mut(camera) {
            Some(record) if record.generation == attempt.generation => {
                if let Some(previous) = record.handle.replace(handle) {
                    previous.teardown();
                }
            }
            _ => handle.teardown(),
        }
    }

    fn with_realtime<F>(&self, camera: &CameraId, attempt: &Attempt, f: F) -> Result<(), StreamError>
    where
        F: FnOnce(&mut dyn RealtimeSession) -> Result<(), TransportError>,
    {
        let mut records = self.records();
        let record = records
            .get_mut(camera)
            .filter(|r| r.generation == attempt.generation)
            .ok_or_else(|| StreamError::TransportFatal("attempt superseded".to_string()))?;
        match record.handle.as_mut() {
            Some(TransportHandle::Realtime(session)) => f(&mut **session).map_err(StreamError::from),
            _ => Err(StreamError::TransportFatal("real-time session released".to_string())),
        }
    }

    /// Marks the primary attempt failed and schedules the one-shot fallback.
    fn fail_primary(self: &Arc<Self>, camera: &CameraId, attempt: &Attempt) {
        let schedule = {
            let mut records = self.records();
            match records.get_mut(camera) {
                Some(record) if record.generation == attempt.generation && !record.fallback_pending => {
                    record.status = ConnectionStatus::Error;
                    record.fallback_pending = true;
                    true
                }
                _ => false,
            }
        };
        if !schedule {
            return;
        }
        self.show_failure(camera);
        if self.settings.policy == LifecyclePolicy::Negotiated {
            self.schedule_fallback(camera, attempt);
        }
    }

    /// Marks the camera failed with no automatic follow-up.
    fn fail_terminal(&self, camera: &CameraId, attempt: &Attempt) {
        {
            let mut records = self.records();
            match records.get_mut(camera) {
                Some(record) if record.generation == attempt.generation => record.status = ConnectionStatus::Error,
                _ => return,
            }
        }
        self.show_failure(camera);
    }

    fn show_failure(&self, camera: &CameraId) {
        self.surface.set_status(camera, StatusLabel::Error);
        self.surface.set_loading(camera, false);
        self.surface.set_error(camera, true);
    }

    fn schedule_fallback(self: &Arc<Self>, camera: &CameraId, attempt: &Attempt) {
        let delay = self.settings.fallback_delay;
        log::info!("[{}] Falling back to playlist transport in {}ms", camera, delay.as_millis());

        let manager: Weak<Self> = Arc::downgrade(self);
        let camera = camera.clone();
        let attempt = attempt.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = attempt.cancel.cancelled() => {
                    log::debug!("[{}] Pending fallback dropped, attempt superseded", camera);
                }
                _ = tokio::time::sleep(delay) => {
                    if let Some(manager) = manager.upgrade() {
                        manager.fallback_after(&camera, &attempt).await;
                    }
                }
            }
        });
    }

    async fn fallback_after(self: &Arc<Self>, camera: &CameraId, attempt: &Attempt) {
        let Ok(lifecycle) = self.lifecycle(camera) else {
            return;
        };
        let _turn = lifecycle.lock().await;
        if !self.is_current(camera, attempt) {
            log::debug!("[{}] Fallback skipped, camera moved on", camera);
            return;
        }
        self.engage_playlist(camera, StatusLabel::HlsMode);
    }

    fn engage_playlist(self: &Arc<Self>, camera: &CameraId, label: StatusLabel) -> ConnectionStatus {
        let attempt = self.begin_attempt(camera, label);
        log::info!("[{}] Starting HLS stream...", camera);
        match self.start_playlist(camera, &attempt) {
            Ok(()) => self.status(camera),
            Err(err) => {
                log::error!("[{}] {}", camera, err);
                self.fail_terminal(camera, &attempt);
                ConnectionStatus::Error
            }
        }
    }

    fn start_playlist(self: &Arc<Self>, camera: &CameraId, attempt: &Attempt) -> Result<(), StreamError> {
        let url = self.settings.endpoints.playlist_url(camera)?;

        match self.platform.playlist_support(camera) {
            PlaylistSupport::Native => {
                let (playback, events) = self
                    .platform
                    .attach_native_playlist(camera, &url)
                    .map_err(playlist_error)?;
                self.install(camera, attempt, TransportHandle::Playlist(PlaylistSession::Native(playback)));
                self.observe(camera, attempt, TransportKind::NativePlaylist, events);
                self.surface.attach_media(camera, MediaSource::Playlist(url));
            }
            PlaylistSupport::Engine => {
                let (mut engine, events) = self
                    .platform
                    .open_playlist_engine(camera, self.settings.engine_options)
                    .map_err(playlist_error)?;
                engine.load_source(&url);
                engine.attach_media(&SurfaceIds::for_camera(camera).video);
                self.install(camera, attempt, TransportHandle::Playlist(PlaylistSession::Engine(engine)));
                self.observe(camera, attempt, TransportKind::PlaylistEngine, events);
            }
            PlaylistSupport::Unsupported => return Err(StreamError::CapabilityUnsupported),
        }
        Ok(())
    }

    /// Spawns the observer of one attempt's transport events. It stops when
    /// the attempt is cancelled, the channel closes, or the event ends the
    /// transport.
    fn observe(self: &Arc<Self>, camera: &CameraId, attempt: &Attempt, kind: TransportKind, mut events: TransportEvents) {
        let manager: Weak<Self> = Arc::downgrade(self);
        let camera = camera.clone();
        let attempt = attempt.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = attempt.cancel.cancelled() => break,
                    event = events.recv() => {
                        let (Some(event), Some(manager)) = (event, manager.upgrade()) else {
                            break;
                        };
                        if !manager.on_event(&camera, &attempt, kind, event) {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Applies one transport event. Returns whether to keep observing.
    fn on_event(self: &Arc<Self>, camera: &CameraId, attempt: &Attempt, kind: TransportKind, event: TransportEvent) -> bool {
        if !self.is_current(camera, attempt) {
            return false;
        }

        match event {
            TransportEvent::TrackArrived(TrackKind::Video) if kind == TransportKind::Realtime => {
                log::info!("[{}] Video track received", camera);
                self.surface.attach_media(camera, MediaSource::RealtimeStream);
                self.surface.set_loading(camera, false);
                true
            }
            TransportEvent::TrackArrived(_) => true,
            TransportEvent::PeerStateChanged(state) => {
                log::info!("[{}] Connection state: {:?}", camera, state);
                match state {
                    PeerState::Connected => self.transition(camera, attempt, ConnectionStatus::Connected),
                    PeerState::Disconnected => self.transition(camera, attempt, ConnectionStatus::Disconnected),
                    PeerState::Failed if !self.reached_connected(camera, attempt) => {
                        self.fail_primary(camera, attempt);
                        true
                    }
                    PeerState::Failed => self.transition(camera, attempt, ConnectionStatus::Error),
                    PeerState::New | PeerState::Connecting | PeerState::Closed => true,
                }
            }
            TransportEvent::ManifestParsed | TransportEvent::MetadataLoaded => {
                self.transition(camera, attempt, ConnectionStatus::Connected)
            }
            TransportEvent::Error { fatal: false, detail } => {
                log::debug!("[{}] Recoverable transport error: {}", camera, detail);
                true
            }
            TransportEvent::Error { fatal: true, detail } => {
                log::error!("[{}] Transport error: {}", camera, detail);
                if kind == TransportKind::Realtime {
                    self.fail_primary(camera, attempt);
                    true
                } else {
                    self.fail_terminal(camera, attempt);
                    false
                }
            }
        }
    }

    fn transition(&self, camera: &CameraId, attempt: &Attempt, status: ConnectionStatus) -> bool {
        {
            let mut records = self.records();
            match records.get_mut(camera) {
                Some(record) if record.generation == attempt.generation => {
                    record.status = status;
                    if status == ConnectionStatus::Connected {
                        record.reached_connected = true;
                    }
                }
                _ => return false,
            }
        }

        match status {
            ConnectionStatus::Connected => {
                self.surface.set_status(camera, StatusLabel::Connected);
                self.surface.set_loading(camera, false);
                self.surface.set_error(camera, false);
            }
            ConnectionStatus::Disconnected => self.surface.set_status(camera, StatusLabel::Disconnected),
            ConnectionStatus::Error => self.show_failure(camera),
            ConnectionStatus::Idle | ConnectionStatus::Connecting => {}
        }
        true
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        let records = self.records.get_mut().unwrap_or_else(PoisonError::into_inner);
        for record in records.values_mut() {
            record.retire();
        }
    }
}

fn playlist_error(err: TransportError) -> StreamError {
    match err {
        TransportError::Unsupported(_) => StreamError::CapabilityUnsupported,
        other => StreamError::TransportFatal(other.to_string()),
    }
}
