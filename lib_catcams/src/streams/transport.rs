//! # Transport Seams
//!
//! The media platform does the real work: real-time negotiation, native
//! playlist playback, playlist demuxing. These traits are the boundary the
//! stream manager drives it through. Every transport reports what happens to
//! it as [`TransportEvent`]s on a channel handed out when it is opened, so the
//! manager observes transports by receiving messages rather than by
//! registering callbacks.

use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use super::camera::CameraId;

/// What a platform collaborator reports when it cannot do something.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The platform lacks the capability altogether.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The negotiation library rejected an operation.
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// The transport could not be started.
    #[error("Transport failed: {0}")]
    Failed(String),
}

/// Kind of an incoming media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Video.
    Video,
    /// Audio.
    Audio,
}

/// Connection state as reported by the real-time session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    /// Created, nothing happened yet.
    #[default]
    New,
    /// ICE/DTLS in progress.
    Connecting,
    /// Media path established.
    Connected,
    /// Lost connectivity, possibly transient.
    Disconnected,
    /// Gave up.
    Failed,
    /// Closed locally.
    Closed,
}

/// Everything a transport can tell the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A remote track arrived on the real-time session.
    TrackArrived(TrackKind),
    /// The real-time session changed state.
    PeerStateChanged(PeerState),
    /// The playlist engine parsed the manifest.
    ManifestParsed,
    /// The natively played playlist loaded its metadata.
    MetadataLoaded,
    /// Something went wrong. Only fatal errors end the transport.
    Error {
        /// Whether the transport gave up.
        fatal: bool,
        /// Human readable detail.
        detail: String,
    },
}

/// Receiving half of a transport's event channel.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;
/// Sending half of a transport's event channel.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Direction of a media section in the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaDirection {
    /// Receive only.
    RecvOnly,
    /// Not negotiated.
    Inactive,
}

/// Which media sections the real-time session negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Video section direction.
    pub video: MediaDirection,
    /// Audio section direction.
    pub audio: MediaDirection,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            video: MediaDirection::RecvOnly,
            audio: MediaDirection::RecvOnly,
        }
    }
}

/// Tuning handed to every playlist-engine instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaylistEngineOptions {
    /// Playback rate used to catch up with the live edge.
    pub max_live_sync_playback_rate: f64,
}

impl Default for PlaylistEngineOptions {
    fn default() -> Self {
        Self {
            max_live_sync_playback_rate: 1.5,
        }
    }
}

/// How a camera's display surface can play a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistSupport {
    /// The element resolves playlist URLs itself.
    Native,
    /// A playlist-engine instance has to be bound to the element.
    Engine,
    /// Neither.
    Unsupported,
}

/// A real-time receive session.
pub trait RealtimeSession: Send {
    /// Produces the local session description.
    fn create_offer(&mut self) -> Result<String, TransportError>;
    /// Applies the remote answer from the signaling exchange.
    fn apply_answer(&mut self, answer: &str) -> Result<(), TransportError>;
    /// The current connection state.
    fn peer_state(&self) -> PeerState;
    /// Releases the session.
    fn close(&mut self);
}

/// A playlist engine bound to one display surface.
pub trait PlaylistEngine: Send {
    /// Points the engine at a playlist.
    fn load_source(&mut self, url: &Url);
    /// Binds the engine to the video element with this id.
    fn attach_media(&mut self, video_element: &str);
    /// Releases the engine.
    fn destroy(&mut self);
}

/// A playlist the display surface plays natively.
pub trait NativePlayback: Send {
    /// Stops observing the element's load and error signals.
    fn detach(&mut self);
}

/// The host platform's media capabilities.
pub trait MediaPlatform: Send + Sync {
    /// Opens a real-time session for `camera`.
    fn open_realtime(
        &self,
        camera: &CameraId,
        options: SessionOptions,
    ) -> Result<(Box<dyn RealtimeSession>, TransportEvents), TransportError>;

    /// What playlist playback `camera`'s surface supports.
    fn playlist_support(&self, camera: &CameraId) -> PlaylistSupport;

    /// Starts observing native playback of `url` on `camera`'s surface.
    fn attach_native_playlist(
        &self,
        camera: &CameraId,
        url: &Url,
    ) -> Result<(Box<dyn NativePlayback>, TransportEvents), TransportError>;

    /// Creates a playlist-engine instance.
    fn open_playlist_engine(
        &self,
        camera: &CameraId,
        options: PlaylistEngineOptions,
    ) -> Result<(Box<dyn PlaylistEngine>, TransportEvents), TransportError>;
}

/// Which transport a handle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Real-time session.
    Realtime,
    /// Playlist played natively by the surface.
    NativePlaylist,
    /// Playlist played through an engine instance.
    PlaylistEngine,
}

/// The playlist half of [`TransportHandle`].
pub enum PlaylistSession {
    /// Native playback.
    Native(Box<dyn NativePlayback>),
    /// Engine-driven playback.
    Engine(Box<dyn PlaylistEngine>),
}

/// The active transport of a camera.
pub enum TransportHandle {
    /// Real-time session.
    Realtime(Box<dyn RealtimeSession>),
    /// Playlist session.
    Playlist(PlaylistSession),
}

impl TransportHandle {
    /// Which transport this is.
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportHandle::Realtime(_) => TransportKind::Realtime,
            TransportHandle::Playlist(PlaylistSession::Native(_)) => TransportKind::NativePlaylist,
            TransportHandle::Playlist(PlaylistSession::Engine(_)) => TransportKind::PlaylistEngine,
        }
    }

    /// Releases the transport with the teardown its type calls for.
    pub fn teardown(self) {
        match self {
            TransportHandle::Realtime(mut session) => session.close(),
            TransportHandle::Playlist(PlaylistSession::Native(mut playback)) => playback.detach(),
            TransportHandle::Playlist(PlaylistSession::Engine(mut engine)) => engine.destroy(),
        }
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransportHandle({:?})", self.kind())
    }
}
