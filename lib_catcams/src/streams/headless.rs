//! # Headless Media Platform
//!
//! A [`MediaPlatform`] for hosts without a media stack. It cannot negotiate
//! real-time sessions and cannot play playlists natively, so every camera
//! ends up on the playlist engine, which here does the part that needs no
//! decoder: polling the manifest and reporting whether the stream is alive.
//!
//! ## Engine behaviour
//! - Polling starts once the engine has both a source and a media element.
//! - The first fetch that returns a valid manifest (`#EXTM3U` header) emits
//!   [`TransportEvent::ManifestParsed`].
//! - Failed fetches emit non-fatal errors; after `failure_threshold`
//!   consecutive failures a fatal error is emitted and polling stops.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::camera::CameraId;
use super::transport::{
    MediaPlatform, NativePlayback, PlaylistEngine, PlaylistEngineOptions, PlaylistSupport, RealtimeSession,
    SessionOptions, TransportError, TransportEvent, TransportEventSender, TransportEvents,
};
use crate::retrieve::ky_http::ApiClient;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// The parts of an HLS manifest the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistManifest {
    /// `#EXT-X-TARGETDURATION`, if present.
    pub target_duration: Option<Duration>,
    /// Number of `#EXTINF` media segments.
    pub segments: usize,
    /// Number of `#EXT-X-STREAM-INF` variant entries.
    pub variants: usize,
}

impl PlaylistManifest {
    /// Parses a manifest body.
    ///
    /// # Errors
    /// Returns a description of the problem if the body is not an M3U playlist.
    pub fn parse(body: &str) -> Result<Self, String> {
        let mut lines = body
            .trim_start_matches('\u{feff}')
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        if lines.next() != Some("#EXTM3U") {
            return Err("missing #EXTM3U header".to_string());
        }

        let mut manifest = PlaylistManifest {
            target_duration: None,
            segments: 0,
            variants: 0,
        };
        for line in lines {
            if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                let secs: u64 = value
                    .trim()
                    .parse()
                    .map_err(|_| format!("bad target duration: {value}"))?;
                manifest.target_duration = Some(Duration::from_secs(secs));
            } else if line.starts_with("#EXTINF") {
                manifest.segments += 1;
            } else if line.starts_with("#EXT-X-STREAM-INF") {
                manifest.variants += 1;
            }
        }
        Ok(manifest)
    }
}

/// See the module docs.
pub struct HeadlessPlatform {
    client: Arc<ApiClient>,
    poll_interval: Duration,
    failure_threshold: u32,
}

impl HeadlessPlatform {
    /// Platform fetching manifests relative to `media_base`.
    pub fn new(media_base: &Url) -> anyhow::Result<Self> {
        Ok(Self {
            client: Arc::new(ApiClient::new(media_base.as_str(), 0)?),
            poll_interval: DEFAULT_POLL_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        })
    }

    /// Overrides the manifest poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides how many consecutive failed fetches are fatal.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }
}

impl MediaPlatform for HeadlessPlatform {
    fn open_realtime(
        &self,
        _camera: &CameraId,
        _options: SessionOptions,
    ) -> Result<(Box<dyn RealtimeSession>, TransportEvents), TransportError> {
        Err(TransportError::Unsupported(
            "real-time sessions are not available on a headless host".to_string(),
        ))
    }

    fn playlist_support(&self, _camera: &CameraId) -> PlaylistSupport {
        PlaylistSupport::Engine
    }

    fn attach_native_playlist(
        &self,
        _camera: &CameraId,
        _url: &Url,
    ) -> Result<(Box<dyn NativePlayback>, TransportEvents), TransportError> {
        Err(TransportError::Unsupported("no native playlist playback".to_string()))
    }

    fn open_playlist_engine(
        &self,
        camera: &CameraId,
        options: PlaylistEngineOptions,
    ) -> Result<(Box<dyn PlaylistEngine>, TransportEvents), TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = ManifestPoller {
            camera: camera.clone(),
            client: Arc::clone(&self.client),
            events: tx,
            options,
            poll_interval: self.poll_interval,
            failure_threshold: self.failure_threshold,
            source: None,
            media: None,
            cancel: CancellationToken::new(),
            started: false,
        };
        Ok((Box::new(engine), rx))
    }
}

/// Playlist engine that only follows the manifest.
struct ManifestPoller {
    camera: CameraId,
    client: Arc<ApiClient>,
    events: TransportEventSender,
    options: PlaylistEngineOptions,
    poll_interval: Duration,
    failure_threshold: u32,
    source: Option<Url>,
    media: Option<String>,
    cancel: CancellationToken,
    started: bool,
}

impl ManifestPoller {
    fn start_if_ready(&mut self) {
        if self.started {
            return;
        }
        let (Some(source), Some(media)) = (self.source.clone(), self.media.as_deref()) else {
            return;
        };
        self.started = true;

        log::debug!(
            "[{}] Playlist engine bound to {} (live sync rate {})",
            self.camera,
            media,
            self.options.max_live_sync_playback_rate
        );

        tokio::spawn(poll_manifest(
            Arc::clone(&self.client),
            source,
            self.events.clone(),
            self.cancel.clone(),
            self.poll_interval,
            self.failure_threshold,
        ));
    }
}

impl PlaylistEngine for ManifestPoller {
    fn load_source(&mut self, url: &Url) {
        self.source = Some(url.clone());
        self.start_if_ready();
    }

    fn attach_media(&mut self, video_element: &str) {
        self.media = Some(video_element.to_string());
        self.start_if_ready();
    }

    fn destroy(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for ManifestPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_manifest(
    client: Arc<ApiClient>,
    source: Url,
    events: TransportEventSender,
    cancel: CancellationToken,
    interval: Duration,
    threshold: u32,
) {
    let mut parsed = false;
    let mut failures = 0u32;

    loop {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return,
            fetched = fetch_manifest(&client, &source) => fetched,
        };

        let event = match fetched {
            Ok(manifest) => {
                failures = 0;
                if parsed {
                    None
                } else {
                    parsed = true;
                    log::debug!("Manifest parsed: {} ({} segments)", source, manifest.segments);
                    Some(TransportEvent::ManifestParsed)
                }
            }
            Err(detail) => {
                failures += 1;
                Some(TransportEvent::Error {
                    fatal: failures >= threshold,
                    detail,
                })
            }
        };

        let fatal = matches!(event, Some(TransportEvent::Error { fatal: true, .. }));
        if let Some(event) = event {
            if events.send(event).is_err() {
                return;
            }
        }
        if fatal {
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn fetch_manifest(client: &ApiClient, source: &Url) -> Result<PlaylistManifest, String> {
    let response = client
        .request_text(Method::GET, source.as_str(), None, None)
        .await
        .map_err(|e| e.to_string())?;

    if !response.success {
        return Err(format!("manifest fetch returned {}", response.status));
    }
    PlaylistManifest::parse(response.data.as_deref().unwrap_or_default())
}
