//! Per-camera media endpoints under one origin.

use url::Url;

use super::camera::CameraId;
use super::StreamError;

/// Builds `/cam_{camera}/whep` and `/cam_{camera}/{playlist}.m3u8` URLs.
#[derive(Debug, Clone)]
pub struct StreamEndpoints {
    base: Url,
    playlist_name: String,
}

impl StreamEndpoints {
    /// `base` must be absolute and end with `/`.
    pub fn new(base: Url, playlist_name: impl Into<String>) -> Self {
        Self {
            base,
            playlist_name: playlist_name.into(),
        }
    }

    /// The media origin.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Signaling path, relative to the origin.
    pub fn whep_path(camera: &CameraId) -> String {
        format!("cam_{camera}/whep")
    }

    /// Playlist path, relative to the origin.
    pub fn playlist_path(&self, camera: &CameraId) -> String {
        format!("cam_{camera}/{}.m3u8", self.playlist_name)
    }

    /// Absolute signaling URL.
    pub fn whep_url(&self, camera: &CameraId) -> Result<Url, StreamError> {
        self.join(&Self::whep_path(camera))
    }

    /// Absolute playlist URL.
    pub fn playlist_url(&self, camera: &CameraId) -> Result<Url, StreamError> {
        self.join(&self.playlist_path(camera))
    }

    fn join(&self, path: &str) -> Result<Url, StreamError> {
        self.base
            .join(path)
            .map_err(|e| StreamError::InvalidEndpoint(format!("{path}: {e}")))
    }
}
