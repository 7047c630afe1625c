//! # Display Sinks
//!
//! The page elements the dashboard writes to, seen as opaque sinks. Per
//! camera there is a video element, a status label and two overlays
//! (`video-{camera}`, `status-{camera}`, `loading-{camera}`,
//! `error-{camera}`); page-wide there is the login screen, the stream
//! container and the error banner.

use url::Url;

use crate::streams::camera::CameraId;

/// What the status label of a camera shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    /// An attempt is in flight.
    Connecting,
    /// Media is flowing.
    Connected,
    /// The transport dropped after being connected.
    Disconnected,
    /// The attempt or the transport failed.
    Error,
    /// The playlist fallback has been engaged.
    HlsMode,
}

impl StatusLabel {
    /// Text shown to the user.
    pub fn text(self) -> &'static str {
        match self {
            StatusLabel::Connecting => "Connecting...",
            StatusLabel::Connected => "Connected",
            StatusLabel::Disconnected => "Disconnected",
            StatusLabel::Error => "Error",
            StatusLabel::HlsMode => "HLS Mode",
        }
    }

    /// Style class applied next to `status`.
    pub fn class(self) -> &'static str {
        match self {
            StatusLabel::Connecting | StatusLabel::HlsMode => "connecting",
            StatusLabel::Connected => "connected",
            StatusLabel::Disconnected => "disconnected",
            StatusLabel::Error => "error",
        }
    }
}

/// Media assigned to a camera's video element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// The incoming tracks of the real-time session.
    RealtimeStream,
    /// A playlist URL the element resolves natively.
    Playlist(Url),
}

/// Element ids for one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceIds {
    /// `video-{camera}`
    pub video: String,
    /// `status-{camera}`
    pub status: String,
    /// `loading-{camera}`
    pub loading: String,
    /// `error-{camera}`
    pub error: String,
}

impl SurfaceIds {
    /// Ids following the `{kind}-{camera}` naming convention.
    pub fn for_camera(camera: &CameraId) -> Self {
        Self {
            video: format!("video-{camera}"),
            status: format!("status-{camera}"),
            loading: format!("loading-{camera}"),
            error: format!("error-{camera}"),
        }
    }
}

/// Per-camera sinks driven by the stream manager.
pub trait DisplaySurface: Send + Sync {
    /// Sets the status label text and class.
    fn set_status(&self, camera: &CameraId, label: StatusLabel);
    /// Shows or hides the loading overlay.
    fn set_loading(&self, camera: &CameraId, visible: bool);
    /// Shows or hides the error overlay.
    fn set_error(&self, camera: &CameraId, visible: bool);
    /// Points the video element at `source` and starts playback.
    fn attach_media(&self, camera: &CameraId, source: MediaSource);
    /// Detaches whatever the video element was playing.
    fn clear_media(&self, camera: &CameraId);
}

/// Page-wide sinks driven by the identity gate and the dashboard.
pub trait PageView: Send + Sync {
    /// Shows the login screen and hides the stream container.
    fn show_login(&self);
    /// Hides the login screen, shows the stream container and the signed-in email.
    fn show_streams(&self, email: &str);
    /// Shows the error banner.
    fn show_banner(&self, message: &str);
    /// Hides the error banner.
    fn hide_banner(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_and_classes() {
        assert_eq!(StatusLabel::Connecting.text(), "Connecting...");
        assert_eq!(StatusLabel::HlsMode.text(), "HLS Mode");
        assert_eq!(StatusLabel::HlsMode.class(), "connecting");
        assert_eq!(StatusLabel::Error.class(), "error");
    }

    #[test]
    fn element_ids_follow_convention() {
        let ids = SurfaceIds::for_camera(&CameraId::from("top"));
        assert_eq!(ids.video, "video-top");
        assert_eq!(ids.status, "status-top");
        assert_eq!(ids.loading, "loading-top");
        assert_eq!(ids.error, "error-top");
    }
}
