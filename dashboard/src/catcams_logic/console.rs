//! Console rendition of the dashboard page: every display mutation becomes a
//! log line keyed by the element ids a browser page would use, and host
//! events are read line by line from stdin.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use lib_catcams::identity::IdentityProvider;
use lib_catcams::surface::SurfaceIds;
use lib_catcams::{CameraId, DisplaySurface, HostEvent, MediaSource, PageView, StatusLabel};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// What one camera tile currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileState {
    pub label: StatusLabel,
    pub loading: bool,
    pub error: bool,
    pub media: Option<String>,
}

impl Default for TileState {
    fn default() -> Self {
        Self {
            label: StatusLabel::Connecting,
            loading: true,
            error: false,
            media: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsoleSurface {
    tiles: Mutex<BTreeMap<CameraId, TileState>>,
    banner: Mutex<Option<String>>,
}

impl ConsoleSurface {
    pub fn snapshot(&self) -> BTreeMap<CameraId, TileState> {
        self.tiles.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn banner(&self) -> Option<String> {
        self.banner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// One line per tile, plus the banner if one is up.
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .snapshot()
            .iter()
            .map(|(camera, tile)| {
                let mut line = format!("[{}] tile: {}", camera, tile.label.text());
                if tile.loading {
                    line.push_str(", loading");
                }
                if tile.error {
                    line.push_str(", error shown");
                }
                if let Some(media) = &tile.media {
                    line.push_str(&format!(", playing {media}"));
                }
                line
            })
            .collect();
        if let Some(banner) = self.banner() {
            lines.push(format!("Banner: {banner}"));
        }
        lines
    }

    fn update(&self, camera: &CameraId, f: impl FnOnce(&mut TileState)) {
        let mut tiles = self.tiles.lock().unwrap_or_else(PoisonError::into_inner);
        f(tiles.entry(camera.clone()).or_default());
    }
}

impl DisplaySurface for ConsoleSurface {
    fn set_status(&self, camera: &CameraId, label: StatusLabel) {
        let ids = SurfaceIds::for_camera(camera);
        log::info!("[{}] #{} = \"{}\" .{}", camera, ids.status, label.text(), label.class());
        self.update(camera, |tile| tile.label = label);
    }

    fn set_loading(&self, camera: &CameraId, visible: bool) {
        let ids = SurfaceIds::for_camera(camera);
        log::debug!("[{}] #{} {}", camera, ids.loading, if visible { "shown" } else { "hidden" });
        self.update(camera, |tile| tile.loading = visible);
    }

    fn set_error(&self, camera: &CameraId, visible: bool) {
        let ids = SurfaceIds::for_camera(camera);
        log::debug!("[{}] #{} {}", camera, ids.error, if visible { "shown" } else { "hidden" });
        self.update(camera, |tile| tile.error = visible);
    }

    fn attach_media(&self, camera: &CameraId, source: MediaSource) {
        let ids = SurfaceIds::for_camera(camera);
        let media = match source {
            MediaSource::RealtimeStream => "real-time stream".to_string(),
            MediaSource::Playlist(url) => url.to_string(),
        };
        log::info!("[{}] #{} playing {}", camera, ids.video, media);
        self.update(camera, |tile| tile.media = Some(media));
    }

    fn clear_media(&self, camera: &CameraId) {
        let ids = SurfaceIds::for_camera(camera);
        log::debug!("[{}] #{} cleared", camera, ids.video);
        self.update(camera, |tile| tile.media = None);
    }
}

impl PageView for ConsoleSurface {
    fn show_login(&self) {
        log::info!("Login screen shown. Enter `signin <token>` to authenticate.");
    }

    fn show_streams(&self, email: &str) {
        log::info!("Streams shown for {}", email);
    }

    fn show_banner(&self, message: &str) {
        log::warn!("[AUTH] Banner: {}", message);
        *self.banner.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    fn hide_banner(&self) {
        log::debug!("[AUTH] Banner hidden");
        *self.banner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Stands in for the provider's sign-in button: credentials arrive as
/// `signin <token>` lines.
pub struct ConsoleProvider;

impl IdentityProvider for ConsoleProvider {
    fn render_sign_in(&self, client_id: &str) {
        if client_id.is_empty() {
            log::warn!("[AUTH] No client id configured");
        }
        log::info!("[AUTH] Sign-in ready (client id '{}')", client_id);
    }

    fn disable_auto_select(&self) {
        log::debug!("[AUTH] Auto-select disabled");
    }
}

/// Parses one stdin line into a host event.
pub fn parse_command(line: &str) -> Result<HostEvent, String> {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let event = match command.to_ascii_lowercase().as_str() {
        "signin" | "login" => match parts.next() {
            Some(token) => HostEvent::Credential(token.to_string()),
            None => return Err("usage: signin <token>".to_string()),
        },
        "visible" | "show" => HostEvent::VisibilityChanged { hidden: false },
        "hidden" | "hide" => HostEvent::VisibilityChanged { hidden: true },
        "signout" | "logout" => HostEvent::SignOut,
        "status" => HostEvent::StatusReport,
        "quit" | "exit" => HostEvent::Shutdown,
        "" => return Err("empty command".to_string()),
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(event)
}

/// Feeds stdin lines to the dashboard until stdin closes or the dashboard stops listening.
/// `status` also prints what the console tiles show.
pub async fn read_commands(tx: mpsc::Sender<HostEvent>, surface: Arc<ConsoleSurface>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match parse_command(&line) {
                Ok(event) => {
                    if event == HostEvent::StatusReport {
                        for line in surface.report_lines() {
                            log::info!("{}", line);
                        }
                    }
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("{}", e),
            },
            Ok(None) => {
                log::info!("stdin closed");
                let _ = tx.send(HostEvent::Shutdown).await;
                break;
            }
            Err(e) => {
                log::error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}
