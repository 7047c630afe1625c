//! # Dashboard Configuration
//!
//! The static configuration surface shared by the identity gate and the
//! stream manager. It is loaded once, before either component runs, and is
//! read-only afterwards.
//!
//! Keys are camelCase on disk. The historical upper-case keys (`DEV_MODE`,
//! `GOOGLE_CLIENT_ID`, `ALLOWED_EMAILS`) are accepted as aliases so existing
//! config objects keep working.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised while loading or validating a [`DashboardConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON for this schema.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// `mediaBaseUrl` is not an absolute URL.
    #[error("Invalid media base URL '{url}': {source}")]
    InvalidUrl {
        /// The offending value.
        url: String,
        /// The underlying parse failure.
        source: url::ParseError,
    },

    /// No cameras configured.
    #[error("Camera set is empty")]
    EmptyCameraSet,
}

/// Which realization of the per-camera lifecycle to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecyclePolicy {
    /// Negotiate a real-time session first; fall back to the playlist
    /// transport after a fixed delay when that fails.
    #[default]
    Negotiated,
    /// Engage the playlist transport directly as the only delivery path.
    PlaylistOnly,
}

impl FromStr for LifecyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "negotiated" => Ok(LifecyclePolicy::Negotiated),
            "playlist-only" | "playlist_only" => Ok(LifecyclePolicy::PlaylistOnly),
            other => Err(format!("unknown lifecycle '{other}', expected negotiated or playlist-only")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
/// # Dashboard Config
///
/// Everything the dashboard needs to know before it starts.
pub struct DashboardConfig {
    /// Bypass authentication. Only honoured when the media host is loopback.
    #[serde(alias = "DEV_MODE")]
    pub dev_mode: bool,
    /// OAuth client id handed to the identity provider.
    #[serde(alias = "GOOGLE_CLIENT_ID")]
    pub google_client_id: String,
    /// Exact emails and `@domain` suffixes allowed in. Empty means open access.
    #[serde(alias = "ALLOWED_EMAILS")]
    pub allowed_emails: Vec<String>,
    /// Camera identifiers, in initialization order.
    pub cameras: Vec<String>,
    /// Origin serving `/cam_{camera}/...`.
    pub media_base_url: String,
    /// Playlist file stem, `video1_stream` or `index` depending on the media server layout.
    pub playlist_name: String,
    /// Lifecycle realization.
    pub lifecycle: LifecyclePolicy,
    /// Delay between a failed real-time attempt and the fallback, in milliseconds.
    pub fallback_delay_ms: u64,
    /// Catch-up playback rate handed to playlist engines.
    pub max_live_sync_playback_rate: f64,
    /// Transient retries for the signaling request.
    pub signaling_retries: u32,
    /// Lifetime of the authentication error banner, in milliseconds.
    pub banner_timeout_ms: u64,
    /// Where the session cache lives. `None` resolves to the platform data dir.
    pub session_file: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            google_client_id: String::new(),
            allowed_emails: Vec::new(),
            cameras: ["left", "right", "top", "other"].iter().map(|c| c.to_string()).collect(),
            media_base_url: "http://localhost:8889/".to_string(),
            playlist_name: "video1_stream".to_string(),
            lifecycle: LifecyclePolicy::Negotiated,
            fallback_delay_ms: 2000,
            max_live_sync_playback_rate: 1.5,
            signaling_retries: 0,
            banner_timeout_ms: 5000,
            session_file: None,
        }
    }
}

impl DashboardConfig {
    /// Reads a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: DashboardConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the components rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::EmptyCameraSet);
        }
        self.media_url()?;
        Ok(())
    }

    /// The media origin, with a trailing slash so relative joins stay under it.
    pub fn media_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.media_base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
            url: self.media_base_url.clone(),
            source,
        })
    }

    /// Host name the dashboard is served from.
    pub fn runtime_host(&self) -> Option<String> {
        self.media_url().ok()?.host_str().map(|h| h.to_string())
    }

    /// Dev bypass is only reachable on a loopback host.
    pub fn dev_bypass_enabled(&self) -> bool {
        self.dev_mode && self.runtime_host().as_deref().is_some_and(is_loopback_host)
    }

    /// The configured fallback delay.
    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }

    /// The configured banner lifetime.
    pub fn banner_timeout(&self) -> Duration {
        Duration::from_millis(self.banner_timeout_ms)
    }

    /// Session cache path, falling back to `<data dir>/catcams/session.json`.
    pub fn session_path(&self) -> PathBuf {
        match &self.session_file {
            Some(path) => path.clone(),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("catcams")
                .join("session.json"),
        }
    }
}

/// `localhost`, `127.0.0.1`, or any other loopback IP literal.
pub fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    trimmed.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_keys_are_accepted() {
        let raw = r#"{
            "DEV_MODE": true,
            "GOOGLE_CLIENT_ID": "abc.apps.googleusercontent.com",
            "ALLOWED_EMAILS": ["@feralcreative.co", "a@x.com"]
        }"#;
        let config: DashboardConfig = serde_json::from_str(raw).unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.google_client_id, "abc.apps.googleusercontent.com");
        assert_eq!(config.allowed_emails.len(), 2);
        assert_eq!(config.cameras, vec!["left", "right", "top", "other"]);
        assert_eq!(config.fallback_delay(), Duration::from_secs(2));
    }

    #[test]
    fn lifecycle_policy_parses_kebab_case() {
        let config: DashboardConfig = serde_json::from_str(r#"{"lifecycle": "playlist-only"}"#).unwrap();
        assert_eq!(config.lifecycle, LifecyclePolicy::PlaylistOnly);
    }

    #[test]
    fn dev_bypass_requires_loopback_host() {
        let mut config = DashboardConfig {
            dev_mode: true,
            ..Default::default()
        };
        assert!(config.dev_bypass_enabled());

        config.media_base_url = "http://127.0.0.1:8889".to_string();
        assert!(config.dev_bypass_enabled());

        config.media_base_url = "https://cats.feralcreative.co/".to_string();
        assert!(!config.dev_bypass_enabled());

        config.media_base_url = "http://localhost:8889/".to_string();
        config.dev_mode = false;
        assert!(!config.dev_bypass_enabled());
    }

    #[test]
    fn loopback_literals() {
        assert!(is_loopback_host("localhost"));
        assert!(is_loopback_host("127.0.0.1"));
        assert!(is_loopback_host("[::1]"));
        assert!(!is_loopback_host("10.0.0.4"));
        assert!(!is_loopback_host("example.com"));
    }

    #[test]
    fn validation_rejects_bad_input() {
        let empty = DashboardConfig {
            cameras: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(empty.validate(), Err(ConfigError::EmptyCameraSet)));

        let bad_url = DashboardConfig {
            media_base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(bad_url.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catcams.json");
        fs::write(&path, r#"{"cameras": ["left"], "playlistName": "index"}"#).unwrap();
        let config = DashboardConfig::from_file(&path).unwrap();
        assert_eq!(config.cameras, vec!["left"]);
        assert_eq!(config.playlist_name, "index");
    }

    #[test]
    fn lifecycle_parses_from_cli_text() {
        assert_eq!("playlist-only".parse::<LifecyclePolicy>(), Ok(LifecyclePolicy::PlaylistOnly));
        assert_eq!("Negotiated".parse::<LifecyclePolicy>(), Ok(LifecyclePolicy::Negotiated));
        assert!("webrtc".parse::<LifecyclePolicy>().is_err());
    }
}
