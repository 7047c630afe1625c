use anyhow::{Context, Result};
use clap::Parser;
use lib_catcams::{DashboardConfig, LifecyclePolicy};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone, Default)]
#[clap(about = "Authenticated multi-camera live-stream dashboard", version)]
pub struct Cli {
    #[clap(long, env = "CATCAMS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "CATCAMS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "CATCAMS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "CATCAMS_DEV_MODE", help = "Bypass authentication (loopback media hosts only).")]
    pub dev_mode: Option<bool>,

    #[clap(long, env = "CATCAMS_GOOGLE_CLIENT_ID", help = "OAuth client id of the identity provider.")]
    pub google_client_id: Option<String>,

    #[clap(long, env = "CATCAMS_ALLOWED_EMAILS", value_delimiter = ',', help = "Comma-separated emails and @domain suffixes allowed in.")]
    pub allowed_emails: Option<Vec<String>>,

    #[clap(long, env = "CATCAMS_CAMERAS", value_delimiter = ',', help = "Comma-separated camera identifiers, in start order.")]
    pub cameras: Option<Vec<String>>,

    #[clap(long, env = "CATCAMS_MEDIA_BASE_URL", help = "Origin serving /cam_{camera}/ endpoints.")]
    pub media_base_url: Option<String>,

    #[clap(long, env = "CATCAMS_PLAYLIST_NAME", help = "Playlist file stem (video1_stream or index).")]
    pub playlist_name: Option<String>,

    #[clap(long, env = "CATCAMS_LIFECYCLE", help = "Lifecycle policy (negotiated or playlist-only).")]
    pub lifecycle: Option<LifecyclePolicy>,

    #[clap(long, env = "CATCAMS_FALLBACK_DELAY_MS", help = "Delay in milliseconds before falling back to the playlist transport.")]
    pub fallback_delay_ms: Option<u64>,

    #[clap(long, env = "CATCAMS_MAX_LIVE_SYNC_PLAYBACK_RATE", help = "Catch-up playback rate for playlist engines.")]
    pub max_live_sync_playback_rate: Option<f64>,

    #[clap(long, env = "CATCAMS_SIGNALING_RETRIES", help = "Transient retries for the signaling request.")]
    pub signaling_retries: Option<u32>,

    #[clap(long, env = "CATCAMS_BANNER_TIMEOUT_MS", help = "Lifetime of the authentication error banner in milliseconds.")]
    pub banner_timeout_ms: Option<u64>,

    #[clap(long, env = "CATCAMS_SESSION_FILE", help = "Path of the session cache.")]
    pub session_file: Option<PathBuf>,
}

/// The on-disk config: the dashboard keys plus the binary's logging keys.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    #[serde(flatten)]
    dashboard: DashboardConfig,
    log_dir: Option<PathBuf>,
    log_level: Option<String>,
}

/// Fully resolved configuration of the binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub dashboard: DashboardConfig,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Cli {
    // Merge over the file config, where Some values on the command line win
    fn merge(self, file: FileConfig) -> AppConfig {
        let base = file.dashboard;
        let dashboard = DashboardConfig {
            dev_mode: self.dev_mode.unwrap_or(base.dev_mode),
            google_client_id: self.google_client_id.unwrap_or(base.google_client_id),
            allowed_emails: self.allowed_emails.unwrap_or(base.allowed_emails),
            cameras: self.cameras.unwrap_or(base.cameras),
            media_base_url: self.media_base_url.unwrap_or(base.media_base_url),
            playlist_name: self.playlist_name.unwrap_or(base.playlist_name),
            lifecycle: self.lifecycle.unwrap_or(base.lifecycle),
            fallback_delay_ms: self.fallback_delay_ms.unwrap_or(base.fallback_delay_ms),
            max_live_sync_playback_rate: self
                .max_live_sync_playback_rate
                .unwrap_or(base.max_live_sync_playback_rate),
            signaling_retries: self.signaling_retries.unwrap_or(base.signaling_retries),
            banner_timeout_ms: self.banner_timeout_ms.unwrap_or(base.banner_timeout_ms),
            session_file: self.session_file.or(base.session_file),
        };

        AppConfig {
            dashboard,
            log_dir: self.log_dir.or(file.log_dir).unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.or(file.log_level).unwrap_or_else(|| "info".to_string()),
        }
    }
}

pub fn load_config() -> Result<AppConfig> {
    resolve(Cli::parse())
}

/// Defaults, then the JSON file (if present), then environment and CLI.
pub fn resolve(cli: Cli) -> Result<AppConfig> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("catcams.json"));

    let file_config = if config_file_path.exists() {
        read_file_config(&config_file_path)?
    } else {
        FileConfig::default()
    };

    let config = cli.merge(file_config);
    config
        .dashboard
        .validate()
        .context("Invalid dashboard configuration")?;
    Ok(config)
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path).context(format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&raw).context(format!("Failed to parse config file: {}", path.display()))
}
