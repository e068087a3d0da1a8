// Downloader configuration
//
// Platform-derived locations plus the two behaviour switches that differ
// between historical variants of the app (playlist default, fallback trigger).

use std::ffi::OsString;
use std::path::PathBuf;

use tracing::warn;

use super::diagnostics::FallbackTrigger;

/// Subfolder of the shared download area that receives finished files
pub const PUBLIC_SUBFOLDER: &str = "Video-Downloader";

pub const ENV_YTDLP: &str = "VIDEO_DOWNLOADER_YTDLP";
pub const ENV_FFMPEG: &str = "VIDEO_DOWNLOADER_FFMPEG";
pub const ENV_PLAYLIST_BY_DEFAULT: &str = "VIDEO_DOWNLOADER_PLAYLIST_BY_DEFAULT";
pub const ENV_FALLBACK_TRIGGER: &str = "VIDEO_DOWNLOADER_FALLBACK_TRIGGER";

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Explicit yt-dlp binary; discovered when `None`
    pub ytdlp_path: Option<PathBuf>,
    /// Directory containing ffmpeg; engine default when `None`
    pub ffmpeg_location: Option<PathBuf>,
    /// Private area the engine writes into
    pub staging_dir: PathBuf,
    /// Shared area finished files are published to; `None` disables relocation
    pub public_dir: Option<PathBuf>,
    /// Allow multi-entry results for every media kind, not only playlists
    pub playlist_by_default: bool,
    pub fallback_trigger: FallbackTrigger,
    pub socket_timeout_secs: u32,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_location: None,
            staging_dir: default_staging_dir(),
            public_dir: dirs::download_dir().map(|d| d.join(PUBLIC_SUBFOLDER)),
            playlist_by_default: false,
            fallback_trigger: FallbackTrigger::default(),
            socket_timeout_secs: 30,
        }
    }
}

impl DownloaderConfig {
    /// Defaults overridden by `VIDEO_DOWNLOADER_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Defaults overridden by whatever `lookup` returns for each key.
    /// Unparseable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let value = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut config = Self::default()
            .with_ytdlp_path(value(ENV_YTDLP).map(PathBuf::from))
            .with_ffmpeg_location(value(ENV_FFMPEG).map(PathBuf::from));

        if let Some(raw) = value(ENV_PLAYLIST_BY_DEFAULT) {
            match parse_switch(&raw.to_string_lossy()) {
                Some(enabled) => config.playlist_by_default = enabled,
                None => warn!("[config] ignoring {}={:?}", ENV_PLAYLIST_BY_DEFAULT, raw),
            }
        }

        if let Some(raw) = value(ENV_FALLBACK_TRIGGER) {
            match raw.to_string_lossy().parse::<FallbackTrigger>() {
                Ok(trigger) => config.fallback_trigger = trigger,
                Err(e) => warn!("[config] ignoring {}: {}", ENV_FALLBACK_TRIGGER, e),
            }
        }

        config
    }

    pub fn with_ytdlp_path(mut self, path: Option<PathBuf>) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_ffmpeg_location(mut self, path: Option<PathBuf>) -> Self {
        self.ffmpeg_location = path;
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn with_public_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.public_dir = dir;
        self
    }

    pub fn with_playlist_by_default(mut self, enabled: bool) -> Self {
        self.playlist_by_default = enabled;
        self
    }

    pub fn with_fallback_trigger(mut self, trigger: FallbackTrigger) -> Self {
        self.fallback_trigger = trigger;
        self
    }

    pub fn with_socket_timeout(mut self, seconds: u32) -> Self {
        self.socket_timeout_secs = seconds;
        self
    }
}

/// App-private writable area, `./staging` when the platform has none
fn default_staging_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("video-downloader").join("staging"))
        .unwrap_or_else(|| PathBuf::from("staging"))
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
