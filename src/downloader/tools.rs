// External tool discovery (yt-dlp, ffmpeg)

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::config::DownloaderConfig;
use super::errors::DownloadError;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

pub struct ToolManager {
    config: DownloaderConfig,
}

impl ToolManager {
    pub fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    /// Path of a tool: explicit config, common install locations, then `PATH`
    pub fn locate(&self, tool_type: ToolType) -> Option<PathBuf> {
        let binary_name = tool_type.as_str();

        let explicit = match tool_type {
            ToolType::YtDlp => self.config.ytdlp_path.clone(),
            ToolType::Ffmpeg => self
                .config
                .ffmpeg_location
                .as_ref()
                .map(|dir| dir.join(binary_name)),
        };
        if let Some(path) = explicit {
            if path.exists() {
                return Some(path);
            }
            debug!("[tools] configured {} not found at {}", binary_name, path.display());
        }

        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];
        if let Some(path) = common_paths.iter().map(PathBuf::from).find(|p| p.exists()) {
            return Some(path);
        }

        which::which(binary_name).ok()
    }

    /// yt-dlp location or `ToolNotFound`
    pub fn require_ytdlp(&self) -> Result<PathBuf, DownloadError> {
        self.locate(ToolType::YtDlp).ok_or_else(|| {
            DownloadError::ToolNotFound("yt-dlp (install it or set VIDEO_DOWNLOADER_YTDLP)".to_string())
        })
    }

    pub async fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = match &path {
            Some(p) => query_version(p, tool_type).await,
            None => None,
        };

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub async fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp).await,
            self.get_tool_info(ToolType::Ffmpeg).await,
        ]
    }
}

/// First line of `<tool> --version`, bounded in time
async fn query_version(path: &Path, tool_type: ToolType) -> Option<String> {
    let output = Command::new(path)
        .arg(tool_type.version_arg())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match timeout(VERSION_PROBE_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            debug!("[tools] failed to run {}: {}", path.display(), e);
            None
        }
        Err(_) => {
            debug!("[tools] {} timed out after {:?}", path.display(), VERSION_PROBE_TIMEOUT);
            None
        }
    }
}
