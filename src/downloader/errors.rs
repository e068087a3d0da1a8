// Error types for the download pipeline

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Longest error text shown to the user after the `Error: ` prefix
pub const MAX_USER_ERROR_CHARS: usize = 100;

/// Stage of the engine run that produced a failure, when the engine can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStage {
    /// Fetching manifests, formats or fragments
    Download,
    /// Merge, transcode or audio extraction after the fetch
    PostProcess,
}

/// Failure raised by the extraction engine
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
    /// `None` when the engine gave no structured hint
    pub stage: Option<EngineStage>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: None,
        }
    }

    pub fn with_stage(mut self, stage: EngineStage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Build an error from raw engine stderr.
    ///
    /// Keeps the `ERROR:` lines when present, otherwise the last non-empty line.
    pub fn from_stderr(stderr: &str) -> Self {
        let error_lines: Vec<&str> = stderr
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("ERROR:"))
            .collect();

        let message = if !error_lines.is_empty() {
            error_lines.join(" | ")
        } else {
            stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("Unknown error")
                .to_string()
        };

        let stage = if error_lines.iter().any(|l| l.starts_with("ERROR: Postprocessing")) {
            Some(EngineStage::PostProcess)
        } else {
            None
        };

        Self { message, stage }
    }
}

/// Failure of the public-storage placement step. Never fatal to a download.
#[derive(Debug, Error)]
pub enum RelocationError {
    #[error("source not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("no shared download area on this platform")]
    NoPublicArea,

    #[error("failed to publish {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Terminal failure of a download attempt
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// yt-dlp (or another required tool) is not installed
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Rejected session configuration; unreachable from the format selector
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("A download is already in progress")]
    AlreadyRunning,

    #[error("Download cancelled")]
    Cancelled,

    #[error("Staging area unavailable: {0}")]
    Staging(#[source] io::Error),
}

impl DownloadError {
    /// Message as shown after `Error: `, truncated
    pub fn reason(&self) -> String {
        truncate_chars(&self.to_string(), MAX_USER_ERROR_CHARS)
    }
}

/// Truncate on a char boundary
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
