// Capabilities the orchestrator depends on

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::errors::{DownloadError, RelocationError};
use super::models::{EngineResult, ProgressEvent, SessionConfig};
use super::session::DownloadEvent;

/// Progress hook handed to the engine
pub type ProgressCallback<'a> = dyn Fn(ProgressEvent) + Send + Sync + 'a;

/// Extraction/download engine
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Fetch `url` according to `config`, reporting telemetry through
    /// `on_progress`. Runs to completion unless `cancel` fires.
    async fn extract(
        &self,
        url: &str,
        config: &SessionConfig,
        on_progress: &ProgressCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<EngineResult, DownloadError>;
}

/// A file placed in the shared download area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    pub path: PathBuf,
    pub mime_type: &'static str,
}

/// Moves a finished artifact into user-visible storage
#[async_trait]
pub trait Relocator: Send + Sync {
    async fn relocate(
        &self,
        source: &Path,
        display_filename: &str,
    ) -> Result<PublishedFile, RelocationError>;
}

/// Makes a file visible to media browsers. Best-effort.
pub trait MediaAnnouncer: Send + Sync {
    fn announce(&self, path: &Path);
}

/// Thread-safe hand-off of events to the presentation layer
#[derive(Clone)]
pub struct ProgressEmitter {
    tx: UnboundedSender<DownloadEvent>,
}

impl ProgressEmitter {
    pub fn new(tx: UnboundedSender<DownloadEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: DownloadEvent) {
        // receiver gone means nobody is watching; the download carries on
        let _ = self.tx.send(event);
    }
}
