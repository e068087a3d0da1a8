pub mod downloader;

use std::sync::Arc;

pub use downloader::{
    DownloadError, DownloadEvent, DownloadOrchestrator, DownloadOutcome, DownloaderConfig,
    MediaKind, ProgressEmitter, QualityTier, SessionController, SessionState,
};

use downloader::{LogAnnouncer, PublicFolderRelocator, YtDlpEngine};

/// Orchestrator wired to yt-dlp, the public download folder and log-only announcements
pub fn default_orchestrator(config: DownloaderConfig) -> Result<DownloadOrchestrator, DownloadError> {
    let engine = YtDlpEngine::discover(&config)?;
    let relocator = PublicFolderRelocator::from_config(&config);
    Ok(DownloadOrchestrator::new(
        Arc::new(engine),
        Arc::new(relocator),
        Arc::new(LogAnnouncer),
        config,
    ))
}
