// Orchestrator with fallback logic
//
// One `execute` call = one user download. Attempts move through
//   Initial -> (FallbackRetry) -> Terminal
// and FallbackRetry is entered at most once, only for a merge failure of a
// `Both` download.

use std::path::Path;
use std::sync::Arc;

use time::macros::format_description;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::artifact::ArtifactResolver;
use super::config::DownloaderConfig;
use super::diagnostics::{diagnose_error, should_fallback};
use super::errors::DownloadError;
use super::format_selector::FormatSelector;
use super::models::{
    DownloadOutcome, EngineResult, EntryReport, MediaKind, PostProcessor, ProgressEvent,
    QualityTier, SessionConfig, MERGE_CONTAINER,
};
use super::progress::{status, ProgressFormatter, ProgressView};
use super::session::DownloadEvent;
use super::traits::{ExtractionEngine, MediaAnnouncer, ProgressEmitter, Relocator};

/// ffmpeg arguments applied after a merge: stream copy, no re-encode
pub const MERGE_COPY_ARGS: [&str; 4] = ["-c", "copy", "-strict", "-2"];

/// Percent shown while the fallback attempt starts
const FALLBACK_PERCENT: f64 = 50.0;

enum Attempt {
    Initial(SessionConfig),
    FallbackRetry(SessionConfig),
    Terminal(Result<EngineResult, DownloadError>),
}

pub struct DownloadOrchestrator {
    engine: Arc<dyn ExtractionEngine>,
    relocator: Arc<dyn Relocator>,
    announcer: Arc<dyn MediaAnnouncer>,
    resolver: ArtifactResolver,
    config: DownloaderConfig,
}

impl DownloadOrchestrator {
    pub fn new(
        engine: Arc<dyn ExtractionEngine>,
        relocator: Arc<dyn Relocator>,
        announcer: Arc<dyn MediaAnnouncer>,
        config: DownloaderConfig,
    ) -> Self {
        Self {
            engine,
            relocator,
            announcer,
            resolver: ArtifactResolver::new(),
            config,
        }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Whether `kind` may yield more than one entry
    pub fn allows_playlist(&self, kind: MediaKind) -> bool {
        kind == MediaKind::PlaylistAudio || self.config.playlist_by_default
    }

    /// Staging template `download_<YYYYMMDD_HHMMSS>.%(ext)s`, with the
    /// playlist index appended when several entries may share the timestamp
    pub fn output_template(&self, kind: MediaKind, timestamp: &str) -> String {
        let name = if self.allows_playlist(kind) {
            format!("download_{}_%(playlist_index)s.%(ext)s", timestamp)
        } else {
            format!("download_{}.%(ext)s", timestamp)
        };
        self.config.staging_dir.join(name).to_string_lossy().to_string()
    }

    /// Session configuration for the first attempt
    pub fn session_config(
        &self,
        kind: MediaKind,
        quality: QualityTier,
        output_template: &str,
    ) -> Result<SessionConfig, DownloadError> {
        let mut builder = SessionConfig::builder(FormatSelector::select_format(kind, quality), output_template)
            .allow_playlist(self.allows_playlist(kind))
            .ffmpeg_location(self.config.ffmpeg_location.clone())
            .socket_timeout_secs(self.config.socket_timeout_secs);

        if kind.is_audio() {
            builder = builder.post_processor(PostProcessor::extract_audio());
        }

        if kind == MediaKind::Both {
            builder = builder
                .merge_output_format(MERGE_CONTAINER)
                .postprocessor_args(MERGE_COPY_ARGS);
        }

        builder.build()
    }

    /// Run one download to its terminal outcome
    pub async fn execute(
        &self,
        url: &str,
        kind: MediaKind,
        quality: QualityTier,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        info!("[orchestrator] {} ({}, {}) via {}", url, kind, quality, self.engine.name());

        match self.download(url, kind, quality, emitter, cancel).await {
            Ok(result) => self.finalize(result).await,
            Err(e) => {
                warn!("[orchestrator] download failed: {}", e);
                DownloadOutcome::Failed { reason: e.reason() }
            }
        }
    }

    async fn download(
        &self,
        url: &str,
        kind: MediaKind,
        quality: QualityTier,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<EngineResult, DownloadError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DownloadError::InvalidUrl("empty URL".to_string()));
        }

        tokio::fs::create_dir_all(&self.config.staging_dir)
            .await
            .map_err(DownloadError::Staging)?;

        let stamp = timestamp();
        let template = self.output_template(kind, &stamp);
        let initial = self.session_config(kind, quality, &template)?;

        let on_progress = |event: ProgressEvent| {
            emitter.emit(DownloadEvent::Progress(ProgressFormatter::format(&event)));
        };

        let mut attempt = Attempt::Initial(initial);
        loop {
            attempt = match attempt {
                Attempt::Initial(config) => {
                    match self.engine.extract(url, &config, &on_progress, cancel).await {
                        Err(DownloadError::Engine(e))
                            if should_fallback(self.config.fallback_trigger, kind, &e) =>
                        {
                            warn!(
                                "[orchestrator] {} ({}), retrying with a single stream",
                                diagnose_error(&e).description(),
                                e
                            );
                            emitter.emit(DownloadEvent::Progress(ProgressView::status(
                                status::MERGE_FALLBACK,
                                FALLBACK_PERCENT,
                            )));
                            Attempt::FallbackRetry(config.single_stream_fallback())
                        }
                        other => Attempt::Terminal(other),
                    }
                }
                Attempt::FallbackRetry(config) => {
                    Attempt::Terminal(self.engine.extract(url, &config, &on_progress, cancel).await)
                }
                Attempt::Terminal(result) => {
                    if result.is_err() {
                        self.discard_partials(&stamp).await;
                    }
                    return result;
                }
            };
        }
    }

    /// Remove `download_<stamp>*` leftovers (`.part`, `.fNNN.*`) from staging.
    /// Failures are logged and ignored.
    async fn discard_partials(&self, stamp: &str) {
        let prefix = format!("download_{}", stamp);
        let mut dir = match tokio::fs::read_dir(&self.config.staging_dir).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!("[orchestrator] cannot scan staging dir: {}", e);
                return;
            }
        };

        while let Ok(Some(entry)) = dir.next_entry().await {
            if !entry.file_name().to_string_lossy().starts_with(&prefix) {
                continue;
            }
            let path = entry.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("[orchestrator] discarded {}", path.display()),
                Err(e) => warn!("[orchestrator] could not discard {}: {}", path.display(), e),
            }
        }
    }

    /// Resolve and publish every entry. Never fails.
    async fn finalize(&self, result: EngineResult) -> DownloadOutcome {
        if result.entries.is_empty() {
            warn!("[orchestrator] engine reported no entries");
            return DownloadOutcome::Success {
                final_path: self.config.staging_dir.clone(),
                entries: Vec::new(),
            };
        }

        let mut reports = Vec::with_capacity(result.entries.len());
        for entry in &result.entries {
            reports.push(self.place_entry(&entry.prepared_filename).await);
        }

        let final_path = reports
            .iter()
            .find(|r| r.resolved_path.is_some())
            .or(reports.first())
            .map(|r| r.final_path().to_path_buf())
            .unwrap_or_else(|| self.config.staging_dir.clone());

        info!("[orchestrator] complete: {}", final_path.display());
        DownloadOutcome::Success {
            final_path,
            entries: reports,
        }
    }

    async fn place_entry(&self, expected: &Path) -> EntryReport {
        let mut report = EntryReport {
            expected_path: expected.to_path_buf(),
            resolved_path: None,
            published_path: None,
        };

        let Some(found) = self.resolver.resolve(expected) else {
            warn!("[orchestrator] artifact not found, expected {}", expected.display());
            return report;
        };
        report.resolved_path = Some(found.clone());

        let display_name = display_filename(&found);
        match self.relocator.relocate(&found, &display_name).await {
            Ok(published) => {
                info!(
                    "[orchestrator] published {} ({})",
                    published.path.display(),
                    published.mime_type
                );
                if let Err(e) = tokio::fs::remove_file(&found).await {
                    warn!("[orchestrator] could not remove {}: {}", found.display(), e);
                }
                report.published_path = Some(published.path);
            }
            Err(e) => {
                warn!(
                    "[orchestrator] relocation failed ({}), file kept at {}",
                    e,
                    found.display()
                );
                self.announcer.announce(&found);
            }
        }

        report
    }
}

fn display_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Local wall-clock `YYYYMMDD_HHMMSS`; UTC when the offset is unknown
pub fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
