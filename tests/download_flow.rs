use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use video_downloader::downloader::models::{EngineEntry, EngineResult, ProgressEvent, SessionConfig};
use video_downloader::downloader::progress::status;
use video_downloader::downloader::traits::{ExtractionEngine, ProgressCallback};
use video_downloader::downloader::{
    DownloadError, DownloadEvent, DownloadOrchestrator, DownloadOutcome, DownloaderConfig,
    EngineError, LogAnnouncer, MediaKind, ProgressEmitter, PublicFolderRelocator, QualityTier,
    SessionController, SessionState,
};

/// Fails the first `failures` calls with `error`, then writes `<template>.<ext>`
struct FakeEngine {
    failures: usize,
    error: &'static str,
    ext: &'static str,
    calls: Mutex<Vec<SessionConfig>>,
}

impl FakeEngine {
    fn new(failures: usize, error: &'static str, ext: &'static str) -> Arc<Self> {
        Arc::new(Self {
            failures,
            error,
            ext,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<SessionConfig> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn extract(
        &self,
        _url: &str,
        config: &SessionConfig,
        on_progress: &ProgressCallback<'_>,
        _cancel: &CancellationToken,
    ) -> Result<EngineResult, DownloadError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(config.clone());
            calls.len()
        };
        if attempt <= self.failures {
            return Err(EngineError::new(self.error).into());
        }

        for downloaded in [0u64, 2_097_152, 4_194_304] {
            on_progress(
                ProgressEvent::downloading(downloaded, Some(4_194_304))
                    .with_rate(Some(1_572_864.0))
                    .with_eta(Some(3.0)),
            );
        }
        on_progress(ProgressEvent::finished());

        let prepared = PathBuf::from(config.output_template().replace("%(ext)s", "webm"));
        std::fs::write(prepared.with_extension(self.ext), b"media").unwrap();
        Ok(EngineResult {
            entries: vec![EngineEntry {
                prepared_filename: prepared,
            }],
        })
    }
}

struct Dirs {
    staging: tempfile::TempDir,
    public: tempfile::TempDir,
}

fn setup(engine: Arc<FakeEngine>) -> (Dirs, SessionController) {
    let dirs = Dirs {
        staging: tempfile::tempdir().unwrap(),
        public: tempfile::tempdir().unwrap(),
    };
    let config = DownloaderConfig::default()
        .with_staging_dir(dirs.staging.path())
        .with_public_dir(Some(dirs.public.path().join("Video-Downloader")));
    let orchestrator = DownloadOrchestrator::new(
        engine,
        Arc::new(PublicFolderRelocator::from_config(&config)),
        Arc::new(LogAnnouncer),
        config,
    );
    (dirs, SessionController::new(Arc::new(orchestrator)))
}

async fn run(
    controller: &SessionController,
    kind: MediaKind,
    quality: QualityTier,
) -> (DownloadOutcome, Vec<DownloadEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = controller
        .start("https://example.com/watch?v=abc", kind, quality, ProgressEmitter::new(tx))
        .unwrap();
    let outcome = handle.wait().await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (outcome, events)
}

#[tokio::test]
async fn audio_download_ends_in_public_folder() {
    let engine = FakeEngine::new(0, "", "mp3");
    let (dirs, controller) = setup(engine.clone());

    let (outcome, events) = run(&controller, MediaKind::Audio, QualityTier::Best).await;

    let DownloadOutcome::Success { final_path, .. } = &outcome else {
        panic!("expected success, got {:?}", outcome);
    };
    let public: &Path = &dirs.public.path().join("Video-Downloader");
    assert_eq!(final_path.parent(), Some(public));
    assert_eq!(final_path.extension().unwrap(), "mp3");
    assert_eq!(std::fs::read(final_path).unwrap(), b"media");

    // staging area is left empty
    assert_eq!(std::fs::read_dir(dirs.staging.path()).unwrap().count(), 0);

    let calls = engine.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].format_query(), "bestaudio/best");
    assert!(!calls[0].format_query().contains("height"));
    assert_eq!(calls[0].post_processors().len(), 1);
    assert_eq!(calls[0].post_processors()[0].kind(), "FFmpegExtractAudio");

    let mut state = SessionState::default();
    let mut saw_half = false;
    for event in &events {
        state.apply(event);
        if let DownloadEvent::Progress(view) = event {
            assert!((0.0..=100.0).contains(&view.percent));
            if view.percent == 50.0 {
                saw_half = true;
                assert_eq!(view.speed_text, "1.5 MB/s");
                assert_eq!(view.eta_text, "0:03");
                assert_eq!(view.size_text, "2.0 MB / 4.0 MB");
            }
        }
    }
    assert!(saw_half);
    assert_eq!(state.status_text, status::COMPLETE);
    assert_eq!(state.eta_text, "Done!");
    assert!(state.trigger_enabled);
}

#[tokio::test]
async fn merge_failure_falls_back_exactly_once() {
    let engine = FakeEngine::new(1, "ERROR: Postprocessing: Stream #1:0 -> #0:1 (copy) failed", "mp4");
    let (_dirs, controller) = setup(engine.clone());

    let (outcome, events) = run(&controller, MediaKind::Both, QualityTier::Res720).await;

    assert!(outcome.is_success());
    let calls = engine.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].has_merge_directive());
    assert_eq!(calls[1].format_query(), "best");
    assert!(!calls[1].has_merge_directive());

    let fallback_notices = events
        .iter()
        .filter(|e| matches!(e, DownloadEvent::Progress(v) if v.status_text == status::MERGE_FALLBACK))
        .count();
    assert_eq!(fallback_notices, 1);
}

#[tokio::test]
async fn repeated_merge_failure_surfaces_error() {
    let engine = FakeEngine::new(2, "ERROR: Postprocessing: Conversion failed!", "mp4");
    let (_dirs, controller) = setup(engine.clone());

    let (outcome, events) = run(&controller, MediaKind::Both, QualityTier::Best).await;

    assert_eq!(engine.calls().len(), 2);
    let mut state = SessionState::default();
    for event in &events {
        state.apply(event);
    }
    assert!(!outcome.is_success());
    assert_eq!(state.status_text, "Error: ERROR: Postprocessing: Conversion failed!");
    assert!(state.trigger_enabled);
}
