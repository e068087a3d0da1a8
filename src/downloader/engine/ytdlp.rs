// yt-dlp CLI engine
//
// Runs one yt-dlp process per attempt, streams both pipes line by line and
// turns them into progress callbacks, entry filenames and stage hints.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::output::{entry_template, parse_line, progress_template, EngineLine};
use crate::downloader::errors::{DownloadError, EngineError, EngineStage};
use crate::downloader::models::{EngineEntry, EngineResult, PostProcessor, SessionConfig};
use crate::downloader::config::DownloaderConfig;
use crate::downloader::tools::ToolManager;
use crate::downloader::traits::{ExtractionEngine, ProgressCallback};

pub struct YtDlpEngine {
    program: PathBuf,
}

impl YtDlpEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Engine backed by the yt-dlp found for `config`
    pub fn discover(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        let program = ToolManager::new(config.clone()).require_ytdlp()?;
        info!("[yt-dlp] using {}", program.display());
        Ok(Self::new(program))
    }

    /// Translate a session configuration into yt-dlp arguments
    pub fn build_args(url: &str, config: &SessionConfig) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            config.format_query().to_string(),
            "-S".to_string(),
            config.format_sort().join(","),
            "-o".to_string(),
            config.output_template().to_string(),
            "-N".to_string(),
            config.concurrent_fragments().to_string(),
            "--http-chunk-size".to_string(),
            config.chunk_size_bytes().to_string(),
            "--buffer-size".to_string(),
            config.buffer_size_bytes().to_string(),
            "--socket-timeout".to_string(),
            config.socket_timeout_secs().to_string(),
        ];

        args.push(if config.allow_playlist() {
            "--yes-playlist".to_string()
        } else {
            "--no-playlist".to_string()
        });

        for pp in config.post_processors() {
            match pp {
                PostProcessor::ExtractAudio { codec, quality } => {
                    args.extend([
                        "-x".to_string(),
                        "--audio-format".to_string(),
                        codec.clone(),
                        "--audio-quality".to_string(),
                        format!("{}K", quality),
                    ]);
                }
            }
        }

        if let Some(container) = config.merge_output_format() {
            args.push("--merge-output-format".to_string());
            args.push(container.to_string());
        }

        if !config.postprocessor_args().is_empty() {
            args.push("--postprocessor-args".to_string());
            args.push(format!("ffmpeg:{}", config.postprocessor_args().join(" ")));
        }

        if let Some(location) = config.ffmpeg_location() {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().to_string());
        }

        args.extend([
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-warnings".to_string(),
            "--no-simulate".to_string(),
            "--progress-template".to_string(),
            progress_template(),
            "--print".to_string(),
            entry_template(),
        ]);

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

/// Diagnostic stderr lines kept for the failure message
const STDERR_TAIL_LINES: usize = 50;

/// Accumulated state of one engine process
#[derive(Default)]
struct RunState {
    entries: Vec<PathBuf>,
    stage: Option<EngineStage>,
    stderr_tail: VecDeque<String>,
}

impl RunState {
    /// Returns true when the line is diagnostic output rather than telemetry
    fn consume(&mut self, line: &str, on_progress: &ProgressCallback<'_>) -> bool {
        match parse_line(line) {
            EngineLine::Progress(event) => {
                self.stage.get_or_insert(EngineStage::Download);
                on_progress(event);
                false
            }
            EngineLine::Entry(path) => {
                if !self.entries.contains(&path) {
                    debug!("[yt-dlp] entry {}", path.display());
                    self.entries.push(path);
                }
                false
            }
            EngineLine::PostProcessing(step) => {
                debug!("[yt-dlp] post-processing: {}", step);
                self.stage = Some(EngineStage::PostProcess);
                true
            }
            EngineLine::Other => {
                if !line.trim().is_empty() {
                    debug!("[yt-dlp] {}", line);
                }
                true
            }
        }
    }

    fn consume_stderr(&mut self, line: &str, on_progress: &ProgressCallback<'_>) {
        if self.consume(line, on_progress) && !line.trim().is_empty() {
            if self.stderr_tail.len() == STDERR_TAIL_LINES {
                self.stderr_tail.pop_front();
            }
            self.stderr_tail.push_back(line.to_string());
        }
    }

    fn failure(&self) -> EngineError {
        let tail: Vec<&str> = self.stderr_tail.iter().map(String::as_str).collect();
        let mut error = EngineError::from_stderr(&tail.join("\n"));
        if error.stage.is_none() {
            error.stage = self.stage;
        }
        error
    }
}

#[async_trait]
impl ExtractionEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract(
        &self,
        url: &str,
        config: &SessionConfig,
        on_progress: &ProgressCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<EngineResult, DownloadError> {
        let args = Self::build_args(url, config);
        debug!("[yt-dlp] {} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    DownloadError::ToolNotFound(self.program.display().to_string())
                }
                _ => DownloadError::Spawn {
                    program: self.program.display().to_string(),
                    source: e,
                },
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::new("Failed to capture yt-dlp stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::new("Failed to capture yt-dlp stderr"))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;
        let mut run = RunState::default();

        while !(out_done && err_done) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("[yt-dlp] cancelled, killing process");
                    let _ = child.kill().await;
                    return Err(DownloadError::Cancelled);
                }
                line = out_lines.next_line(), if !out_done => match line {
                    Ok(Some(line)) => {
                        run.consume(&line, on_progress);
                    }
                    Ok(None) => out_done = true,
                    Err(e) => {
                        warn!("[yt-dlp] stdout read error: {}", e);
                        out_done = true;
                    }
                },
                line = err_lines.next_line(), if !err_done => match line {
                    Ok(Some(line)) => run.consume_stderr(&line, on_progress),
                    Ok(None) => err_done = true,
                    Err(e) => {
                        warn!("[yt-dlp] stderr read error: {}", e);
                        err_done = true;
                    }
                },
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(DownloadError::Cancelled);
            }
            status = child.wait() => status.map_err(|e| EngineError::new(format!("Process error: {}", e)))?,
        };

        if status.success() {
            info!("[yt-dlp] finished with {} entr(y/ies)", run.entries.len());
            return Ok(EngineResult {
                entries: run
                    .entries
                    .into_iter()
                    .map(|prepared_filename| EngineEntry { prepared_filename })
                    .collect(),
            });
        }

        let error = run.failure();
        warn!("[yt-dlp] exited with {}: {}", status, error.message);
        Err(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::{ProgressEvent, MERGE_CONTAINER};
    use std::sync::Mutex;

    fn template() -> String {
        "/stage/download_20240101_120000.%(ext)s".to_string()
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_args_for_audio() {
        let config = SessionConfig::builder("bestaudio/best", template())
            .post_processor(PostProcessor::extract_audio())
            .build()
            .unwrap();
        let args = YtDlpEngine::build_args("https://example.com/v", &config);

        assert_eq!(arg_after(&args, "-f"), Some("bestaudio/best"));
        assert_eq!(arg_after(&args, "-N"), Some("8"));
        assert_eq!(arg_after(&args, "--http-chunk-size"), Some("10485760"));
        assert_eq!(arg_after(&args, "--buffer-size"), Some("65536"));
        assert_eq!(arg_after(&args, "--audio-format"), Some("mp3"));
        assert_eq!(arg_after(&args, "--audio-quality"), Some("192K"));
        assert_eq!(arg_after(&args, "-S"), Some("res,ext:mp4:m4a:webm,proto:https"));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(!args.contains(&"--merge-output-format".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/v"));
    }

    #[test]
    fn test_args_for_merge() {
        let config = SessionConfig::builder("best/bestvideo+bestaudio", template())
            .merge_output_format(MERGE_CONTAINER)
            .postprocessor_args(["-c", "copy", "-strict", "-2"])
            .allow_playlist(true)
            .build()
            .unwrap();
        let args = YtDlpEngine::build_args("u", &config);

        assert_eq!(arg_after(&args, "--merge-output-format"), Some("mkv"));
        assert_eq!(
            arg_after(&args, "--postprocessor-args"),
            Some("ffmpeg:-c copy -strict -2")
        );
        assert!(args.contains(&"--yes-playlist".to_string()));
        assert!(!args.contains(&"-x".to_string()));
    }

    #[test]
    fn test_run_state_tracks_entries_and_stage() {
        let seen = Mutex::new(Vec::new());
        let on_progress = |ev: ProgressEvent| seen.lock().unwrap().push(ev);
        let mut run = RunState::default();

        run.consume("[entry] /stage/a.webm", &on_progress);
        run.consume("[entry] /stage/a.webm", &on_progress);
        run.consume("[progress] downloading|10|100|NA|NA|NA", &on_progress);
        assert_eq!(run.stage, Some(EngineStage::Download));
        run.consume("[Merger] Merging formats into \"/stage/a.mkv\"", &on_progress);

        assert_eq!(run.entries, vec![PathBuf::from("/stage/a.webm")]);
        assert_eq!(run.stage, Some(EngineStage::PostProcess));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stderr_tail_skips_telemetry() {
        let on_progress = |_: ProgressEvent| {};
        let mut run = RunState::default();

        for i in 0..200 {
            run.consume_stderr(&format!("[progress] downloading|{}|1000|NA|NA|NA", i), &on_progress);
            run.consume_stderr(&format!("[debug] line {}", i), &on_progress);
        }
        run.consume_stderr("", &on_progress);
        assert_eq!(run.stderr_tail.len(), STDERR_TAIL_LINES);
        assert!(run.stderr_tail.iter().all(|l| !l.starts_with("[progress]")));

        let error = run.failure();
        assert_eq!(error.message, "[debug] line 199");
        assert_eq!(error.stage, Some(EngineStage::Download));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_not_found() {
        let engine = YtDlpEngine::new("/nonexistent/yt-dlp");
        let config = SessionConfig::builder("best", template()).build().unwrap();
        let result = engine
            .extract("u", &config, &|_| {}, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(DownloadError::ToolNotFound(_))));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use std::time::Duration;

        /// Stand-in yt-dlp that ignores its arguments
        fn fake_ytdlp(dir: &Path, body: &str) -> YtDlpEngine {
            let path = dir.join("yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            YtDlpEngine::new(path)
        }

        fn config() -> SessionConfig {
            SessionConfig::builder("best", template()).build().unwrap()
        }

        #[tokio::test]
        async fn test_extract_collects_entries_and_progress() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_ytdlp(
                dir.path(),
                r#"echo "[entry] /stage/download_20240101_120000.webm"
echo "[progress] downloading|50|100|NA|25|2" >&2
echo "[progress] downloading|100|100|NA|25|0"
echo "[progress] finished|100|100|NA|NA|NA"
exit 0"#,
            );
            let seen = Mutex::new(Vec::new());
            let on_progress = |ev: ProgressEvent| seen.lock().unwrap().push(ev);

            let result = engine
                .extract("u", &config(), &on_progress, &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(
                result.entries,
                vec![EngineEntry {
                    prepared_filename: PathBuf::from("/stage/download_20240101_120000.webm")
                }]
            );
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 3);
            assert!(seen.contains(&ProgressEvent::finished()));
        }

        #[tokio::test]
        async fn test_postprocessing_failure_carries_stage() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_ytdlp(
                dir.path(),
                r#"echo "[progress] downloading|100|100|NA|NA|NA" >&2
echo "ERROR: Postprocessing: Conversion failed!" >&2
exit 1"#,
            );

            let result = engine
                .extract("u", &config(), &|_| {}, &CancellationToken::new())
                .await;

            match result {
                Err(DownloadError::Engine(e)) => {
                    assert_eq!(e.message, "ERROR: Postprocessing: Conversion failed!");
                    assert_eq!(e.stage, Some(EngineStage::PostProcess));
                }
                other => panic!("expected engine error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_failure_without_error_line_hides_progress() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_ytdlp(
                dir.path(),
                r#"echo "[progress] downloading|1|100|NA|2048|5" >&2
echo "[progress] downloading|3|100|NA|2048|5" >&2
exit 1"#,
            );

            let result = engine
                .extract("u", &config(), &|_| {}, &CancellationToken::new())
                .await;

            match result {
                Err(DownloadError::Engine(e)) => {
                    assert_eq!(e.message, "Unknown error");
                    assert_eq!(e.stage, Some(EngineStage::Download));
                }
                other => panic!("expected engine error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_cancel_kills_running_process() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_ytdlp(dir.path(), "exec sleep 30");
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                trigger.cancel();
            });

            let result = tokio::time::timeout(
                Duration::from_secs(10),
                engine.extract("u", &config(), &|_| {}, &cancel),
            )
            .await
            .expect("extract should stop once cancelled");

            assert!(matches!(result, Err(DownloadError::Cancelled)));
        }
    }
}
