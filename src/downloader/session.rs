// Session layer: UI-facing state and the single-flight download worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::errors::DownloadError;
use super::models::{DownloadOutcome, MediaKind, QualityTier};
use super::orchestrator::DownloadOrchestrator;
use super::progress::{status, ProgressView, UNKNOWN};
use super::traits::ProgressEmitter;

/// Event marshalled from the worker to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// Input refused before anything started
    Rejected { message: String },
    Started,
    Progress(ProgressView),
    Finished(DownloadOutcome),
}

/// Colour hint for the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTone {
    #[default]
    Idle,
    Starting,
    Active,
    Success,
    Error,
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub status_text: String,
    pub tone: StatusTone,
    pub percent: f64,
    pub percent_text: String,
    pub speed_text: String,
    pub eta_text: String,
    pub size_text: String,
    /// Whether the download trigger accepts input
    pub trigger_enabled: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status_text: status::READY.to_string(),
            tone: StatusTone::Idle,
            percent: 0.0,
            percent_text: "0%".to_string(),
            speed_text: UNKNOWN.to_string(),
            eta_text: UNKNOWN.to_string(),
            size_text: String::new(),
            trigger_enabled: true,
        }
    }
}

impl SessionState {
    pub fn apply(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::Rejected { message } => {
                self.status_text = message.clone();
                self.tone = StatusTone::Error;
            }
            DownloadEvent::Started => {
                *self = Self {
                    status_text: status::STARTING.to_string(),
                    tone: StatusTone::Starting,
                    trigger_enabled: false,
                    ..Self::default()
                };
            }
            DownloadEvent::Progress(view) => {
                self.status_text = view.status_text.clone();
                self.tone = StatusTone::Active;
                self.percent = view.percent;
                self.percent_text = format!("{:.1}%", view.percent);
                self.speed_text = view.speed_text.clone();
                self.eta_text = view.eta_text.clone();
                self.size_text = view.size_text.clone();
            }
            DownloadEvent::Finished(DownloadOutcome::Success { .. }) => {
                *self = Self {
                    status_text: status::COMPLETE.to_string(),
                    tone: StatusTone::Success,
                    percent: 100.0,
                    percent_text: "100%".to_string(),
                    eta_text: status::DONE.to_string(),
                    ..Self::default()
                };
            }
            DownloadEvent::Finished(DownloadOutcome::Failed { reason }) => {
                *self = Self {
                    status_text: format!("Error: {}", reason),
                    tone: StatusTone::Error,
                    percent: 0.0,
                    percent_text: UNKNOWN.to_string(),
                    speed_text: String::new(),
                    eta_text: String::new(),
                    size_text: String::new(),
                    trigger_enabled: true,
                };
            }
        }
    }
}

/// A running download
pub struct DownloadHandle {
    join: JoinHandle<DownloadOutcome>,
    cancel: CancellationToken,
}

impl DownloadHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the terminal outcome
    pub async fn wait(self) -> DownloadOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("[session] download task ended abnormally: {}", e);
                DownloadOutcome::Failed {
                    reason: "Download task aborted".to_string(),
                }
            }
        }
    }
}

/// Clears the busy flag when the worker finishes, panics included
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs at most one download at a time on a background task
pub struct SessionController {
    orchestrator: Arc<DownloadOrchestrator>,
    busy: Arc<AtomicBool>,
}

impl SessionController {
    pub fn new(orchestrator: Arc<DownloadOrchestrator>) -> Self {
        Self {
            orchestrator,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start a download. Must be called inside a tokio runtime.
    pub fn start(
        &self,
        url: &str,
        kind: MediaKind,
        quality: QualityTier,
        emitter: ProgressEmitter,
    ) -> Result<DownloadHandle, DownloadError> {
        let url = url.trim().to_string();
        if url.is_empty() {
            emitter.emit(DownloadEvent::Rejected {
                message: status::ENTER_URL.to_string(),
            });
            return Err(DownloadError::InvalidUrl("empty URL".to_string()));
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DownloadError::AlreadyRunning);
        }
        let guard = BusyGuard(self.busy.clone());

        emitter.emit(DownloadEvent::Started);
        info!("[session] starting {}", url);

        let cancel = CancellationToken::new();
        let orchestrator = self.orchestrator.clone();
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            let outcome = {
                let _guard = guard;
                orchestrator.execute(&url, kind, quality, &emitter, &token).await
            };
            emitter.emit(DownloadEvent::Finished(outcome.clone()));
            outcome
        });

        Ok(DownloadHandle { join, cancel })
    }
}
