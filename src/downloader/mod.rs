// Downloader module - download orchestration core and its collaborators

pub mod artifact;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod relocation;
pub mod session;
pub mod tools;
pub mod traits;

pub use artifact::ArtifactResolver;
pub use config::DownloaderConfig;
pub use diagnostics::FallbackTrigger;
pub use engine::YtDlpEngine;
pub use errors::{DownloadError, EngineError, EngineStage, RelocationError};
pub use format_selector::FormatSelector;
pub use models::{DownloadOutcome, MediaKind, ProgressEvent, QualityTier, SessionConfig};
pub use orchestrator::DownloadOrchestrator;
pub use progress::{ProgressFormatter, ProgressView};
pub use relocation::{LogAnnouncer, PublicFolderRelocator};
pub use session::{DownloadEvent, DownloadHandle, SessionController, SessionState};
pub use tools::{ToolManager, ToolType};
pub use traits::{ExtractionEngine, MediaAnnouncer, ProgressEmitter, Relocator};
