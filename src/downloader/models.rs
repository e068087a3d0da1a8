// Common data models for the download pipeline

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DownloadError;

/// Parallel fragment fetches per download
pub const CONCURRENT_FRAGMENTS: u32 = 8;
/// HTTP chunk size (10 MiB)
pub const CHUNK_SIZE_BYTES: u64 = 10 * 1024 * 1024;
/// Download buffer size (64 KiB)
pub const BUFFER_SIZE_BYTES: u64 = 64 * 1024;

/// Target codec and quality of the audio-extraction post-processor
pub const AUDIO_CODEC: &str = "mp3";
pub const AUDIO_QUALITY: &str = "192";

/// Container used when separate video and audio streams are merged
pub const MERGE_CONTAINER: &str = "mkv";

/// What the user wants out of the URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    Audio,
    Video,
    /// Video with its audio track
    Both,
    /// Every entry of a playlist, as audio
    PlaylistAudio,
}

impl MediaKind {
    pub const ALL: [MediaKind; 4] = [Self::Audio, Self::Video, Self::Both, Self::PlaylistAudio];

    /// Whether the result is transcoded to the fixed audio codec
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio | Self::PlaylistAudio)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Audio => "Audio",
            Self::Video => "Video",
            Self::Both => "Both",
            Self::PlaylistAudio => "Playlist (Audio)",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            "both" => Ok(Self::Both),
            "playlist-audio" | "playlist (audio)" | "playlist" => Ok(Self::PlaylistAudio),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// Upper bound on video height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QualityTier {
    #[default]
    Best,
    Res1080,
    Res720,
    Res480,
    Res360,
}

impl QualityTier {
    pub const ALL: [QualityTier; 5] = [
        Self::Best,
        Self::Res1080,
        Self::Res720,
        Self::Res480,
        Self::Res360,
    ];

    /// Height bound in pixels; `Best` imposes none
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::Best => None,
            Self::Res1080 => Some(1080),
            Self::Res720 => Some(720),
            Self::Res480 => Some(480),
            Self::Res360 => Some(360),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Best => "Best",
            Self::Res1080 => "1080p",
            Self::Res720 => "720p",
            Self::Res480 => "480p",
            Self::Res360 => "360p",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "1080p" | "1080" => Ok(Self::Res1080),
            "720p" | "720" => Ok(Self::Res720),
            "480p" | "480" => Ok(Self::Res480),
            "360p" | "360" => Ok(Self::Res360),
            other => Err(format!("unknown quality: {}", other)),
        }
    }
}

/// Post-processing step requested from the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessor {
    /// Transcode the fetched stream to an audio-only file
    ExtractAudio { codec: String, quality: String },
}

impl PostProcessor {
    pub fn extract_audio() -> Self {
        Self::ExtractAudio {
            codec: AUDIO_CODEC.to_string(),
            quality: AUDIO_QUALITY.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExtractAudio { .. } => "FFmpegExtractAudio",
        }
    }
}

/// Engine configuration for one download attempt.
///
/// Immutable once built. A fallback attempt gets a fresh value from
/// [`SessionConfig::single_stream_fallback`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    format_query: String,
    output_template: String,
    concurrent_fragments: u32,
    chunk_size_bytes: u64,
    buffer_size_bytes: u64,
    post_processors: Vec<PostProcessor>,
    allow_playlist: bool,
    merge_output_format: Option<String>,
    postprocessor_args: Vec<String>,
    format_sort: Vec<String>,
    ffmpeg_location: Option<PathBuf>,
    socket_timeout_secs: u32,
}

impl SessionConfig {
    pub fn builder(format_query: impl Into<String>, output_template: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder {
            format_query: format_query.into(),
            output_template: output_template.into(),
            post_processors: Vec::new(),
            allow_playlist: false,
            merge_output_format: None,
            postprocessor_args: Vec::new(),
            ffmpeg_location: None,
            socket_timeout_secs: 30,
        }
    }

    pub fn format_query(&self) -> &str {
        &self.format_query
    }

    pub fn output_template(&self) -> &str {
        &self.output_template
    }

    pub fn concurrent_fragments(&self) -> u32 {
        self.concurrent_fragments
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_bytes
    }

    pub fn buffer_size_bytes(&self) -> u64 {
        self.buffer_size_bytes
    }

    pub fn post_processors(&self) -> &[PostProcessor] {
        &self.post_processors
    }

    pub fn allow_playlist(&self) -> bool {
        self.allow_playlist
    }

    pub fn merge_output_format(&self) -> Option<&str> {
        self.merge_output_format.as_deref()
    }

    pub fn postprocessor_args(&self) -> &[String] {
        &self.postprocessor_args
    }

    pub fn format_sort(&self) -> &[String] {
        &self.format_sort
    }

    pub fn ffmpeg_location(&self) -> Option<&Path> {
        self.ffmpeg_location.as_deref()
    }

    pub fn socket_timeout_secs(&self) -> u32 {
        self.socket_timeout_secs
    }

    /// Whether the engine must merge separate streams
    pub fn has_merge_directive(&self) -> bool {
        self.merge_output_format.is_some() || !self.postprocessor_args.is_empty()
    }

    /// Single pre-muxed stream, no merge directive, no merge arguments.
    /// Everything else carries over.
    pub fn single_stream_fallback(&self) -> SessionConfig {
        SessionConfig {
            format_query: "best".to_string(),
            merge_output_format: None,
            postprocessor_args: Vec::new(),
            ..self.clone()
        }
    }
}

/// Collects the optional parts of a [`SessionConfig`] and validates them
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    format_query: String,
    output_template: String,
    post_processors: Vec<PostProcessor>,
    allow_playlist: bool,
    merge_output_format: Option<String>,
    postprocessor_args: Vec<String>,
    ffmpeg_location: Option<PathBuf>,
    socket_timeout_secs: u32,
}

impl SessionConfigBuilder {
    pub fn post_processor(mut self, pp: PostProcessor) -> Self {
        self.post_processors.push(pp);
        self
    }

    pub fn allow_playlist(mut self, allow: bool) -> Self {
        self.allow_playlist = allow;
        self
    }

    pub fn merge_output_format(mut self, container: impl Into<String>) -> Self {
        self.merge_output_format = Some(container.into());
        self
    }

    pub fn postprocessor_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.postprocessor_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    pub fn socket_timeout_secs(mut self, secs: u32) -> Self {
        self.socket_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<SessionConfig, DownloadError> {
        if self.format_query.trim().is_empty() {
            return Err(DownloadError::Configuration("empty format query".to_string()));
        }
        if !self.output_template.contains("%(ext)s") {
            return Err(DownloadError::Configuration(format!(
                "output template lacks an extension placeholder: {}",
                self.output_template
            )));
        }
        if self.socket_timeout_secs == 0 {
            return Err(DownloadError::Configuration("socket timeout must be positive".to_string()));
        }

        Ok(SessionConfig {
            format_query: self.format_query,
            output_template: self.output_template,
            concurrent_fragments: CONCURRENT_FRAGMENTS,
            chunk_size_bytes: CHUNK_SIZE_BYTES,
            buffer_size_bytes: BUFFER_SIZE_BYTES,
            post_processors: self.post_processors,
            allow_playlist: self.allow_playlist,
            merge_output_format: self.merge_output_format,
            postprocessor_args: self.postprocessor_args,
            format_sort: vec![
                "res".to_string(),
                "ext:mp4:m4a:webm".to_string(),
                "proto:https".to_string(),
            ],
            ffmpeg_location: self.ffmpeg_location,
            socket_timeout_secs: self.socket_timeout_secs,
        })
    }
}

/// Phase reported by the engine's progress hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    Downloading,
    Finished,
}

/// Raw telemetry from the engine. Consumed once and dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second
    pub byte_rate: Option<f64>,
    pub eta_seconds: Option<f64>,
}

impl ProgressEvent {
    pub fn downloading(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            phase: ProgressPhase::Downloading,
            downloaded_bytes,
            total_bytes,
            byte_rate: None,
            eta_seconds: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            phase: ProgressPhase::Finished,
            downloaded_bytes: 0,
            total_bytes: None,
            byte_rate: None,
            eta_seconds: None,
        }
    }

    pub fn with_rate(mut self, byte_rate: Option<f64>) -> Self {
        self.byte_rate = byte_rate;
        self
    }

    pub fn with_eta(mut self, eta_seconds: Option<f64>) -> Self {
        self.eta_seconds = eta_seconds;
        self
    }
}

/// One downloaded entry as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEntry {
    /// Path the engine prepared before post-processing
    pub prepared_filename: PathBuf,
}

/// What a successful engine run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineResult {
    pub entries: Vec<EngineEntry>,
}

/// Where one entry ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReport {
    pub expected_path: PathBuf,
    /// Artifact found on disk, if any
    pub resolved_path: Option<PathBuf>,
    /// Location in the shared area when relocation succeeded
    pub published_path: Option<PathBuf>,
}

impl EntryReport {
    /// Best known location of the file
    pub fn final_path(&self) -> &Path {
        self.published_path
            .as_deref()
            .or(self.resolved_path.as_deref())
            .unwrap_or(&self.expected_path)
    }
}

/// Terminal result of one user-initiated download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Success {
        final_path: PathBuf,
        entries: Vec<EntryReport>,
    },
    Failed {
        reason: String,
    },
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Probe plan for locating a post-processed artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCandidate {
    pub expected_path: PathBuf,
    pub base_name_without_ext: PathBuf,
    /// Probe order; first existing file wins
    pub candidate_extensions: Vec<String>,
}
