// Engine failure diagnostics
//
// Classifies engine errors and decides whether the one-shot merge fallback
// applies. A structured stage from the engine always wins over text matching.
//
// Text rule: the lowercased message contains "post" (covers "Postprocessing",
// "post-processing", "postprocessor"). This is broad; prefer the structured
// stage whenever the engine reports one.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{EngineError, EngineStage};
use super::models::MediaKind;

/// Coarse failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Merge, transcode or audio extraction failed
    PostProcessing,
    /// Timeout, connection reset, DNS
    Network,
    /// HTTP 403 / 429 / bot checks
    Blocked,
    /// Removed, private or unsupported URL
    Unavailable,
    Other,
}

impl FailureKind {
    pub fn description(&self) -> &'static str {
        match self {
            Self::PostProcessing => "Post-processing (merge/transcode) failed",
            Self::Network => "Network error",
            Self::Blocked => "Request blocked by the site",
            Self::Unavailable => "Media unavailable",
            Self::Other => "Download failed",
        }
    }
}

/// When a failed `Both` download gets its single-stream retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackTrigger {
    /// Structured post-process stage, or the "post" text rule
    #[default]
    PostProcessing,
    /// Only a structured post-process stage
    StructuredOnly,
    /// Any engine failure
    AnyFailure,
}

impl FromStr for FallbackTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "post-processing" | "post" => Ok(Self::PostProcessing),
            "structured-only" | "structured" => Ok(Self::StructuredOnly),
            "any-failure" | "any" => Ok(Self::AnyFailure),
            other => Err(format!("unknown fallback trigger: {}", other)),
        }
    }
}

/// Classify an engine failure
pub fn diagnose_error(error: &EngineError) -> FailureKind {
    if error.stage == Some(EngineStage::PostProcess) {
        return FailureKind::PostProcessing;
    }

    let lower = error.message.to_lowercase();

    if lower.contains("post") {
        return FailureKind::PostProcessing;
    }

    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection reset")
        || lower.contains("name resolution")
        || lower.contains("network is unreachable")
    {
        return FailureKind::Network;
    }

    if lower.contains("http error 403")
        || lower.contains("forbidden")
        || lower.contains("http error 429")
        || lower.contains("too many requests")
        || lower.contains("confirm you're not a bot")
    {
        return FailureKind::Blocked;
    }

    if lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("unsupported url")
        || lower.contains("not available")
        || lower.contains("http error 404")
    {
        return FailureKind::Unavailable;
    }

    FailureKind::Other
}

/// Whether the failed attempt qualifies for the single-stream fallback
pub fn should_fallback(trigger: FallbackTrigger, kind: MediaKind, error: &EngineError) -> bool {
    if kind != MediaKind::Both {
        return false;
    }

    match trigger {
        FallbackTrigger::AnyFailure => true,
        FallbackTrigger::StructuredOnly => error.stage == Some(EngineStage::PostProcess),
        FallbackTrigger::PostProcessing => diagnose_error(error) == FailureKind::PostProcessing,
    }
}
