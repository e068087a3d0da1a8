// ProgressFormatter - raw engine telemetry into display strings
//
// Pure and total: absent, zero, negative and non-finite inputs all have a
// defined rendering.

use serde::{Deserialize, Serialize};

use super::models::{ProgressEvent, ProgressPhase};

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;

/// Placeholder for unknown speed or ETA
pub const UNKNOWN: &str = "--";

/// User-facing status vocabulary
pub mod status {
    pub const READY: &str = "Ready";
    pub const STARTING: &str = "Starting download...";
    pub const DOWNLOADING: &str = "Downloading...";
    pub const PROCESSING: &str = "Processing...";
    pub const MERGE_FALLBACK: &str = "Merge failed, trying fallback...";
    pub const COMPLETE: &str = "Download Complete!";
    pub const ENTER_URL: &str = "Please enter a URL first!";
    /// ETA text once a download has completed
    pub const DONE: &str = "Done!";
}

/// Display-ready progress snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressView {
    pub status_text: String,
    /// Always within [0, 100]
    pub percent: f64,
    pub speed_text: String,
    pub eta_text: String,
    pub size_text: String,
}

impl ProgressView {
    /// Status-only view with no telemetry
    pub fn status(status_text: &str, percent: f64) -> Self {
        Self {
            status_text: status_text.to_string(),
            percent: clamp_percent(percent),
            speed_text: UNKNOWN.to_string(),
            eta_text: UNKNOWN.to_string(),
            size_text: String::new(),
        }
    }
}

pub struct ProgressFormatter;

impl ProgressFormatter {
    pub fn format(event: &ProgressEvent) -> ProgressView {
        match event.phase {
            ProgressPhase::Finished => ProgressView::status(status::PROCESSING, 100.0),
            ProgressPhase::Downloading => ProgressView {
                status_text: status::DOWNLOADING.to_string(),
                percent: Self::percent(event.downloaded_bytes, event.total_bytes),
                speed_text: Self::format_speed(event.byte_rate),
                eta_text: Self::format_eta(event.eta_seconds),
                size_text: Self::format_size(event.downloaded_bytes, event.total_bytes),
            },
        }
    }

    /// Share of `total` downloaded, clamped to [0, 100]; 0 when total is unknown
    pub fn percent(downloaded: u64, total: Option<u64>) -> f64 {
        match total {
            Some(total) if total > 0 => clamp_percent(downloaded as f64 / total as f64 * 100.0),
            _ => 0.0,
        }
    }

    pub fn format_speed(byte_rate: Option<f64>) -> String {
        let Some(rate) = byte_rate.filter(|r| r.is_finite() && *r >= 0.0) else {
            return UNKNOWN.to_string();
        };

        if rate >= MIB {
            format!("{:.1} MB/s", rate / MIB)
        } else if rate >= KIB {
            format!("{:.1} KB/s", rate / KIB)
        } else {
            format!("{:.0} B/s", rate)
        }
    }

    pub fn format_eta(eta_seconds: Option<f64>) -> String {
        let Some(eta) = eta_seconds.filter(|e| e.is_finite() && *e >= 0.0) else {
            return UNKNOWN.to_string();
        };

        let secs = eta as u64;
        if secs >= 3600 {
            format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
        } else {
            format!("{}:{:02}", secs / 60, secs % 60)
        }
    }

    /// `X.X MB / Y.Y MB`, or just the downloaded amount when the total is unknown
    pub fn format_size(downloaded: u64, total: Option<u64>) -> String {
        let downloaded_mb = downloaded as f64 / MIB;
        match total {
            Some(total) if total > 0 => {
                format!("{:.1} MB / {:.1} MB", downloaded_mb, total as f64 / MIB)
            }
            _ if downloaded > 0 => format!("{:.1} MB", downloaded_mb),
            _ => String::new(),
        }
    }
}

fn clamp_percent(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 100.0)
    }
}
