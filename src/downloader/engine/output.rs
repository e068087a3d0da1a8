// yt-dlp output parsing
//
// Primary source is our own progress template (machine-readable, `NA` for
// missing values). Plain `[download]` lines are understood as well so an
// engine build that ignores the template still drives the progress bar:
// [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)

use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;

use crate::downloader::models::{ProgressEvent, ProgressPhase};

pub const PROGRESS_MARKER: &str = "[progress]";
pub const ENTRY_MARKER: &str = "[entry]";

/// `--progress-template` value matching [`parse_line`]
pub fn progress_template() -> String {
    format!(
        "download:{} %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s",
        PROGRESS_MARKER
    )
}

/// `--print` value announcing each entry's prepared filename
pub fn entry_template() -> String {
    format!("before_dl:{} %(filename)s", ENTRY_MARKER)
}

/// One classified line of engine output
#[derive(Debug, Clone, PartialEq)]
pub enum EngineLine {
    Progress(ProgressEvent),
    /// Prepared (pre-post-processing) filename of an entry
    Entry(PathBuf),
    /// A post-processor started (name in brackets, e.g. `Merger`)
    PostProcessing(String),
    Other,
}

lazy_static! {
    static ref LEGACY_PROGRESS_RE: Regex = Regex::new(
        r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*\w+)(?:\s+at\s+(\S+\s*\w*/s))?(?:\s+ETA\s+(\S+))?(?:\s+\(frag\s+(\d+)/(\d+)\))?"
    ).unwrap();
    static ref SIZE_RE: Regex = Regex::new(r"^(\d+(?:\.\d+)?)\s*([KMGT]i?B|B|bytes)$").unwrap();
    static ref POSTPROCESS_RE: Regex = Regex::new(
        r"^\[(Merger|ExtractAudio|VideoConvertor|VideoRemuxer|FixupM3u8|FixupM4a|FixupStretched|FixupDuplicateMoov|FixupTimestamp|ModifyChapters|EmbedThumbnail|Metadata)\]"
    ).unwrap();
}

pub fn parse_line(line: &str) -> EngineLine {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        return parse_template_progress(rest.trim())
            .map(EngineLine::Progress)
            .unwrap_or(EngineLine::Other);
    }

    if let Some(rest) = line.strip_prefix(ENTRY_MARKER) {
        let name = rest.trim();
        if name.is_empty() || name == "NA" {
            return EngineLine::Other;
        }
        return EngineLine::Entry(PathBuf::from(name));
    }

    if let Some(caps) = POSTPROCESS_RE.captures(line) {
        return EngineLine::PostProcessing(caps[1].to_string());
    }

    if let Some(event) = parse_legacy_progress(line) {
        return EngineLine::Progress(event);
    }

    EngineLine::Other
}

/// `status|downloaded|total|estimate|speed|eta`
fn parse_template_progress(body: &str) -> Option<ProgressEvent> {
    let mut fields = body.split('|');
    let status = fields.next()?.trim();
    let downloaded = parse_number(fields.next());
    let total = parse_number(fields.next());
    let estimate = parse_number(fields.next());
    let speed = parse_number(fields.next());
    let eta = parse_number(fields.next());

    match status {
        "finished" => Some(ProgressEvent::finished()),
        "downloading" => Some(ProgressEvent {
            phase: ProgressPhase::Downloading,
            downloaded_bytes: downloaded.filter(|d| *d >= 0.0).map_or(0, |d| d as u64),
            total_bytes: total
                .or(estimate)
                .filter(|t| *t > 0.0)
                .map(|t| t as u64),
            byte_rate: speed.filter(|s| *s >= 0.0),
            eta_seconds: eta.filter(|e| *e >= 0.0),
        }),
        _ => None,
    }
}

/// Numeric field; `NA`, `None` and garbage are absent
fn parse_number(field: Option<&str>) -> Option<f64> {
    field
        .map(str::trim)
        .and_then(|f| f.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_legacy_progress(line: &str) -> Option<ProgressEvent> {
    let caps = LEGACY_PROGRESS_RE.captures(line)?;
    let percent: f64 = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2).and_then(|m| parse_human_size(m.as_str()));
    let speed = caps
        .get(3)
        .and_then(|m| parse_human_size(m.as_str().trim_end_matches("/s")));
    let eta = caps.get(4).and_then(|m| parse_clock(m.as_str()));

    let downloaded = total.map_or(0, |t| (t as f64 * percent / 100.0) as u64);

    Some(ProgressEvent {
        phase: ProgressPhase::Downloading,
        downloaded_bytes: downloaded,
        total_bytes: total,
        byte_rate: speed.map(|s| s as f64),
        eta_seconds: eta,
    })
}

/// `310.04MiB` -> bytes. Binary and decimal units.
pub fn parse_human_size(text: &str) -> Option<u64> {
    let caps = SIZE_RE.captures(text.trim())?;
    let value: f64 = caps[1].parse().ok()?;
    let multiplier: f64 = match &caps[2] {
        "B" | "bytes" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}

/// `SS`, `MM:SS` or `HH:MM:SS` -> seconds
pub fn parse_clock(text: &str) -> Option<f64> {
    let mut seconds = 0u64;
    let mut parts = 0;
    for part in text.trim().split(':') {
        let n: u64 = part.parse().ok()?;
        seconds = seconds * 60 + n;
        parts += 1;
    }
    if parts == 0 || parts > 3 {
        return None;
    }
    Some(seconds as f64)
}
