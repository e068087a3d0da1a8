// Extraction engine backed by the yt-dlp command-line tool

pub mod output;
mod ytdlp;

pub use output::{parse_line, EngineLine};
pub use ytdlp::YtDlpEngine;
