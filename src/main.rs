use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use video_downloader::downloader::{FallbackTrigger, ToolManager};
use video_downloader::{
    default_orchestrator, DownloadEvent, DownloadOutcome, DownloaderConfig, MediaKind,
    ProgressEmitter, QualityTier, SessionController, SessionState,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media page or playlist URL
    #[arg(required_unless_present = "check_tools")]
    url: Option<String>,

    /// audio, video, both or playlist-audio
    #[arg(short, long, default_value = "both")]
    format: MediaKind,

    /// best, 1080p, 720p, 480p or 360p
    #[arg(short, long, default_value = "best")]
    quality: QualityTier,

    /// Accept multi-entry results for every format, not only playlist-audio
    #[arg(long)]
    playlist_by_default: bool,

    /// When a failed merge retries with a single stream:
    /// post-processing, structured-only or any-failure
    #[arg(long)]
    fallback_trigger: Option<FallbackTrigger>,

    /// Print every event as a JSON line
    #[arg(long)]
    json: bool,

    /// Report yt-dlp/ffmpeg availability and exit
    #[arg(long)]
    check_tools: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("video_downloader=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let mut config = DownloaderConfig::from_env();
    if args.playlist_by_default {
        config = config.with_playlist_by_default(true);
    }
    if let Some(trigger) = args.fallback_trigger {
        config = config.with_fallback_trigger(trigger);
    }

    if args.check_tools {
        return check_tools(config, args.json).await;
    }

    let url = args.url.clone().unwrap_or_default();
    let orchestrator = match default_orchestrator(config) {
        Ok(o) => o,
        Err(e) => {
            error!("[cli] {}", e);
            eprintln!("Error: {}", e.reason());
            return ExitCode::FAILURE;
        }
    };

    let controller = SessionController::new(Arc::new(orchestrator));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut state = SessionState::default();

    let handle = match controller.start(&url, args.format, args.quality, ProgressEmitter::new(tx)) {
        Ok(handle) => handle,
        Err(e) => {
            while let Ok(event) = rx.try_recv() {
                state.apply(&event);
                render(&event, &state, args.json);
            }
            error!("[cli] {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("[cli] interrupted, cancelling download");
            cancel.cancel();
        }
    });

    while let Some(event) = rx.recv().await {
        state.apply(&event);
        render(&event, &state, args.json);
        if matches!(event, DownloadEvent::Finished(_)) {
            break;
        }
    }

    if handle.wait().await.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn render(event: &DownloadEvent, state: &SessionState, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("[cli] failed to encode event: {}", e),
        }
        return;
    }

    match event {
        DownloadEvent::Progress(_) => {
            let mut stdout = std::io::stdout();
            let _ = write!(
                stdout,
                "\r{:<32} {:>6}  Speed: {:<11} ETA: {:<8} {:<24}",
                state.status_text, state.percent_text, state.speed_text, state.eta_text, state.size_text
            );
            let _ = stdout.flush();
        }
        DownloadEvent::Finished(DownloadOutcome::Success { final_path, .. }) => {
            println!("\n{}", state.status_text);
            println!("Saved to {}", final_path.display());
        }
        DownloadEvent::Finished(DownloadOutcome::Failed { .. }) => {
            println!("\n{}", state.status_text);
        }
        DownloadEvent::Started | DownloadEvent::Rejected { .. } => {
            println!("{}", state.status_text);
        }
    }
}

async fn check_tools(config: DownloaderConfig, json: bool) -> ExitCode {
    let tools = ToolManager::new(config).get_all_tools().await;

    if json {
        match serde_json::to_string(&tools) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("[cli] failed to encode tools: {}", e),
        }
    } else {
        for tool in &tools {
            match (&tool.path, &tool.version) {
                (Some(path), version) => println!(
                    "{:<8} {} ({})",
                    tool.name,
                    version.as_deref().unwrap_or("unknown version"),
                    path.display()
                ),
                (None, _) => println!("{:<8} not found", tool.name),
            }
        }
    }

    // ffmpeg is optional: only merge and audio extraction need it
    if tools.iter().any(|t| t.name == "yt-dlp" && t.is_available) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
