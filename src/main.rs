//! `capsync` CLI - inspect caption documents and follow them live

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use capsync::{
    active_cues, adjusted_instant, anchor_offset, parse, Clock, ClockInput, Cue, DocumentSource, EngineConfig,
    FileDocumentSource, HttpDocumentSource, Orientation, Overlay, OverlayFrame, PlatformProfile, PlaybackClock, Size,
};

#[derive(Parser)]
#[command(name = "capsync")]
#[command(about = "Follow growing caption documents in sync with a playback clock")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/capsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a caption document and list its cues
    Parse {
        /// File path or http(s) URL
        source: String,

        /// Print cues as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the cues active at a playback instant
    At {
        /// File path or http(s) URL
        source: String,

        /// Playback position in seconds
        seconds: f64,

        /// Constant shift added to the position
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: f64,
    },

    /// Compute the caption anchor offset for a layout
    Anchor {
        /// Container size, e.g. 1920x800
        #[arg(long)]
        container: Size,

        /// Natural video size, e.g. 1920x1080
        #[arg(long)]
        video: Option<Size>,

        /// Force portrait layout (default: derived from the container)
        #[arg(long)]
        portrait: bool,

        /// Playback controls are on screen
        #[arg(long)]
        chrome: bool,

        /// phone, tablet, desktop or tv (default: from config)
        #[arg(long)]
        platform: Option<PlatformProfile>,
    },

    /// Follow a growing caption document against a real-time clock
    Follow {
        /// File path or http(s) URL
        source: String,

        /// Playback position to start from, in seconds
        #[arg(long, default_value = "0")]
        start: f64,

        /// Constant shift added to the position
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: f64,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long = "for", value_name = "SECONDS")]
        duration: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };

    match cli.command {
        Commands::Parse { source, json } => cmd_parse(&source, json).await?,
        Commands::At { source, seconds, offset } => cmd_at(&source, seconds, offset, &config).await?,
        Commands::Anchor {
            container,
            video,
            portrait,
            chrome,
            platform,
        } => cmd_anchor(container, video, portrait, chrome, platform.unwrap_or(config.platform)),
        Commands::Follow {
            source,
            start,
            offset,
            duration,
        } => cmd_follow(&source, start, offset, duration, config).await?,
    }

    Ok(())
}

fn document_source(source: &str) -> Result<Arc<dyn DocumentSource>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Ok(Arc::new(HttpDocumentSource::new()?))
    } else {
        Ok(Arc::new(FileDocumentSource::new()))
    }
}

async fn fetch_once(source: &str) -> Result<String> {
    document_source(source)?
        .fetch(source)
        .await
        .with_context(|| format!("failed to read {source}"))
}

async fn cmd_parse(source: &str, json: bool) -> Result<()> {
    let cues = parse(&fetch_once(source).await?);

    if json {
        println!("{}", serde_json::to_string_pretty(&cues)?);
        return Ok(());
    }

    for cue in &cues {
        println!("{}", format_cue(cue));
    }
    match cues.available_range() {
        Some(range) => eprintln!(
            "📚 {} cues, {} → {}",
            cues.len(),
            format_timestamp(range.min_time),
            format_timestamp(range.max_time)
        ),
        None => eprintln!("📭 No cues"),
    }
    Ok(())
}

async fn cmd_at(source: &str, seconds: f64, offset: f64, config: &EngineConfig) -> Result<()> {
    let cues = parse(&fetch_once(source).await?);
    let instant = adjusted_instant(seconds, offset, config.render_delay_secs);
    let active = active_cues(&cues, instant);

    if active.is_empty() {
        eprintln!("(no caption at {})", format_timestamp(instant));
    }
    for cue in &active {
        println!("{}", format_cue(cue));
    }
    Ok(())
}

fn cmd_anchor(container: Size, video: Option<Size>, portrait: bool, chrome: bool, platform: PlatformProfile) {
    let orientation = if portrait {
        Orientation::Portrait
    } else {
        Orientation::of(container)
    };
    let offset = anchor_offset(container, video, orientation, chrome, platform);
    println!("{offset}");
}

async fn cmd_follow(source: &str, start: f64, offset: f64, duration: Option<f64>, config: EngineConfig) -> Result<()> {
    let clock = Arc::new(PlaybackClock::start_at(start));
    let overlay = Overlay::spawn(config, document_source(source)?, ClockInput::Pull(clock.clone()));

    overlay.on_available_range_change(|range| match range {
        Some(range) => eprintln!(
            "📚 Captions available {} → {}",
            format_timestamp(range.min_time),
            format_timestamp(range.max_time)
        ),
        None => eprintln!("📭 No captions available"),
    });
    overlay.set_time_offset(offset);
    overlay.set_source(Some(source.to_string()));
    overlay.set_enabled(true);

    eprintln!("🎬 Following {source} from {}", format_timestamp(start));

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    let mut frames = overlay.frames();
    let mut shown: Vec<Cue> = Vec::new();

    loop {
        tokio::select! {
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = frames.borrow_and_update().clone();
                if frame.cues != shown {
                    print_frame(clock.now(), &frame);
                    shown = frame.cues;
                }
            }
            () = sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    overlay.shutdown().await;
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn print_frame(now: f64, frame: &OverlayFrame) {
    if frame.cues.is_empty() {
        println!("[{}] (clear)", format_timestamp(now));
        return;
    }
    for cue in &frame.cues {
        println!("[{}] {}", format_timestamp(now), styled_text(cue));
    }
}

fn format_cue(cue: &Cue) -> String {
    format!(
        "{} --> {}  {}",
        format_timestamp(cue.start_time),
        format_timestamp(cue.end_time),
        styled_text(cue).replace('\n', " | ")
    )
}

/// Italic runs wrapped in underscores.
fn styled_text(cue: &Cue) -> String {
    cue.segments
        .iter()
        .map(|s| if s.italic { format!("_{}_", s.text) } else { s.text.clone() })
        .collect()
}

/// Format seconds as `HH:MM:SS.mmm`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn format_timestamp(seconds: f64) -> String {
    let sign = if seconds < 0.0 { "-" } else { "" };
    let ms = (seconds.abs() * 1000.0).round() as u64;
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let secs = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{sign}{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
}
