//! `capsync` - Incremental caption synchronization
//!
//! Keeps a caption overlay in sync with a playback clock while the caption
//! document is still being written.
//!
//! # Features
//!
//! - **Tolerant parsing**: WebVTT-style cues from partial documents, never fails
//! - **Growth-only refresh**: periodic refetch, reparse only when the document grew
//! - **Clock sources**: host-pushed instants or a polled [`Clock`] with a dead-band
//! - **Drift detection**: stalls, buffering and seeks force a resync and refetch
//! - **Anchor positioning**: letterbox and control-bar aware caption placement
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use capsync::{ClockInput, EngineConfig, HttpDocumentSource, Overlay};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = Arc::new(HttpDocumentSource::new()?);
//!     let overlay = Overlay::spawn(EngineConfig::default(), source, ClockInput::Push);
//!     overlay.set_source(Some("https://example.com/live.vtt".into()));
//!     overlay.set_enabled(true);
//!     overlay.set_clock_instant(12.5);
//!
//!     let mut frames = overlay.frames();
//!     frames.changed().await?;
//!     for cue in &frames.borrow().cues {
//!         println!("{}", cue.plain_text);
//!     }
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod cue;
pub mod drift;
pub mod engine;
pub mod fetch;
pub mod parser;
pub mod position;
pub mod resolver;

pub use clock::{Clock, ClockInput, ClockPoller, ManualClock, PlaybackClock};
pub use config::EngineConfig;
pub use cue::{AvailableRange, Cue, CueSet, StyledSegment};
pub use drift::{DriftDetector, DriftOutcome};
pub use engine::{Engine, Lifecycle, Overlay, OverlayFrame, RangeCallback, Transition};
pub use fetch::{DocumentSource, FetchError, FileDocumentSource, HttpDocumentSource, ParseCursor, RefreshScheduler};
pub use parser::parse;
pub use position::{anchor_offset, ControlBarMetrics, Orientation, PlatformProfile, Size};
pub use resolver::{active_cues, adjusted_instant, CueResolver};

/// Version of capsync
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
