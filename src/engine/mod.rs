//! Overlay engine
//!
//! [`Engine`] is the synchronous state of one caption overlay: host inputs,
//! the current cue set, the extraction epoch, drift and resolver state. It
//! owns no timers. [`runtime::Overlay`] drives it from a single tokio task.
//!
//! Lifecycle:
//! - `Inactive -> Active` once enabled with a source URL
//! - `Active -> Inactive` on disable or source clear
//! - `Active -> Active` (reset) when the source URL changes while enabled

pub mod runtime;

use serde::Serialize;
use tracing::debug;

use crate::clock::ClockPoller;
use crate::config::EngineConfig;
use crate::cue::{AvailableRange, Cue, CueSet};
use crate::drift::{DriftDetector, DriftOutcome};
use crate::fetch::RefreshScheduler;
use crate::position::{anchor_offset, Orientation, Size};
use crate::resolver::{adjusted_instant, CueResolver};

pub use runtime::{Overlay, RangeCallback};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lifecycle {
    Inactive,
    Active,
}

/// What a host input did to the lifecycle. The runtime starts or stops its
/// periodic tasks accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Started,
    /// Source changed while active; state was reset for a new epoch
    Restarted,
    Stopped,
}

/// Everything the host renders for one overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayFrame {
    pub cues: Vec<Cue>,
    /// Distance of the caption anchor from the container bottom
    pub anchor_offset: f64,
    /// Passed through from the host untouched
    pub size_scale: f64,
    /// Resync counter, bumped on every detected drift
    pub generation: u64,
    pub available_range: Option<AvailableRange>,
}

impl Default for OverlayFrame {
    fn default() -> Self {
        Self {
            cues: Vec::new(),
            anchor_offset: 0.0,
            size_scale: 1.0,
            generation: 0,
            available_range: None,
        }
    }
}

#[derive(Debug, Clone)]
struct HostInputs {
    source_url: Option<String>,
    enabled: bool,
    time_offset: f64,
    size_scale: f64,
    chrome_visible: bool,
    video_size: Option<Size>,
    container: Size,
    orientation: Orientation,
}

impl Default for HostInputs {
    fn default() -> Self {
        Self {
            source_url: None,
            enabled: false,
            time_offset: 0.0,
            size_scale: 1.0,
            chrome_visible: false,
            video_size: None,
            container: Size::default(),
            orientation: Orientation::default(),
        }
    }
}

/// State of a single caption overlay.
///
/// All per-overlay caches live here, so any number of overlays can coexist.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    inputs: HostInputs,
    lifecycle: Lifecycle,
    refresh: RefreshScheduler,
    cues: CueSet,
    /// Bumped whenever `cues` is replaced
    revision: u64,
    range: Option<AvailableRange>,
    pending_range: Option<Option<AvailableRange>>,
    generation: u64,
    drift: DriftDetector,
    resolver: CueResolver,
    poller: ClockPoller,
    instant: Option<f64>,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let drift = DriftDetector::new(config.drift_period_secs, config.drift_tolerance_secs);
        let poller = ClockPoller::new(config.clock_dead_band_secs);
        Self {
            config,
            inputs: HostInputs::default(),
            lifecycle: Lifecycle::Inactive,
            refresh: RefreshScheduler::new(),
            cues: CueSet::new(),
            revision: 0,
            range: None,
            pending_range: None,
            generation: 0,
            drift,
            resolver: CueResolver::new(),
            poller,
            instant: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    #[must_use]
    pub fn source_url(&self) -> Option<&str> {
        self.inputs.source_url.as_deref()
    }

    /// Epoch new fetches must be tagged with.
    #[must_use]
    pub fn fetch_epoch(&self) -> u64 {
        self.refresh.epoch()
    }

    #[must_use]
    pub fn cues(&self) -> &CueSet {
        &self.cues
    }

    #[must_use]
    pub fn available_range(&self) -> Option<AvailableRange> {
        self.range
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last committed playback instant.
    #[must_use]
    pub fn clock_instant(&self) -> Option<f64> {
        self.instant
    }

    pub fn set_source(&mut self, url: Option<String>) -> Transition {
        let url = url.filter(|u| !u.trim().is_empty());
        if url == self.inputs.source_url {
            return Transition::Unchanged;
        }
        self.inputs.source_url = url;
        self.update_lifecycle(true)
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Transition {
        if enabled == self.inputs.enabled {
            return Transition::Unchanged;
        }
        self.inputs.enabled = enabled;
        self.update_lifecycle(false)
    }

    pub fn set_time_offset(&mut self, offset: f64) {
        if offset.is_finite() {
            self.inputs.time_offset = offset;
        }
    }

    pub fn set_size_scale(&mut self, scale: f64) {
        if scale.is_finite() {
            self.inputs.size_scale = scale;
        }
    }

    pub fn set_chrome_visible(&mut self, visible: bool) {
        self.inputs.chrome_visible = visible;
    }

    pub fn set_video_size(&mut self, size: Option<Size>) {
        self.inputs.video_size = size;
    }

    pub fn set_container(&mut self, container: Size, orientation: Orientation) {
        self.inputs.container = container;
        self.inputs.orientation = orientation;
    }

    /// Push-form clock: the host's value is used directly.
    pub fn set_clock_instant(&mut self, instant: f64) {
        if instant.is_finite() {
            self.instant = Some(instant);
        }
    }

    /// Pull-form clock reading. Returns whether it was committed.
    pub fn poll_clock(&mut self, reading: f64) -> bool {
        if !self.is_active() {
            return false;
        }
        match self.poller.observe(reading) {
            Some(instant) => {
                self.instant = Some(instant);
                true
            }
            None => false,
        }
    }

    /// Feed a fetched document. Returns `true` if the cue set was replaced.
    pub fn offer_document(&mut self, epoch: u64, document: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        let Some(cues) = self.refresh.offer(epoch, document) else {
            return false;
        };

        debug!(cues = cues.len(), bytes = document.len(), "Cue set updated");
        self.cues = cues;
        self.revision += 1;
        let range = self.cues.available_range();
        self.set_range(range);
        true
    }

    /// Periodic drift check at wall time `now`. `None` while inactive.
    ///
    /// On drift the generation is bumped; the caller must also refetch.
    pub fn check_drift(&mut self, now: f64) -> Option<DriftOutcome> {
        if !self.is_active() {
            return None;
        }
        let outcome = self.drift.check(now, self.instant);
        if outcome.needs_correction() {
            self.generation += 1;
        }
        Some(outcome)
    }

    /// Re-resolve the active cues. Returns `true` if they changed.
    pub fn resolve(&mut self) -> bool {
        match (self.lifecycle, self.instant) {
            (Lifecycle::Active, Some(instant)) => {
                let instant = adjusted_instant(instant, self.inputs.time_offset, self.config.render_delay_secs);
                self.resolver.resolve(&self.cues, self.revision, instant, self.generation)
            }
            _ => self.resolver.clear(),
        }
    }

    #[must_use]
    pub fn active_cues(&self) -> &[Cue] {
        self.resolver.active()
    }

    #[must_use]
    pub fn anchor_offset(&self) -> f64 {
        anchor_offset(
            self.inputs.container,
            self.inputs.video_size,
            self.inputs.orientation,
            self.inputs.chrome_visible,
            self.config.platform,
        )
    }

    #[must_use]
    pub fn frame(&self) -> OverlayFrame {
        OverlayFrame {
            cues: self.active_cues().to_vec(),
            anchor_offset: self.anchor_offset(),
            size_scale: self.inputs.size_scale,
            generation: self.generation,
            available_range: self.range,
        }
    }

    /// The range change not yet reported to the host, if any.
    pub fn take_range_change(&mut self) -> Option<Option<AvailableRange>> {
        self.pending_range.take()
    }

    fn update_lifecycle(&mut self, source_changed: bool) -> Transition {
        let should_run = self.inputs.enabled && self.inputs.source_url.is_some();
        let transition = match (self.lifecycle, should_run) {
            (Lifecycle::Inactive, true) => {
                self.reset_epoch();
                self.drift.reset();
                self.poller.reset();
                self.lifecycle = Lifecycle::Active;
                Transition::Started
            }
            (Lifecycle::Active, false) => {
                // A fresh epoch also invalidates responses still in flight
                self.reset_epoch();
                self.drift.reset();
                self.poller.reset();
                self.lifecycle = Lifecycle::Inactive;
                Transition::Stopped
            }
            (Lifecycle::Active, true) if source_changed => {
                self.reset_epoch();
                Transition::Restarted
            }
            _ => Transition::Unchanged,
        };

        if transition != Transition::Unchanged {
            debug!(?transition, url = ?self.inputs.source_url, epoch = self.refresh.epoch(), "Overlay lifecycle");
        }
        transition
    }

    /// Drop everything tied to the previous source.
    fn reset_epoch(&mut self) {
        self.refresh.begin_epoch();
        self.cues = CueSet::new();
        self.revision += 1;
        self.resolver.clear();
        self.set_range(None);
    }

    fn set_range(&mut self, range: Option<AvailableRange>) {
        if range != self.range {
            self.range = range;
            self.pending_range = Some(range);
        }
    }
}
