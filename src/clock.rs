//! Playback clock sources
//!
//! The engine sees playback time through [`Clock::now`]. Hosts either push
//! each new instant themselves ([`ClockInput::Push`]) or hand over a
//! [`Clock`] the engine polls on its own schedule ([`ClockInput::Pull`]).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;

/// Current playback position, in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// How the host delivers playback time.
#[derive(Clone)]
pub enum ClockInput {
    /// Host sends every instant through `Overlay::set_clock_instant`
    Push,
    /// Engine polls this clock at `clock_poll_hz` while enabled
    Pull(Arc<dyn Clock>),
}

impl ClockInput {
    #[must_use]
    pub fn pull(clock: impl Clock + 'static) -> Self {
        Self::Pull(Arc::new(clock))
    }

    #[must_use]
    pub fn is_pull(&self) -> bool {
        matches!(self, Self::Pull(_))
    }
}

impl fmt::Debug for ClockInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => f.write_str("Push"),
            Self::Pull(_) => f.write_str("Pull(..)"),
        }
    }
}

/// Dead-band filter over polled clock readings.
///
/// A reading is committed only when it moved more than `dead_band` seconds
/// away from the last committed one, in either direction.
#[derive(Debug, Clone)]
pub struct ClockPoller {
    dead_band: f64,
    committed: Option<f64>,
}

impl ClockPoller {
    #[must_use]
    pub fn new(dead_band: f64) -> Self {
        Self {
            dead_band,
            committed: None,
        }
    }

    /// Returns the reading if it was committed.
    pub fn observe(&mut self, reading: f64) -> Option<f64> {
        if !reading.is_finite() {
            return None;
        }
        match self.committed {
            Some(last) if (reading - last).abs() <= self.dead_band => None,
            _ => {
                self.committed = Some(reading);
                Some(reading)
            }
        }
    }

    #[must_use]
    pub fn committed(&self) -> Option<f64> {
        self.committed
    }

    pub fn reset(&mut self) {
        self.committed = None;
    }
}

/// A clock whose value is set explicitly, for scripted playback and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(position: f64) -> Self {
        Self {
            bits: AtomicU64::new(position.to_bits()),
        }
    }

    pub fn set(&self, position: f64) {
        self.bits.store(position.to_bits(), Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy)]
struct PlaybackState {
    /// Position at `anchor`
    position: f64,
    /// `None` while paused
    anchor: Option<Instant>,
}

/// Real-time playback clock advancing at 1x from a start position.
///
/// Runs on tokio's clock, so paused-time tests drive it deterministically.
#[derive(Debug)]
pub struct PlaybackClock {
    state: Mutex<PlaybackState>,
}

impl PlaybackClock {
    /// Start playing from `position` seconds.
    #[must_use]
    pub fn start_at(position: f64) -> Self {
        Self {
            state: Mutex::new(PlaybackState {
                position,
                anchor: Some(Instant::now()),
            }),
        }
    }

    pub fn pause(&self) {
        let mut state = self.lock();
        if let Some(anchor) = state.anchor.take() {
            state.position += anchor.elapsed().as_secs_f64();
        }
    }

    pub fn resume(&self) {
        let mut state = self.lock();
        if state.anchor.is_none() {
            state.anchor = Some(Instant::now());
        }
    }

    /// Jump to `position`, keeping the play/pause state.
    pub fn seek(&self, position: f64) {
        let mut state = self.lock();
        state.position = position;
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().anchor.is_none()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for PlaybackClock {
    fn now(&self) -> f64 {
        let state = self.lock();
        match state.anchor {
            Some(anchor) => state.position + anchor.elapsed().as_secs_f64(),
            None => state.position,
        }
    }
}
