//! Clock drift detection
//!
//! Every `period` the engine hands the detector the current wall time. If
//! the gap since the previous check is outside `period ± tolerance`, the host
//! stalled, buffered, or seeked, and the engine must resync.

use tracing::{debug, info};

/// Result of one periodic check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftOutcome {
    /// First check after enabling; baseline recorded, nothing compared
    Baseline,
    /// Gap within tolerance
    Steady,
    /// Gap out of tolerance; resolver must re-evaluate and cues be refetched
    Drifted {
        /// Observed wall-clock gap in seconds
        delta: f64,
    },
}

impl DriftOutcome {
    #[must_use]
    pub fn needs_correction(&self) -> bool {
        matches!(self, Self::Drifted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DriftState {
    Uninitialized,
    Tracking { last_check_wall_time: f64 },
}

/// Two-state drift detector: `Uninitialized` then `Tracking`.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    period: f64,
    tolerance: f64,
    state: DriftState,
}

impl DriftDetector {
    #[must_use]
    pub fn new(period: f64, tolerance: f64) -> Self {
        Self {
            period,
            tolerance,
            state: DriftState::Uninitialized,
        }
    }

    /// Back to `Uninitialized`; the next check only records a baseline.
    pub fn reset(&mut self) {
        self.state = DriftState::Uninitialized;
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        matches!(self.state, DriftState::Tracking { .. })
    }

    /// Run one check at wall time `now` (seconds). `clock_instant` is the
    /// playback position at the same moment, logged alongside the verdict.
    pub fn check(&mut self, now: f64, clock_instant: Option<f64>) -> DriftOutcome {
        let previous = self.state;
        // The baseline slides on every check, so one anomaly fires once
        self.state = DriftState::Tracking {
            last_check_wall_time: now,
        };

        let DriftState::Tracking {
            last_check_wall_time,
        } = previous
        else {
            debug!(now, ?clock_instant, "Drift baseline recorded");
            return DriftOutcome::Baseline;
        };

        let delta = (now - last_check_wall_time).abs();
        if (delta - self.period).abs() <= self.tolerance {
            DriftOutcome::Steady
        } else {
            info!(
                delta,
                expected = self.period,
                ?clock_instant,
                "Clock drift detected, resyncing"
            );
            DriftOutcome::Drifted { delta }
        }
    }
}
