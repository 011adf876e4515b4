//! Active cue resolution
//!
//! Finds the cues whose `[start, end)` contains an instant. The scan stops
//! at the first cue starting after the instant, which is only correct because
//! a [`CueSet`] is ordered by start time.

use crate::cue::{Cue, CueSet};

/// Shift a clock reading into cue time.
#[must_use]
pub fn adjusted_instant(clock_instant: f64, time_offset: f64, render_delay: f64) -> f64 {
    clock_instant + time_offset - render_delay
}

/// Every cue active at `instant`, in document order.
#[must_use]
pub fn active_cues(cues: &CueSet, instant: f64) -> Vec<Cue> {
    let mut active = Vec::new();
    for cue in cues {
        if cue.start_time > instant {
            break;
        }
        if cue.contains(instant) {
            active.push(cue.clone());
        }
    }
    active
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResolveKey {
    instant_bits: u64,
    generation: u64,
    revision: u64,
}

/// Memoizing resolver.
///
/// The key is (instant, generation, cue set revision). Bumping the generation
/// forces a fresh scan even when the instant is unchanged.
#[derive(Debug, Default)]
pub struct CueResolver {
    key: Option<ResolveKey>,
    active: Vec<Cue>,
    evaluations: u64,
}

impl CueResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-resolve if the key changed. Returns `true` when the active cues
    /// differ from the previous result.
    pub fn resolve(&mut self, cues: &CueSet, revision: u64, instant: f64, generation: u64) -> bool {
        let key = ResolveKey {
            instant_bits: instant.to_bits(),
            generation,
            revision,
        };
        if self.key == Some(key) {
            return false;
        }

        self.key = Some(key);
        self.evaluations += 1;
        let active = active_cues(cues, instant);
        if active == self.active {
            return false;
        }
        self.active = active;
        true
    }

    #[must_use]
    pub fn active(&self) -> &[Cue] {
        &self.active
    }

    /// Number of scans actually performed.
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Forget the cached key and result. Returns `true` if cues were showing.
    pub fn clear(&mut self) -> bool {
        self.key = None;
        !std::mem::take(&mut self.active).is_empty()
    }
}
