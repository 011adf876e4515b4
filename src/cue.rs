//! Caption cue data model
//!
//! Cues are produced by the [`parser`](crate::parser) and never mutated
//! afterwards. A [`CueSet`] keeps them in ascending start order.

use serde::{Deserialize, Serialize};

/// A run of cue text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledSegment {
    /// Segment text with tags stripped and entities decoded
    pub text: String,
    /// Whether the run was inside an italic tag
    pub italic: bool,
}

impl StyledSegment {
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            italic: false,
        }
    }

    #[must_use]
    pub fn italic(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            italic: true,
        }
    }
}

/// One timed caption entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds (exclusive)
    pub end_time: f64,
    /// Text with all markup removed
    pub plain_text: String,
    /// Styled runs; their concatenation equals `plain_text`
    pub segments: Vec<StyledSegment>,
}

impl Cue {
    /// Whether `instant` falls in `[start_time, end_time)`.
    #[must_use]
    pub fn contains(&self, instant: f64) -> bool {
        self.start_time <= instant && instant < self.end_time
    }

    /// Duration in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Time span covered by the currently known cues.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvailableRange {
    pub min_time: f64,
    pub max_time: f64,
}

impl AvailableRange {
    #[must_use]
    pub fn contains(&self, instant: f64) -> bool {
        self.min_time <= instant && instant <= self.max_time
    }
}

/// Cues in ascending `start_time` order.
///
/// The order is inherited from the source document, which is append-only and
/// temporally ordered. It is not re-sorted here; the resolver's early exit
/// depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CueSet {
    cues: Vec<Cue>,
}

impl CueSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cue> {
        self.cues.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Cue] {
        &self.cues
    }

    /// `(first.start_time, last.end_time)`, or `None` when empty.
    #[must_use]
    pub fn available_range(&self) -> Option<AvailableRange> {
        let first = self.cues.first()?;
        let last = self.cues.last()?;
        Some(AvailableRange {
            min_time: first.start_time,
            max_time: last.end_time,
        })
    }

    pub(crate) fn push(&mut self, cue: Cue) {
        self.cues.push(cue);
    }
}

impl From<Vec<Cue>> for CueSet {
    fn from(cues: Vec<Cue>) -> Self {
        Self { cues }
    }
}

impl<'a> IntoIterator for &'a CueSet {
    type Item = &'a Cue;
    type IntoIter = std::slice::Iter<'a, Cue>;

    fn into_iter(self) -> Self::IntoIter {
        self.cues.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start: f64, end: f64, text: &str) -> Cue {
        Cue {
            start_time: start,
            end_time: end,
            plain_text: text.to_string(),
            segments: vec![StyledSegment::plain(text)],
        }
    }

    #[test]
    fn test_contains_is_half_open() {
        let c = cue(1.0, 3.0, "Hello");
        assert!(c.contains(1.0));
        assert!(c.contains(2.999));
        assert!(!c.contains(3.0));
        assert!(!c.contains(0.5));
    }

    #[test]
    fn test_available_range() {
        assert_eq!(CueSet::new().available_range(), None);

        let set = CueSet::from(vec![cue(1.0, 3.0, "a"), cue(3.5, 5.0, "b")]);
        let range = set.available_range().unwrap();
        assert_eq!(range.min_time, 1.0);
        assert_eq!(range.max_time, 5.0);
        assert!(range.contains(4.0));
        assert!(!range.contains(5.5));
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let set = CueSet::from(vec![cue(0.0, 1.0, "x")]);
        let json = serde_json::to_value(&set).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["plain_text"], "x");
    }
}
