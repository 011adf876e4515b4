//! Caption anchor positioning
//!
//! Computes how far above the container's bottom edge captions sit. Three
//! things move the anchor: the platform's base padding, playback controls
//! that are currently on screen (landscape), and the letterbox band under the
//! video (portrait).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Width and height in layout units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// `width / height`, or `None` for degenerate sizes.
    #[must_use]
    pub fn aspect(&self) -> Option<f64> {
        let known = self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite();
        known.then(|| self.width / self.height)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = String;

    /// `1920x1080`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = w.trim().parse().map_err(|_| format!("invalid width '{w}'"))?;
        let height = h.trim().parse().map_err(|_| format!("invalid height '{h}'"))?;
        Ok(Self { width, height })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    #[default]
    Landscape,
}

impl Orientation {
    /// Landscape unless the container is strictly taller than wide.
    #[must_use]
    pub fn of(container: Size) -> Self {
        if container.height > container.width {
            Self::Portrait
        } else {
            Self::Landscape
        }
    }
}

/// Composition of a platform's playback control bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlBarMetrics {
    /// Icon edge length
    pub icon_size: f64,
    /// Padding around each icon, applied above and below
    pub inner_padding: f64,
    /// Stacked control rows (e.g. scrubber + buttons)
    pub rows: u32,
    /// Gap between the bar and the container edge
    pub outer_margin: f64,
}

impl ControlBarMetrics {
    /// Vertical space the bar occupies while visible.
    #[must_use]
    pub fn reserved_height(&self) -> f64 {
        f64::from(self.rows) * (self.icon_size + 2.0 * self.inner_padding) + self.outer_margin
    }
}

/// Layout family the overlay is running on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformProfile {
    #[default]
    Phone,
    Tablet,
    Desktop,
    Tv,
}

impl PlatformProfile {
    /// Distance from the bottom edge when nothing else is in the way.
    #[must_use]
    pub fn base_padding(&self) -> f64 {
        match self {
            Self::Phone => 24.0,
            Self::Tablet => 32.0,
            Self::Desktop => 40.0,
            Self::Tv => 64.0,
        }
    }

    #[must_use]
    pub fn control_bar(&self) -> ControlBarMetrics {
        match self {
            Self::Phone => ControlBarMetrics {
                icon_size: 24.0,
                inner_padding: 12.0,
                rows: 2,
                outer_margin: 16.0,
            },
            Self::Tablet => ControlBarMetrics {
                icon_size: 28.0,
                inner_padding: 14.0,
                rows: 2,
                outer_margin: 20.0,
            },
            Self::Desktop => ControlBarMetrics {
                icon_size: 24.0,
                inner_padding: 8.0,
                rows: 1,
                outer_margin: 24.0,
            },
            Self::Tv => ControlBarMetrics {
                icon_size: 48.0,
                inner_padding: 16.0,
                rows: 2,
                outer_margin: 48.0,
            },
        }
    }

    #[must_use]
    pub fn chrome_reserved_height(&self) -> f64 {
        self.control_bar().reserved_height()
    }
}

impl FromStr for PlatformProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "phone" => Ok(Self::Phone),
            "tablet" => Ok(Self::Tablet),
            "desktop" => Ok(Self::Desktop),
            "tv" => Ok(Self::Tv),
            other => Err(format!("unknown platform '{other}' (phone, tablet, desktop, tv)")),
        }
    }
}

/// Caption anchor distance from the container's bottom edge.
///
/// `video` is the natural video size and stays `None` until the host reports
/// it; until then only the base padding applies.
#[must_use]
pub fn anchor_offset(
    container: Size,
    video: Option<Size>,
    orientation: Orientation,
    chrome_visible: bool,
    profile: PlatformProfile,
) -> f64 {
    let base = profile.base_padding();

    match orientation {
        Orientation::Landscape if chrome_visible => base + profile.chrome_reserved_height(),
        Orientation::Landscape => base,
        Orientation::Portrait => letterbox_band(container, video).map_or(base, |band| band + base),
    }
}

/// Height of the band below a video that is proportionally wider than its
/// container, or `None` if there is no such band or geometry is unknown.
fn letterbox_band(container: Size, video: Option<Size>) -> Option<f64> {
    let container_aspect = container.aspect()?;
    let video_aspect = video?.aspect()?;
    if video_aspect <= container_aspect {
        return None;
    }

    let rendered_height = container.width / video_aspect;
    Some((container.height - rendered_height) / 2.0)
}
