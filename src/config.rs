//! Engine tunables, optionally overridden from `~/.config/capsync/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::position::PlatformProfile;

/// How often the caption document is refetched.
pub const FETCH_PERIOD_SECS: f64 = 5.0;
/// How often the drift detector runs.
pub const DRIFT_PERIOD_SECS: f64 = 3.0;
/// Allowed deviation from `DRIFT_PERIOD_SECS` between two checks.
pub const DRIFT_TOLERANCE_SECS: f64 = 0.5;
/// Pull-mode clock polling rate.
pub const CLOCK_POLL_HZ: f64 = 30.0;
/// Minimum clock movement that counts as a new instant.
pub const CLOCK_DEAD_BAND_SECS: f64 = 0.05;
/// Subtracted from every instant before resolving; reserved for lip-sync.
pub const RENDER_DELAY_SECS: f64 = 0.0;

/// Shortest timer period accepted for any periodic task.
pub const MIN_PERIOD_SECS: f64 = 0.001;
/// Longest timer period accepted for any periodic task.
pub const MAX_PERIOD_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fetch_period_secs: f64,
    pub drift_period_secs: f64,
    pub drift_tolerance_secs: f64,
    pub clock_poll_hz: f64,
    pub clock_dead_band_secs: f64,
    pub render_delay_secs: f64,
    pub platform: PlatformProfile,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_period_secs: FETCH_PERIOD_SECS,
            drift_period_secs: DRIFT_PERIOD_SECS,
            drift_tolerance_secs: DRIFT_TOLERANCE_SECS,
            clock_poll_hz: CLOCK_POLL_HZ,
            clock_dead_band_secs: CLOCK_DEAD_BAND_SECS,
            render_delay_secs: RENDER_DELAY_SECS,
            platform: PlatformProfile::default(),
        }
    }
}

impl EngineConfig {
    /// Load from the user config file.
    ///
    /// Returns the defaults if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("fetch_period_secs", self.fetch_period_secs),
            ("drift_period_secs", self.drift_period_secs),
            ("clock_poll_hz", self.clock_poll_hz),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("{name} must be positive, got {value}");
            }
        }
        for (name, secs) in [
            ("fetch_period_secs", self.fetch_period_secs),
            ("drift_period_secs", self.drift_period_secs),
            ("clock_poll_hz", 1.0 / self.clock_poll_hz),
        ] {
            if !(MIN_PERIOD_SECS..=MAX_PERIOD_SECS).contains(&secs) {
                bail!("{name} gives a period of {secs}s, outside {MIN_PERIOD_SECS}s..={MAX_PERIOD_SECS}s");
            }
        }
        for (name, value) in [
            ("drift_tolerance_secs", self.drift_tolerance_secs),
            ("clock_dead_band_secs", self.clock_dead_band_secs),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                bail!("{name} must not be negative, got {value}");
            }
        }
        if !self.render_delay_secs.is_finite() {
            bail!("render_delay_secs must be finite");
        }
        Ok(())
    }

    #[must_use]
    pub fn fetch_period(&self) -> Duration {
        period(self.fetch_period_secs, FETCH_PERIOD_SECS)
    }

    #[must_use]
    pub fn drift_period(&self) -> Duration {
        period(self.drift_period_secs, DRIFT_PERIOD_SECS)
    }

    #[must_use]
    pub fn clock_poll_period(&self) -> Duration {
        period(1.0 / self.clock_poll_hz, 1.0 / CLOCK_POLL_HZ)
    }
}

/// Timer period for `secs`, kept within the accepted bounds even for a
/// config that skipped `validate`. Non-numbers fall back to `default`.
fn period(secs: f64, default: f64) -> Duration {
    let secs = if secs.is_nan() { default } else { secs };
    Duration::from_secs_f64(secs.clamp(MIN_PERIOD_SECS, MAX_PERIOD_SECS))
}

/// Return the path to the config file.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("capsync")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.fetch_period(), Duration::from_secs(5));
        assert_eq!(config.drift_period(), Duration::from_secs(3));
    }

    #[test]
    fn parse_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
fetch_period_secs = 2.0
platform = "tv"
"#,
        )
        .unwrap();
        assert_eq!(config.fetch_period_secs, 2.0);
        assert_eq!(config.platform, PlatformProfile::Tv);
        assert_eq!(config.drift_tolerance_secs, DRIFT_TOLERANCE_SECS);
    }

    #[test]
    fn reject_invalid_values() {
        assert!(EngineConfig::from_toml_str("fetch_period_secs = 0.0").is_err());
        assert!(EngineConfig::from_toml_str("clock_poll_hz = -30.0").is_err());
        assert!(EngineConfig::from_toml_str("drift_tolerance_secs = -0.1").is_err());
        assert!(EngineConfig::from_toml_str("platform = \"watch\"").is_err());
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "drift_period_secs = \"soon\"").unwrap();
        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn reject_periods_timers_cannot_run() {
        let err = EngineConfig::from_toml_str("clock_poll_hz = 1e12").unwrap_err();
        assert!(err.to_string().contains("clock_poll_hz"));
        assert!(EngineConfig::from_toml_str("fetch_period_secs = 1e300").is_err());
        assert!(EngineConfig::from_toml_str("drift_period_secs = 0.0001").is_err());

        // Both ends of the accepted range are fine
        assert!(EngineConfig::from_toml_str("clock_poll_hz = 1000.0").is_ok());
        assert!(EngineConfig::from_toml_str("fetch_period_secs = 86400.0").is_ok());
    }

    #[test]
    fn unvalidated_periods_are_clamped() {
        let config = EngineConfig {
            fetch_period_secs: 1e300,
            drift_period_secs: f64::NAN,
            clock_poll_hz: 1e12,
            ..EngineConfig::default()
        };
        assert_eq!(config.fetch_period(), Duration::from_secs(86_400));
        assert_eq!(config.drift_period(), Duration::from_secs(3));
        assert_eq!(config.clock_poll_period(), Duration::from_millis(1));
    }

    #[test]
    fn poll_period_from_rate() {
        let config = EngineConfig::default();
        let period = config.clock_poll_period();
        assert!(period > Duration::from_millis(33) && period < Duration::from_millis(34));
    }
}
