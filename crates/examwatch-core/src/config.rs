use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Sampling cadence and classification parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// FrameSampler period in milliseconds.
    pub face_interval_ms: u64,
    /// AudioLevelMonitor period in milliseconds.
    pub audio_interval_ms: u64,
    /// Mean byte magnitude above which a reading is loud.
    pub loud_threshold: f64,
    /// Refractory window after a loud trigger, in milliseconds.
    pub audio_cooldown_ms: u64,
    /// Analyzer FFT size; the frequency buffer holds `fft_size / 2` bins.
    pub fft_size: usize,
    /// Upper bound on one detector call. Defaults to the face interval.
    pub detector_timeout_ms: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            face_interval_ms: 2000,
            audio_interval_ms: 500,
            loud_threshold: 24.0,
            audio_cooldown_ms: 1000,
            fft_size: 512,
            detector_timeout_ms: None,
        }
    }
}

impl MonitorConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.face_interval_ms == 0 {
            return Err(ConfigError::Invalid("face_interval_ms must be > 0".into()));
        }
        if self.audio_interval_ms == 0 {
            return Err(ConfigError::Invalid("audio_interval_ms must be > 0".into()));
        }
        if !(self.loud_threshold.is_finite() && self.loud_threshold > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "loud_threshold must be a positive number, got {}",
                self.loud_threshold
            )));
        }
        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(ConfigError::Invalid(format!(
                "fft_size must be a power of two in 32..=32768, got {}",
                self.fft_size
            )));
        }
        if self.detector_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "detector_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn face_interval(&self) -> Duration {
        Duration::from_millis(self.face_interval_ms)
    }

    pub fn audio_interval(&self) -> Duration {
        Duration::from_millis(self.audio_interval_ms)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.detector_timeout_ms.unwrap_or(self.face_interval_ms))
    }

    /// Number of bins in the analyzer's frequency buffer.
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }
}
