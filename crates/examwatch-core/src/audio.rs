//! Loudness classification with a refractory window.
//!
//! A reading is loud when its level exceeds the threshold and no trigger
//! happened within the last `cooldown`. Triggering (re)starts the window, so
//! a sustained sound logs once per window instead of once per sample.

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::MonitorConfig;
use crate::types::AudioObservation;

/// Mean magnitude of a byte frequency-domain buffer. Empty buffers are silent.
pub fn mean_magnitude(bins: &[u8]) -> f64 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| u64::from(b)).sum();
    sum as f64 / bins.len() as f64
}

/// Threshold + cooldown classifier for microphone levels.
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessClassifier {
    threshold: f64,
    cooldown: TimeDelta,
    cooldown_until: Option<DateTime<Utc>>,
}

impl LoudnessClassifier {
    pub fn new(threshold: f64, cooldown_ms: u64) -> Self {
        let cooldown_ms = i64::try_from(cooldown_ms).unwrap_or(i64::MAX);
        Self {
            threshold,
            cooldown: TimeDelta::try_milliseconds(cooldown_ms).unwrap_or(TimeDelta::MAX),
            cooldown_until: None,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.loud_threshold, config.audio_cooldown_ms)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether `now` falls inside the window opened by the last trigger.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Classify one reading taken at `now`.
    pub fn classify(&mut self, level: f64, now: DateTime<Utc>) -> AudioObservation {
        let above = level > self.threshold;
        let cooling = self.in_cooldown(now);
        let is_loud = above && !cooling;

        if is_loud {
            self.cooldown_until = Some(
                now.checked_add_signed(self.cooldown)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
        }

        AudioObservation {
            timestamp: now,
            level,
            is_loud,
            suppressed: above && cooling,
        }
    }

    /// Classify a raw frequency buffer.
    pub fn classify_bins(&mut self, bins: &[u8], now: DateTime<Utc>) -> AudioObservation {
        self.classify(mean_magnitude(bins), now)
    }
}

// ─── Tests ───────────────────────────────────────────────────────
