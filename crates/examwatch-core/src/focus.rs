use chrono::{DateTime, Utc};

use crate::types::FocusObservation;

/// Turns raw host visibility notifications into transition-only observations.
///
/// Starts visible. Repeated notifications of the current state are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTracker {
    visible: bool,
}

impl Default for FocusTracker {
    fn default() -> Self {
        Self { visible: true }
    }
}

impl FocusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Feed a host notification. Returns an observation only on transition.
    pub fn observe(&mut self, visible: bool, now: DateTime<Utc>) -> Option<FocusObservation> {
        if visible == self.visible {
            return None;
        }
        self.visible = visible;
        Some(FocusObservation {
            timestamp: now,
            is_visible: visible,
        })
    }
}
