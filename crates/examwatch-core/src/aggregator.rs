//! Anomaly aggregator: folds face, audio and focus observations into one
//! status, an append-only audit log and face-anomaly counters.
//!
//! Status is never stored. Each signal keeps only its latest verdict and the
//! unified status is the fold of those verdicts:
//!
//! - **Face**: replaced on every non-empty face tick by the worst verdict of
//!   that tick (worst-of-tick, not worst-ever). Empty ticks leave it as is.
//! - **Audio**: anomalous on a loud trigger, nominal on a quiet reading,
//!   untouched by readings suppressed by the cooldown.
//! - **Focus**: anomalous while the tab is hidden.
//!
//! Every counter increment appends exactly one log entry carrying the same
//! timestamp as the observation that caused it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::face::{CanvasLayout, CanvasSize, FaceClass, Overlay, overlays_for};
use crate::types::{
    AnomalyKind, AudioObservation, Counters, FaceObservation, FaceTick, FocusObservation,
    LogEntry, Observation, SignalVerdicts, SourceLost, Status, Verdict,
};

// ─── Folds ───────────────────────────────────────────────────────

/// Unified status: alert if any signal's latest verdict is anomalous.
pub fn fold_status(signals: &SignalVerdicts) -> Status {
    if signals.iter().any(|(_, v)| v.is_anomalous()) {
        Status::Alert
    } else {
        Status::Ok
    }
}

/// Worst verdict across one tick's face observations, `None` for an empty tick.
pub fn fold_face_tick(observations: &[FaceObservation]) -> Option<Verdict> {
    observations
        .iter()
        .map(|o| FaceClass::of(o).verdict())
        .reduce(Verdict::worst)
}

// ─── Audit log ───────────────────────────────────────────────────

/// Append-only, insertion-ordered log. Entries are never mutated or removed.
///
/// Storage is shared with published snapshots; an append copies it only while
/// an older snapshot still holds it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditLog {
    entries: Arc<Vec<LogEntry>>,
}

impl AuditLog {
    fn append(&mut self, entry: LogEntry) {
        Arc::make_mut(&mut self.entries).push(entry);
    }

    /// Shared handle to the current entries.
    pub fn shared(&self) -> Arc<Vec<LogEntry>> {
        Arc::clone(&self.entries)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries appended at or after index `start`.
    pub fn since(&self, start: usize) -> &[LogEntry] {
        self.entries.get(start..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that correspond to a counter increment.
    pub fn face_anomaly_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind.is_face_anomaly())
            .count()
    }
}

// ─── Snapshot ────────────────────────────────────────────────────

/// Read-only view handed to status sinks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Number of observations applied so far.
    pub version: u64,
    pub status: Status,
    pub counters: Counters,
    pub signals: SignalVerdicts,
    /// Overlays of the latest non-empty face tick.
    pub overlays: Vec<Overlay>,
    pub canvas: CanvasSize,
    pub log: Arc<Vec<LogEntry>>,
}

impl StatusSnapshot {
    pub fn colour(&self) -> &'static str {
        self.status.colour()
    }
}

/// Result of applying one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub previous: Status,
    pub status: Status,
    pub appended: Vec<LogEntry>,
}

impl Applied {
    pub fn changed(&self) -> bool {
        self.previous != self.status
    }
}

// ─── Aggregator ──────────────────────────────────────────────────

/// Owns all mutable proctoring state. One instance per session.
#[derive(Debug, Clone, Default)]
pub struct AnomalyAggregator {
    signals: SignalVerdicts,
    counters: Counters,
    log: AuditLog,
    overlays: Vec<Overlay>,
    layout: CanvasLayout,
    version: u64,
}

impl AnomalyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an aggregator with video sources registered left to right.
    pub fn with_sources<I, S>(source_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut agg = Self::new();
        for id in source_ids {
            agg.layout.register(id.as_ref());
        }
        agg
    }

    /// Apply one observation atomically.
    pub fn apply(&mut self, observation: &Observation) -> Applied {
        let previous = self.status();
        let log_start = self.log.len();

        match observation {
            Observation::Face(tick) => self.apply_face_tick(tick),
            Observation::Audio(obs) => self.apply_audio(obs),
            Observation::Focus(obs) => self.apply_focus(obs),
            Observation::SourceLost(lost) => self.apply_source_lost(lost),
        }
        self.version += 1;

        Applied {
            previous,
            status: self.status(),
            appended: self.log.since(log_start).to_vec(),
        }
    }

    fn apply_face_tick(&mut self, tick: &FaceTick) {
        let Some(verdict) = fold_face_tick(&tick.observations) else {
            return;
        };

        // Slot offsets use this tick's frame widths.
        for obs in &tick.observations {
            self.layout
                .record_frame(&obs.source_id, obs.frame_width, obs.frame_height);
        }

        let mut overlays = Vec::new();
        for obs in &tick.observations {
            match FaceClass::of(obs) {
                FaceClass::NoFace => {
                    self.counters.no_face += 1;
                    self.record(
                        AnomalyKind::NoFace {
                            source_id: obs.source_id.clone(),
                        },
                        obs,
                    );
                }
                FaceClass::Multiple(count) => {
                    self.counters.multi_face += 1;
                    self.record(
                        AnomalyKind::MultipleFaces {
                            source_id: obs.source_id.clone(),
                            count,
                        },
                        obs,
                    );
                }
                FaceClass::Single => {}
            }
            let offset = self.layout.offset_of(&obs.source_id).unwrap_or(0.0);
            overlays.extend(overlays_for(obs, offset));
        }

        self.overlays = overlays;
        self.signals.face = verdict;
    }

    fn apply_audio(&mut self, obs: &AudioObservation) {
        if obs.is_loud {
            self.log.append(LogEntry::new(
                AnomalyKind::LoudNoise { level: obs.level },
                obs.timestamp,
            ));
            self.signals.audio = Verdict::Anomalous;
        } else if !obs.suppressed {
            self.signals.audio = Verdict::Nominal;
        }
    }

    fn apply_focus(&mut self, obs: &FocusObservation) {
        if obs.is_visible {
            self.signals.focus = Verdict::Nominal;
        } else {
            self.log
                .append(LogEntry::new(AnomalyKind::TabSwitched, obs.timestamp));
            self.signals.focus = Verdict::Anomalous;
        }
    }

    fn apply_source_lost(&mut self, lost: &SourceLost) {
        self.log.append(LogEntry::new(
            AnomalyKind::SourceLost {
                device: lost.device,
                source_id: lost.source_id.clone(),
            },
            lost.timestamp,
        ));
    }

    fn record(&mut self, kind: AnomalyKind, obs: &FaceObservation) {
        self.log.append(LogEntry::new(kind, obs.timestamp));
    }

    pub fn status(&self) -> Status {
        fold_status(&self.signals)
    }

    pub fn signals(&self) -> SignalVerdicts {
        self.signals
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn log(&self) -> &AuditLog {
        &self.log
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn layout(&self) -> &CanvasLayout {
        &self.layout
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            version: self.version,
            status: self.status(),
            counters: self.counters,
            signals: self.signals,
            overlays: self.overlays.clone(),
            canvas: self.layout.size(),
            log: self.log.shared(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
