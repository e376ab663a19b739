use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Face ─────────────────────────────────────────────────────────

/// Axis-aligned rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from a detector's `[x, y, w, h]` array.
    pub fn from_array([x, y, width, height]: [f64; 4]) -> Self {
        Self::new(x, y, width, height)
    }

    /// Shift horizontally by `dx` pixels.
    pub fn offset_x(self, dx: f64) -> Self {
        Self {
            x: self.x + dx,
            ..self
        }
    }
}

/// Detector output for one video source at one sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    /// Width of the frame the boxes were detected in.
    pub frame_width: u32,
    pub frame_height: u32,
    pub boxes: Vec<BoundingBox>,
}

impl FaceObservation {
    pub fn face_count(&self) -> usize {
        self.boxes.len()
    }
}

/// All face observations produced by one FrameSampler tick.
///
/// Sources that were skipped during the tick (frame not ready, detector
/// busy or late) are simply absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceTick {
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub observations: Vec<FaceObservation>,
}

// ─── Audio & Focus ────────────────────────────────────────────────

/// One classified microphone reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioObservation {
    pub timestamp: DateTime<Utc>,
    /// Mean magnitude across the frequency-domain buffer.
    pub level: f64,
    /// Above threshold and outside the cooldown window.
    pub is_loud: bool,
    /// Above threshold but inside the cooldown window.
    pub suppressed: bool,
}

/// Emitted on every visibility transition, never polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusObservation {
    pub timestamp: DateTime<Utc>,
    pub is_visible: bool,
}

// ─── Source loss ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Camera,
    Microphone,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Microphone => "microphone",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Camera => "Camera",
            Self::Microphone => "Microphone",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media source could not be acquired and will never contribute again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLost {
    pub timestamp: DateTime<Utc>,
    pub device: DeviceKind,
    pub source_id: String,
    pub reason: String,
}

// ─── Observation ──────────────────────────────────────────────────

/// Everything the aggregator consumes. Each variant is applied atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "data", rename_all = "snake_case")]
pub enum Observation {
    Face(FaceTick),
    Audio(AudioObservation),
    Focus(FocusObservation),
    SourceLost(SourceLost),
}

impl Observation {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Face(tick) => tick.started_at,
            Self::Audio(obs) => obs.timestamp,
            Self::Focus(obs) => obs.timestamp,
            Self::SourceLost(lost) => lost.timestamp,
        }
    }

    pub fn signal_name(&self) -> &'static str {
        match self {
            Self::Face(_) => "face",
            Self::Audio(_) => "audio",
            Self::Focus(_) => "focus",
            Self::SourceLost(_) => "source_lost",
        }
    }
}

// ─── Status ───────────────────────────────────────────────────────

/// Unified malpractice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Ok,
    Alert,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Alert => "alert",
        }
    }

    /// Border colour a display uses for this status.
    pub fn colour(self) -> &'static str {
        match self {
            Self::Ok => "green",
            Self::Alert => "red",
        }
    }

    pub fn is_alert(self) -> bool {
        self == Self::Alert
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest classification of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Nominal,
    Anomalous,
}

impl Verdict {
    pub fn is_anomalous(self) -> bool {
        self == Self::Anomalous
    }

    /// Worst of two verdicts.
    pub fn worst(self, other: Self) -> Self {
        if self.is_anomalous() || other.is_anomalous() {
            Self::Anomalous
        } else {
            Self::Nominal
        }
    }
}

/// Per-signal inputs of the status fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalVerdicts {
    pub face: Verdict,
    pub audio: Verdict,
    pub focus: Verdict,
}

impl SignalVerdicts {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Verdict)> {
        [("face", self.face), ("audio", self.audio), ("focus", self.focus)].into_iter()
    }
}

/// Occurrence counters for face anomalies. Never decremented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    #[serde(rename = "no_face_count")]
    pub no_face: u64,
    #[serde(rename = "multi_face_count")]
    pub multi_face: u64,
}

impl Counters {
    pub fn total(&self) -> u64 {
        self.no_face + self.multi_face
    }
}

// ─── Audit log ────────────────────────────────────────────────────

/// What an audit log entry records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyKind {
    NoFace { source_id: String },
    MultipleFaces { source_id: String, count: usize },
    LoudNoise { level: f64 },
    TabSwitched,
    SourceLost { device: DeviceKind, source_id: String },
}

impl AnomalyKind {
    /// Whether this entry corresponds to a counter increment.
    pub fn is_face_anomaly(&self) -> bool {
        matches!(self, Self::NoFace { .. } | Self::MultipleFaces { .. })
    }

    fn describe(&self) -> String {
        match self {
            Self::NoFace { .. } => "No face detected".to_string(),
            Self::MultipleFaces { .. } => "Multiple faces detected".to_string(),
            Self::LoudNoise { .. } => "Loud noise detected".to_string(),
            Self::TabSwitched => "Tab switched".to_string(),
            Self::SourceLost { device, source_id } => {
                format!("{} {source_id} unavailable", device.label())
            }
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: AnomalyKind,
    pub message: String,
}

impl LogEntry {
    pub fn new(kind: AnomalyKind, timestamp: DateTime<Utc>) -> Self {
        let message = format!("{} at {}", kind.describe(), format_clock(timestamp));
        Self {
            timestamp,
            kind,
            message,
        }
    }
}

/// Wall-clock rendering used in log messages.
pub fn format_clock(ts: DateTime<Utc>) -> String {
    ts.format("%H:%M:%S").to_string()
}

// ─── Tests ────────────────────────────────────────────────────────
