//! Face-count classification and overlay placement on the combined canvas.
//!
//! Sources are laid out left to right in registration order. A source's
//! slot starts at the sum of the widths of every source registered before
//! it, using the latest frame width each source reported.

use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, FaceObservation, Verdict};

/// Classification of a single face observation. Total over box counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceClass {
    NoFace,
    Single,
    Multiple(usize),
}

impl FaceClass {
    pub fn of(observation: &FaceObservation) -> Self {
        match observation.face_count() {
            0 => Self::NoFace,
            1 => Self::Single,
            n => Self::Multiple(n),
        }
    }

    pub fn verdict(self) -> Verdict {
        match self {
            Self::Single => Verdict::Nominal,
            Self::NoFace | Self::Multiple(_) => Verdict::Anomalous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Nominal,
    Anomalous,
}

impl OverlayKind {
    pub fn colour(self) -> &'static str {
        match self {
            Self::Nominal => "green",
            Self::Anomalous => "red",
        }
    }
}

/// A rectangle to stroke on the combined canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub source_id: String,
    pub rect: BoundingBox,
    pub kind: OverlayKind,
}

/// Overlay rectangles for one observation, shifted into its canvas slot.
///
/// No-face observations produce nothing to draw.
pub fn overlays_for(observation: &FaceObservation, offset_x: f64) -> Vec<Overlay> {
    let kind = match FaceClass::of(observation) {
        FaceClass::NoFace => return Vec::new(),
        FaceClass::Single => OverlayKind::Nominal,
        FaceClass::Multiple(_) => OverlayKind::Anomalous,
    };
    observation
        .boxes
        .iter()
        .map(|b| Overlay {
            source_id: observation.source_id.clone(),
            rect: b.offset_x(offset_x),
            kind,
        })
        .collect()
}

// ─── Canvas layout ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Slot {
    source_id: String,
    width: u32,
    height: u32,
}

/// Combined canvas dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

/// Left-to-right slot layout of all registered video sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanvasLayout {
    slots: Vec<Slot>,
}

impl CanvasLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source at the right end. Re-registering is a no-op.
    pub fn register(&mut self, source_id: &str) {
        if self.position(source_id).is_none() {
            self.slots.push(Slot {
                source_id: source_id.to_string(),
                width: 0,
                height: 0,
            });
        }
    }

    /// Record the latest frame size of a source, registering it if unknown.
    pub fn record_frame(&mut self, source_id: &str, width: u32, height: u32) {
        self.register(source_id);
        if let Some(slot) = self.slots.iter_mut().find(|s| s.source_id == source_id) {
            slot.width = width;
            slot.height = height;
        }
    }

    /// Horizontal offset of a source's slot, `None` if unregistered.
    pub fn offset_of(&self, source_id: &str) -> Option<f64> {
        let idx = self.position(source_id)?;
        Some(
            self.slots[..idx]
                .iter()
                .map(|s| f64::from(s.width))
                .sum(),
        )
    }

    pub fn size(&self) -> CanvasSize {
        CanvasSize {
            width: self.slots.iter().map(|s| s.width).sum(),
            height: self.slots.iter().map(|s| s.height).max().unwrap_or(0),
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.source_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn position(&self, source_id: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.source_id == source_id)
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn obs(source: &str, width: u32, boxes: &[[f64; 4]]) -> FaceObservation {
        FaceObservation {
            source_id: source.into(),
            timestamp: DateTime::<Utc>::from_timestamp(0, 0).expect("epoch"),
            frame_width: width,
            frame_height: 480,
            boxes: boxes.iter().copied().map(BoundingBox::from_array).collect(),
        }
    }

    #[test]
    fn classification_is_total_over_box_counts() {
        assert_eq!(FaceClass::of(&obs("a", 640, &[])), FaceClass::NoFace);
        assert_eq!(
            FaceClass::of(&obs("a", 640, &[[0.0, 0.0, 1.0, 1.0]])),
            FaceClass::Single
        );
        assert_eq!(
            FaceClass::of(&obs(
                "a",
                640,
                &[[0.0, 0.0, 1.0, 1.0], [2.0, 0.0, 1.0, 1.0], [4.0, 0.0, 1.0, 1.0]]
            )),
            FaceClass::Multiple(3)
        );
        assert_eq!(FaceClass::Single.verdict(), Verdict::Nominal);
        assert_eq!(FaceClass::NoFace.verdict(), Verdict::Anomalous);
        assert_eq!(FaceClass::Multiple(2).verdict(), Verdict::Anomalous);
    }

    #[test]
    fn layout_offsets_follow_registration_order() {
        let mut layout = CanvasLayout::new();
        layout.register("local");
        layout.register("ipcam");
        layout.register("local");
        assert_eq!(layout.len(), 2);

        layout.record_frame("ipcam", 320, 240);
        // local has not produced a frame yet: zero width
        assert_eq!(layout.offset_of("ipcam"), Some(0.0));

        layout.record_frame("local", 640, 480);
        assert_eq!(layout.offset_of("local"), Some(0.0));
        assert_eq!(layout.offset_of("ipcam"), Some(640.0));
        assert_eq!(layout.offset_of("unknown"), None);
        assert_eq!(
            layout.size(),
            CanvasSize {
                width: 960,
                height: 480
            }
        );
        assert_eq!(layout.sources().collect::<Vec<_>>(), vec!["local", "ipcam"]);
    }

    #[test]
    fn multi_face_overlays_are_anomalous_and_offset() {
        let o = obs("ipcam", 320, &[[10.0, 5.0, 50.0, 60.0], [100.0, 5.0, 40.0, 40.0]]);
        let overlays = overlays_for(&o, 640.0);
        assert_eq!(overlays.len(), 2);
        assert!(overlays.iter().all(|ov| ov.kind == OverlayKind::Anomalous));
        assert_eq!(overlays[0].rect.x, 650.0);
        assert_eq!(overlays[1].rect.x, 740.0);
        assert_eq!(overlays[1].rect.y, 5.0);
    }

    #[test]
    fn single_face_overlay_is_nominal_and_no_face_draws_nothing() {
        let single = overlays_for(&obs("local", 640, &[[1.0, 2.0, 3.0, 4.0]]), 0.0);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].kind.colour(), "green");
        assert_eq!(single[0].rect, BoundingBox::new(1.0, 2.0, 3.0, 4.0));

        assert!(overlays_for(&obs("local", 640, &[]), 0.0).is_empty());
    }
}
