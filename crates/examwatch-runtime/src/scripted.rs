//! Scripted collaborators: drive a full session from a JSON scenario file
//! instead of real hardware.
//!
//! ```json
//! {
//!   "name": "two cameras",
//!   "duration_ms": 6000,
//!   "detector_warmup_ms": 500,
//!   "cameras": [
//!     { "id": "local", "width": 640, "height": 480,
//!       "frames": [[[10, 10, 50, 50]], []] }
//!   ],
//!   "microphone": { "levels": [5, 5, 80, 80, 5] },
//!   "visibility": [{ "at_ms": 3000, "visible": false }]
//! }
//! ```
//!
//! Each camera cycles through its `frames` (one box list per sampled frame);
//! the microphone cycles through `levels` (one mean magnitude per reading).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::focus_monitor::Visibility;
use crate::media::{
    Detection, DetectorError, FaceDetector, MediaDevice, MediaError, Microphone, VideoFrame,
    VideoSource,
};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scenario parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid scenario: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioFile {
    #[serde(default)]
    pub name: String,
    /// Session length. `None` runs until interrupted.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Time before the detector reports ready.
    #[serde(default)]
    pub detector_warmup_ms: u64,
    #[serde(default)]
    pub cameras: Vec<CameraScript>,
    #[serde(default)]
    pub microphone: Option<MicrophoneScript>,
    #[serde(default)]
    pub visibility: Vec<VisibilityStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraScript {
    pub id: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Acquisition fails with permission denied.
    #[serde(default)]
    pub unavailable: bool,
    /// Boxes `[x, y, width, height]` per frame, cycled.
    #[serde(default)]
    pub frames: Vec<Vec<[f64; 4]>>,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MicrophoneScript {
    #[serde(default)]
    pub unavailable: bool,
    /// Mean magnitude per reading, cycled. Empty means silence.
    #[serde(default)]
    pub levels: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VisibilityStep {
    pub at_ms: u64,
    pub visible: bool,
}

impl ScenarioFile {
    pub fn from_json(s: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_json::from_str(s)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        let mut seen = HashSet::new();
        for cam in &self.cameras {
            if cam.id.is_empty() {
                return Err(ScenarioError::Invalid("camera id must not be empty".into()));
            }
            if !seen.insert(cam.id.as_str()) {
                return Err(ScenarioError::Invalid(format!(
                    "duplicate camera id {:?}",
                    cam.id
                )));
            }
            if cam.width == 0 || cam.height == 0 {
                return Err(ScenarioError::Invalid(format!(
                    "camera {:?} has a zero frame dimension",
                    cam.id
                )));
            }
        }
        if self
            .visibility
            .windows(2)
            .any(|w| w[1].at_ms < w[0].at_ms)
        {
            return Err(ScenarioError::Invalid(
                "visibility steps must be in time order".into(),
            ));
        }
        Ok(())
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }

    pub fn cameras(&self) -> Vec<Box<dyn VideoSource>> {
        self.cameras
            .iter()
            .map(|c| Box::new(ScriptedCamera::new(c)) as Box<dyn VideoSource>)
            .collect()
    }

    pub fn detector(&self) -> ScriptedDetector {
        ScriptedDetector::new(
            self.cameras
                .iter()
                .map(|c| (c.id.clone(), c.frames.clone())),
            Duration::from_millis(self.detector_warmup_ms),
        )
    }

    pub fn microphone(&self) -> Option<ScriptedMicrophone> {
        self.microphone.as_ref().map(ScriptedMicrophone::new)
    }
}

// ─── Collaborators ───────────────────────────────────────────────

pub struct ScriptedCamera {
    id: String,
    width: u32,
    height: u32,
    unavailable: bool,
    acquired: bool,
    seq: u64,
}

impl ScriptedCamera {
    pub fn new(script: &CameraScript) -> Self {
        Self {
            id: script.id.clone(),
            width: script.width,
            height: script.height,
            unavailable: script.unavailable,
            acquired: false,
            seq: 0,
        }
    }
}

impl MediaDevice for ScriptedCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn acquire(&mut self) -> Result<(), MediaError> {
        if self.unavailable {
            return Err(MediaError::Denied);
        }
        self.acquired = true;
        Ok(())
    }

    fn release(&mut self) {
        self.acquired = false;
    }
}

impl VideoSource for ScriptedCamera {
    fn latest_frame(&mut self) -> Option<VideoFrame> {
        if !self.acquired {
            return None;
        }
        let seq = self.seq;
        self.seq += 1;
        Some(VideoFrame {
            source_id: self.id.clone(),
            seq,
            width: self.width,
            height: self.height,
            pixels: Arc::from(Vec::<u8>::new()),
        })
    }
}

/// Looks up the scripted boxes for a frame by source id and sequence number.
pub struct ScriptedDetector {
    frames: HashMap<String, Vec<Vec<[f64; 4]>>>,
    ready_at: Instant,
}

impl ScriptedDetector {
    pub fn new<I>(frames: I, warmup: Duration) -> Self
    where
        I: IntoIterator<Item = (String, Vec<Vec<[f64; 4]>>)>,
    {
        Self {
            frames: frames.into_iter().collect(),
            ready_at: Instant::now() + warmup,
        }
    }
}

impl FaceDetector for ScriptedDetector {
    fn is_ready(&self) -> bool {
        Instant::now() >= self.ready_at
    }

    fn estimate_faces(&self, frame: &VideoFrame) -> Result<Vec<Detection>, DetectorError> {
        if !self.is_ready() {
            return Err(DetectorError::NotReady);
        }
        let Some(script) = self.frames.get(&frame.source_id) else {
            return Err(DetectorError::Failed(format!(
                "no script for source {}",
                frame.source_id
            )));
        };
        if script.is_empty() {
            return Ok(Vec::new());
        }
        let idx = (frame.seq % script.len() as u64) as usize;
        Ok(script[idx]
            .iter()
            .map(|&bbox| Detection {
                bbox,
                confidence: 1.0,
            })
            .collect())
    }
}

pub struct ScriptedMicrophone {
    levels: Vec<u8>,
    unavailable: bool,
    cursor: usize,
}

impl ScriptedMicrophone {
    pub fn new(script: &MicrophoneScript) -> Self {
        Self {
            levels: script.levels.clone(),
            unavailable: script.unavailable,
            cursor: 0,
        }
    }
}

impl MediaDevice for ScriptedMicrophone {
    fn id(&self) -> &str {
        "default"
    }

    fn acquire(&mut self) -> Result<(), MediaError> {
        if self.unavailable {
            return Err(MediaError::NotFound);
        }
        Ok(())
    }

    fn release(&mut self) {}
}

impl Microphone for ScriptedMicrophone {
    fn frequency_data(&mut self, bins: &mut [u8]) {
        let level = if self.levels.is_empty() {
            0
        } else {
            let level = self.levels[self.cursor % self.levels.len()];
            self.cursor += 1;
            level
        };
        bins.fill(level);
    }
}

/// Replay visibility steps on their schedule. The feed closes after the
/// last step or on cancel.
pub fn spawn_visibility_script(
    steps: Vec<VisibilityStep>,
    cancel: CancellationToken,
) -> mpsc::Receiver<Visibility> {
    let (tx, rx) = mpsc::channel(steps.len().max(1));
    let start = Instant::now();
    tokio::spawn(async move {
        for step in steps {
            let at = start + Duration::from_millis(step.at_ms);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(at) => {}
            }
            let v = if step.visible {
                Visibility::Visible
            } else {
                Visibility::Hidden
            };
            if tx.send(v).await.is_err() {
                return;
            }
        }
    });
    rx
}
