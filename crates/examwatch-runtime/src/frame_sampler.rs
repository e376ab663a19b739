//! FrameSampler: on a fixed period, pulls the latest frame from every
//! acquired camera, runs the detector on each, and sends the results of the
//! tick to the aggregator as one `FaceTick`.
//!
//! Detector calls run on the blocking pool and are bounded by the detector
//! timeout. A call that misses the deadline is abandoned for its tick and
//! the source is skipped until that call finishes, so there is never more
//! than one detection in flight per source and late results are dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use examwatch_core::types::{
    BoundingBox, DeviceKind, FaceObservation, FaceTick, Observation, SourceLost,
};

use crate::media::{Acquired, Detection, DetectorError, FaceDetector, MediaDevice, VideoSource};

type DetectionTask = JoinHandle<Result<Vec<Detection>, DetectorError>>;

struct InFlight {
    task: DetectionTask,
    width: u32,
    height: u32,
}

/// A camera that was successfully acquired.
struct CameraSlot {
    camera: Acquired<Box<dyn VideoSource>>,
    in_flight: Option<InFlight>,
}

pub struct FrameSampler<D: FaceDetector> {
    detector: Arc<D>,
    cameras: Vec<Box<dyn VideoSource>>,
    tx: mpsc::Sender<Observation>,
    period: Duration,
    detector_timeout: Duration,
    cancel: CancellationToken,
}

impl<D: FaceDetector> FrameSampler<D> {
    pub fn new(
        detector: Arc<D>,
        cameras: Vec<Box<dyn VideoSource>>,
        tx: mpsc::Sender<Observation>,
        period: Duration,
        detector_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            detector,
            cameras,
            tx,
            period,
            detector_timeout,
            cancel,
        }
    }

    /// Run until cancelled, the aggregator goes away, or no camera is left.
    pub async fn run(self) {
        let Self {
            detector,
            cameras,
            tx,
            period,
            detector_timeout,
            cancel,
        } = self;

        let mut slots = Vec::with_capacity(cameras.len());
        for camera in cameras {
            match Acquired::acquire(camera) {
                Ok(camera) => slots.push(CameraSlot {
                    camera,
                    in_flight: None,
                }),
                Err((camera, e)) => {
                    warn!(source_id = camera.id(), "camera unavailable: {e}");
                    let lost = Observation::SourceLost(SourceLost {
                        timestamp: Utc::now(),
                        device: DeviceKind::Camera,
                        source_id: camera.id().to_string(),
                        reason: e.to_string(),
                    });
                    if tx.send(lost).await.is_err() {
                        return;
                    }
                }
            }
        }

        if slots.is_empty() {
            info!("frame sampler: no camera available, stopping");
            return;
        }
        info!(
            cameras = slots.len(),
            period_ms = period.as_millis() as u64,
            "frame sampler started"
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tick += 1;

            let sampled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sampled = sample_tick(&detector, &mut slots, tick, detector_timeout) => sampled,
            };

            let Some(face_tick) = sampled else { continue };
            if tx.send(Observation::Face(face_tick)).await.is_err() {
                debug!("frame sampler: aggregator gone");
                break;
            }
        }

        info!("frame sampler stopped");
        // slots drop here: every camera is released
    }
}

/// Sample every camera once. `None` when nothing was observed this tick.
async fn sample_tick<D: FaceDetector>(
    detector: &Arc<D>,
    slots: &mut [CameraSlot],
    tick: u64,
    detector_timeout: Duration,
) -> Option<FaceTick> {
    if !detector.is_ready() {
        debug!(tick, "detector not ready, skipping tick");
        return None;
    }

    let started_at = Utc::now();
    let deadline = Instant::now() + detector_timeout;

    // Dispatch: at most one call in flight per source.
    let mut dispatched = vec![false; slots.len()];
    for (i, slot) in slots.iter_mut().enumerate() {
        if let Some(in_flight) = &slot.in_flight {
            if !in_flight.task.is_finished() {
                debug!(tick, source_id = slot.camera.id(), "detector still busy, skipping source");
                continue;
            }
            debug!(tick, source_id = slot.camera.id(), "dropping late detection result");
            slot.in_flight = None;
        }

        let Some(frame) = slot.camera.latest_frame() else {
            debug!(tick, source_id = slot.camera.id(), "frame not ready");
            continue;
        };

        let (width, height) = (frame.width, frame.height);
        let det = Arc::clone(detector);
        let task = tokio::task::spawn_blocking(move || det.estimate_faces(&frame));
        slot.in_flight = Some(InFlight {
            task,
            width,
            height,
        });
        dispatched[i] = true;
    }

    // Collect in registration order.
    let mut observations = Vec::new();
    for (i, slot) in slots.iter_mut().enumerate() {
        if !dispatched[i] {
            continue;
        }
        let Some(in_flight) = slot.in_flight.as_mut() else {
            continue;
        };
        let source_id = slot.camera.id().to_string();

        let (width, height) = (in_flight.width, in_flight.height);
        let outcome = timeout_at(deadline, &mut in_flight.task).await;
        match outcome {
            Ok(joined) => {
                slot.in_flight = None;
                match joined {
                    Ok(Ok(detections)) => observations.push(FaceObservation {
                        source_id,
                        timestamp: started_at,
                        frame_width: width,
                        frame_height: height,
                        boxes: detections
                            .iter()
                            .map(|d| BoundingBox::from_array(d.bbox))
                            .collect(),
                    }),
                    Ok(Err(DetectorError::NotReady)) => {
                        debug!(tick, source_id = %source_id, "detector not ready");
                    }
                    Ok(Err(e)) => {
                        warn!(tick, source_id = %source_id, "detection failed: {e}");
                    }
                    Err(e) => {
                        warn!(tick, source_id = %source_id, "detection task failed: {e}");
                    }
                }
            }
            Err(_) => {
                warn!(
                    tick,
                    source_id = %source_id,
                    timeout_ms = detector_timeout.as_millis() as u64,
                    "detector call exceeded timeout, skipping source this tick"
                );
            }
        }
    }

    if observations.is_empty() {
        return None;
    }
    debug!(tick, observed = observations.len(), "face tick sampled");
    Some(FaceTick {
        tick,
        started_at,
        observations,
    })
}

// ─── Tests ───────────────────────────────────────────────────────
