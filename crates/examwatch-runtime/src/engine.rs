//! Session wiring: spawns the monitors and the aggregator task, and tears
//! them all down together.
//!
//! ```text
//!   FrameSampler ─┐
//!   AudioMonitor ─┼─ mpsc<Observation> ─▶ Orchestrator ─▶ watch<StatusSnapshot>
//!   FocusMonitor ─┘
//! ```
//!
//! One cancellation token is shared by every monitor, so stopping the
//! session stops all of them. Dropping the [`EngineHandle`] cancels too.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use examwatch_core::audio::LoudnessClassifier;
use examwatch_core::{AnomalyAggregator, ConfigError, MonitorConfig, StatusSnapshot};

use crate::audio_monitor::AudioLevelMonitor;
use crate::focus_monitor::{FocusMonitor, Visibility};
use crate::frame_sampler::FrameSampler;
use crate::media::{FaceDetector, MediaDevice, Microphone, VideoSource};
use crate::orchestrator::Orchestrator;

/// Observation channel depth. Monitors apply backpressure beyond this.
const OBSERVATION_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("monitor task failed: {0}")]
    Join(#[from] JoinError),
}

/// Everything the host provides to a session.
pub struct Collaborators<D: FaceDetector, M: Microphone> {
    pub detector: Arc<D>,
    /// Video sources, left to right on the canvas.
    pub cameras: Vec<Box<dyn VideoSource>>,
    pub microphone: Option<M>,
    /// Raw page-visibility notifications.
    pub visibility: Option<mpsc::Receiver<Visibility>>,
}

/// A running session.
pub struct EngineHandle {
    cancel: CancellationToken,
    status_rx: watch::Receiver<StatusSnapshot>,
    monitors: Vec<JoinHandle<()>>,
    orchestrator: Option<JoinHandle<AnomalyAggregator>>,
}

/// Start a session. Must be called from within a tokio runtime.
///
/// The config is validated before anything is spawned, so a rejected config
/// starts no monitor and acquires no device.
pub fn start<D, M>(
    config: &MonitorConfig,
    collaborators: Collaborators<D, M>,
) -> Result<EngineHandle, EngineError>
where
    D: FaceDetector,
    M: Microphone,
{
    config.validate()?;

    let Collaborators {
        detector,
        cameras,
        microphone,
        visibility,
    } = collaborators;

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(OBSERVATION_BUFFER);
    let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());

    let aggregator = AnomalyAggregator::with_sources(cameras.iter().map(|c| c.id().to_string()));
    let orchestrator = tokio::spawn(Orchestrator::new(aggregator, rx, status_tx).run());

    let mut monitors = Vec::new();

    if cameras.is_empty() {
        warn!("no camera configured, face monitoring disabled");
    } else {
        let sampler = FrameSampler::new(
            detector,
            cameras,
            tx.clone(),
            config.face_interval(),
            config.detector_timeout(),
            cancel.clone(),
        );
        monitors.push(tokio::spawn(sampler.run()));
    }

    if let Some(microphone) = microphone {
        let monitor = AudioLevelMonitor::new(
            microphone,
            LoudnessClassifier::from_config(config),
            config.frequency_bin_count(),
            tx.clone(),
            config.audio_interval(),
            cancel.clone(),
        );
        monitors.push(tokio::spawn(monitor.run()));
    } else {
        warn!("no microphone configured, audio monitoring disabled");
    }

    if let Some(feed) = visibility {
        monitors.push(tokio::spawn(
            FocusMonitor::new(feed, tx.clone(), cancel.clone()).run(),
        ));
    }

    // Only the monitors hold senders now: the orchestrator ends once they do.
    drop(tx);

    info!(monitors = monitors.len(), "session started");
    Ok(EngineHandle {
        cancel,
        status_rx,
        monitors,
        orchestrator: Some(orchestrator),
    })
}

impl EngineHandle {
    /// Subscribe to status snapshots.
    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_rx.clone()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status_rx.borrow().clone()
    }

    /// Token cancelled when the session stops. Sinks and servers tie their
    /// lifetime to it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every monitor, release all devices, drain pending observations
    /// and return the final snapshot.
    pub async fn stop(mut self) -> Result<StatusSnapshot, EngineError> {
        self.cancel.cancel();

        let mut first_err = None;
        for handle in std::mem::take(&mut self.monitors) {
            if let Err(e) = handle.await {
                warn!("monitor task ended abnormally: {e}");
                first_err.get_or_insert(e);
            }
        }

        let snapshot = match self.orchestrator.take() {
            Some(handle) => handle.await?.snapshot(),
            None => self.snapshot(),
        };
        info!(
            status = snapshot.status.as_str(),
            log_entries = snapshot.log.len(),
            "session stopped"
        );

        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(snapshot),
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
