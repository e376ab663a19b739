//! AudioLevelMonitor: samples the microphone's frequency buffer on a fixed
//! period, classifies the mean magnitude, and forwards every reading.
//!
//! An unavailable microphone is reported once as `SourceLost` and the
//! monitor ends; the other signals keep running.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use examwatch_core::audio::LoudnessClassifier;
use examwatch_core::types::{DeviceKind, Observation, SourceLost};

use crate::media::{Acquired, Microphone};

pub struct AudioLevelMonitor<M: Microphone> {
    microphone: M,
    classifier: LoudnessClassifier,
    bin_count: usize,
    tx: mpsc::Sender<Observation>,
    period: Duration,
    cancel: CancellationToken,
}

impl<M: Microphone> AudioLevelMonitor<M> {
    pub fn new(
        microphone: M,
        classifier: LoudnessClassifier,
        bin_count: usize,
        tx: mpsc::Sender<Observation>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            microphone,
            classifier,
            bin_count,
            tx,
            period,
            cancel,
        }
    }

    pub async fn run(self) {
        let Self {
            microphone,
            mut classifier,
            bin_count,
            tx,
            period,
            cancel,
        } = self;

        let mut mic = match Acquired::acquire(microphone) {
            Ok(mic) => mic,
            Err((mic, e)) => {
                warn!(source_id = mic.id(), "microphone unavailable: {e}");
                let _ = tx
                    .send(Observation::SourceLost(SourceLost {
                        timestamp: Utc::now(),
                        device: DeviceKind::Microphone,
                        source_id: mic.id().to_string(),
                        reason: e.to_string(),
                    }))
                    .await;
                return;
            }
        };
        info!(
            source_id = mic.id(),
            bins = bin_count,
            threshold = classifier.threshold(),
            "audio monitor started"
        );

        let mut bins = vec![0u8; bin_count];
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            mic.frequency_data(&mut bins);
            let reading = classifier.classify_bins(&bins, Utc::now());
            if reading.is_loud {
                debug!(level = reading.level, "loud reading");
            }
            if tx.send(Observation::Audio(reading)).await.is_err() {
                debug!("audio monitor: aggregator gone");
                break;
            }
        }

        info!("audio monitor stopped");
    }
}
