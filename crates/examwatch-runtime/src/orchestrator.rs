//! Aggregator task: the single owner of proctoring state.
//!
//! Monitors send observations over one mpsc channel; each is applied
//! atomically and the resulting snapshot is published on a watch channel.
//! Readers therefore only ever see fully applied observations.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use examwatch_core::types::Observation;
use examwatch_core::{AnomalyAggregator, StatusSnapshot};

pub struct Orchestrator {
    aggregator: AnomalyAggregator,
    /// Receives observations from every monitor.
    source_rx: mpsc::Receiver<Observation>,
    /// Latest snapshot, read by sinks, the recorder and the server.
    status_tx: watch::Sender<StatusSnapshot>,
}

impl Orchestrator {
    pub fn new(
        aggregator: AnomalyAggregator,
        source_rx: mpsc::Receiver<Observation>,
        status_tx: watch::Sender<StatusSnapshot>,
    ) -> Self {
        Self {
            aggregator,
            source_rx,
            status_tx,
        }
    }

    /// Apply observations until every monitor has dropped its sender, then
    /// hand back the final state. Monitors stop on cancel; whatever they
    /// already sent is still applied.
    pub async fn run(mut self) -> AnomalyAggregator {
        info!("orchestrator: event loop started");
        self.publish();
        while let Some(observation) = self.source_rx.recv().await {
            self.handle(&observation);
        }
        info!(
            version = self.aggregator.version(),
            log_entries = self.aggregator.log().len(),
            "orchestrator: source channel closed, shutting down"
        );
        self.aggregator
    }

    fn handle(&mut self, observation: &Observation) {
        let applied = self.aggregator.apply(observation);
        for entry in &applied.appended {
            info!(signal = observation.signal_name(), "{}", entry.message);
        }
        if applied.changed() {
            info!(
                from = applied.previous.as_str(),
                to = applied.status.as_str(),
                "status changed"
            );
        } else {
            debug!(signal = observation.signal_name(), "observation applied");
        }
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.aggregator.snapshot());
    }
}
