//! FocusMonitor: turns raw host visibility notifications into
//! transition-only focus observations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use examwatch_core::focus::FocusTracker;
use examwatch_core::types::Observation;

/// Raw page-visibility notification from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        matches!(self, Self::Visible)
    }
}

pub struct FocusMonitor {
    feed: mpsc::Receiver<Visibility>,
    tracker: FocusTracker,
    tx: mpsc::Sender<Observation>,
    cancel: CancellationToken,
}

impl FocusMonitor {
    pub fn new(
        feed: mpsc::Receiver<Visibility>,
        tx: mpsc::Sender<Observation>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            feed,
            tracker: FocusTracker::new(),
            tx,
            cancel,
        }
    }

    /// Run until cancelled or the host closes the feed.
    pub async fn run(mut self) {
        info!("focus monitor started");
        loop {
            let visibility = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = self.feed.recv() => match next {
                    Some(v) => v,
                    None => {
                        debug!("focus monitor: visibility feed closed");
                        break;
                    }
                },
            };

            let Some(obs) = self.tracker.observe(visibility.is_visible(), Utc::now()) else {
                continue;
            };
            debug!(visible = obs.is_visible, "visibility changed");
            if self.tx.send(Observation::Focus(obs)).await.is_err() {
                break;
            }
        }
        info!("focus monitor stopped");
    }
}
