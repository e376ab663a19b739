//! JSONL audit recorder: appends every new log entry as one JSON line.
//!
//! Driven by the snapshot watch channel. The recorder keeps its own cursor
//! into the append-only log, so skipped intermediate snapshots never lose
//! entries.

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use examwatch_core::StatusSnapshot;
use examwatch_core::types::LogEntry;

/// A single recorded line in the JSONL file.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordedEntry {
    /// Wall-clock time the line was written.
    pub ts: String,
    #[serde(flatten)]
    pub entry: LogEntry,
}

pub struct Recorder {
    writer: std::fs::File,
    rx: watch::Receiver<StatusSnapshot>,
    written: usize,
    cancel: CancellationToken,
}

impl Recorder {
    pub fn new(
        path: &Path,
        rx: watch::Receiver<StatusSnapshot>,
        cancel: CancellationToken,
    ) -> std::io::Result<Self> {
        let writer = std::fs::File::create(path)?;
        Ok(Self {
            writer,
            rx,
            written: 0,
            cancel,
        })
    }

    /// Run until cancelled or the session ends, then flush whatever the
    /// final snapshot added.
    pub async fn run(&mut self) {
        loop {
            let snapshot = self.rx.borrow_and_update().clone();
            self.write_new(&snapshot);
            tokio::select! {
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        tracing::info!("recorder: status channel closed, stopping");
                        break;
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("recorder: cancellation requested, shutting down");
                    break;
                }
            }
        }
        let snapshot = self.rx.borrow().clone();
        self.write_new(&snapshot);
    }

    fn write_new(&mut self, snapshot: &StatusSnapshot) {
        let Some(fresh) = snapshot.log.get(self.written..) else {
            return;
        };
        if fresh.is_empty() {
            return;
        }
        for entry in fresh {
            let record = RecordedEntry {
                ts: Utc::now().to_rfc3339(),
                entry: entry.clone(),
            };
            match serde_json::to_string(&record) {
                Ok(line) => {
                    if let Err(e) = writeln!(self.writer, "{line}") {
                        tracing::error!("recorder write failed: {e}");
                    }
                }
                Err(e) => tracing::error!("recorder serialization failed: {e}"),
            }
        }
        if let Err(e) = self.writer.flush() {
            tracing::error!("recorder flush failed: {e}");
        }
        self.written = snapshot.log.len();
    }

    pub fn written(&self) -> usize {
        self.written
    }
}
