//! Status sinks: where snapshots go for display.
//!
//! The terminal sink prints each new audit entry once, followed by a status
//! line whenever the status or a counter moves.

use std::io::{self, Write};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use examwatch_core::StatusSnapshot;
use examwatch_core::types::Status;

pub trait StatusSink: Send {
    fn render(&mut self, snapshot: &StatusSnapshot) -> io::Result<()>;
}

/// One-line summary: status word plus both face counters.
pub fn format_status_line(snapshot: &StatusSnapshot, use_color: bool) -> String {
    let status = snapshot.status.as_str().to_uppercase();
    let status = if use_color {
        let code = match snapshot.status {
            Status::Ok => "32",
            Status::Alert => "1;31",
        };
        format!("\x1b[{code}m{status}\x1b[0m")
    } else {
        status
    };
    format!(
        "[{status}] No Face Detected Count: {} | Multiple Faces Detected Count: {}",
        snapshot.counters.no_face, snapshot.counters.multi_face
    )
}

pub struct TerminalSink<W: Write + Send> {
    out: W,
    use_color: bool,
    /// Log entries already printed.
    printed: usize,
    last_line: Option<String>,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            printed: 0,
            last_line: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> StatusSink for TerminalSink<W> {
    fn render(&mut self, snapshot: &StatusSnapshot) -> io::Result<()> {
        for entry in snapshot.log.iter().skip(self.printed) {
            if self.use_color {
                writeln!(self.out, "\x1b[33m{}\x1b[0m", entry.message)?;
            } else {
                writeln!(self.out, "{}", entry.message)?;
            }
        }
        self.printed = self.printed.max(snapshot.log.len());

        let line = format_status_line(snapshot, self.use_color);
        if self.last_line.as_deref() != Some(line.as_str()) {
            writeln!(self.out, "{line}")?;
            self.last_line = Some(line);
        }
        self.out.flush()
    }
}

/// Render every published snapshot until cancelled or the session ends.
/// The last snapshot is always rendered before returning.
pub async fn run_sink<S: StatusSink>(
    mut sink: S,
    mut status: watch::Receiver<StatusSnapshot>,
    cancel: CancellationToken,
) -> S {
    loop {
        let snapshot = status.borrow_and_update().clone();
        if let Err(e) = sink.render(&snapshot) {
            tracing::error!("status sink write failed: {e}");
        }
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    let last = status.borrow().clone();
    if let Err(e) = sink.render(&last) {
        tracing::error!("status sink write failed: {e}");
    }
    sink
}
