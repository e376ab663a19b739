//! `examwatch status` and `examwatch watch`: query a serving session.

use std::time::Duration;

use examwatch_core::StatusSnapshot;
use examwatch_runtime::client::rpc_call;
use examwatch_runtime::sink::format_status_line;

use crate::cli::resolve_color;

/// Number of trailing log lines shown by `status` and `watch`.
const LOG_TAIL: usize = 10;

pub async fn cmd_status(socket_path: &str, json: bool, color: &str) -> anyhow::Result<()> {
    let value = rpc_call(socket_path, "status", serde_json::Value::Null).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    let snapshot: StatusSnapshot = serde_json::from_value(value)?;
    print!("{}", format_report(&snapshot, resolve_color(color)));
    Ok(())
}

pub async fn cmd_watch(socket_path: &str, interval: u64, color: &str) -> anyhow::Result<()> {
    let use_color = resolve_color(color);

    loop {
        // Clear screen + cursor home
        print!("\x1b[2J\x1b[H");

        match rpc_call(socket_path, "status", serde_json::Value::Null).await {
            Ok(value) => match serde_json::from_value::<StatusSnapshot>(value) {
                Ok(snapshot) => print!("{}", format_report(&snapshot, use_color)),
                Err(e) => println!("Unexpected status payload: {e}"),
            },
            Err(e) => println!("Cannot connect to session: {e}"),
        }

        if use_color {
            println!("\n\x1b[2mexamwatch watch (Ctrl-C to quit)\x1b[0m");
        } else {
            println!("\nexamwatch watch (Ctrl-C to quit)");
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            _ = tokio::signal::ctrl_c() => { break; }
        }
    }

    Ok(())
}

/// Status line, per-signal verdicts and the tail of the audit log.
pub(crate) fn format_report(snapshot: &StatusSnapshot, use_color: bool) -> String {
    let mut out = format_status_line(snapshot, use_color);
    out.push('\n');

    let signals: Vec<String> = snapshot
        .signals
        .iter()
        .map(|(name, verdict)| {
            let mark = if verdict.is_anomalous() { "!" } else { "ok" };
            format!("{name}={mark}")
        })
        .collect();
    out.push_str(&format!("signals: {}\n", signals.join(" ")));

    if snapshot.log.is_empty() {
        out.push_str("(no anomalies logged)\n");
    } else {
        let skip = snapshot.log.len().saturating_sub(LOG_TAIL);
        if skip > 0 {
            out.push_str(&format!("... {skip} earlier entries\n"));
        }
        for entry in &snapshot.log[skip..] {
            out.push_str(&entry.message);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};
    use std::sync::Arc;
    use examwatch_core::types::{AnomalyKind, LogEntry, Status, Verdict};

    #[test]
    fn report_shows_signals_and_log_tail() {
        let t0 = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .expect("valid RFC3339")
            .with_timezone(&Utc);
        let mut snap = StatusSnapshot {
            status: Status::Alert,
            ..StatusSnapshot::default()
        };
        snap.signals.focus = Verdict::Anomalous;
        for i in 0..12 {
            Arc::make_mut(&mut snap.log)
                .push(LogEntry::new(AnomalyKind::TabSwitched, t0 + TimeDelta::seconds(i)));
        }

        let report = format_report(&snap, false);
        assert!(report.starts_with("[ALERT] "));
        assert!(report.contains("signals: face=ok audio=ok focus=!"));
        assert!(report.contains("... 2 earlier entries"));
        assert!(!report.contains("Tab switched at 10:00:01\n"));
        assert!(report.contains("Tab switched at 10:00:02\n"));
        assert!(report.ends_with("Tab switched at 10:00:11\n"));
    }

    #[test]
    fn empty_log_is_labelled() {
        let report = format_report(&StatusSnapshot::default(), false);
        assert!(report.starts_with("[OK] "));
        assert!(report.contains("(no anomalies logged)"));
    }
}
