//! UDS JSON-RPC server exposing the live session.
//! Connection-per-request, newline-delimited JSON.
//!
//! Methods:
//! - `status`: the full snapshot
//! - `log`: audit entries from index `params.since` (default 0), plus `next`
//! - `counters`: face-anomaly counters and the status line values

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use examwatch_core::StatusSnapshot;

/// Run the UDS JSON-RPC server until `cancel` fires. Removes the socket on exit.
pub async fn run_server(
    socket_path: &str,
    status: watch::Receiver<StatusSnapshot>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Stale socket from a crashed session
    if std::path::Path::new(socket_path).exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another session is already serving at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted?.0,
        };
        let status = status.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, status).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }

    drop(listener);
    if let Err(e) = std::fs::remove_file(socket_path) {
        tracing::debug!("socket cleanup failed: {e}");
    }
    tracing::info!("UDS server stopped");
    Ok(())
}

async fn handle_connection(
    stream: UnixStream,
    status: watch::Receiver<StatusSnapshot>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = serde_json::from_str(line.trim())?;
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    let snapshot = status.borrow().clone();
    let response = match dispatch(method, &request["params"], &snapshot)? {
        Some(result) => serde_json::json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        None => serde_json::json!({
            "jsonrpc": "2.0",
            "error": {"code": -32601, "message": "method not found"},
            "id": id,
        }),
    };

    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;

    Ok(())
}

/// Resolve one method against a snapshot. `None` for unknown methods.
pub(crate) fn dispatch(
    method: &str,
    params: &serde_json::Value,
    snapshot: &StatusSnapshot,
) -> serde_json::Result<Option<serde_json::Value>> {
    let result = match method {
        "status" => serde_json::to_value(snapshot)?,
        "log" => {
            let since = params["since"].as_u64().unwrap_or(0) as usize;
            build_log_page(snapshot, since)?
        }
        "counters" => serde_json::json!({
            "status": snapshot.status,
            "colour": snapshot.colour(),
            "no_face_count": snapshot.counters.no_face,
            "multi_face_count": snapshot.counters.multi_face,
        }),
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// Entries from `since` on. `next` is the index to pass on the following call.
fn build_log_page(
    snapshot: &StatusSnapshot,
    since: usize,
) -> serde_json::Result<serde_json::Value> {
    let entries = snapshot.log.get(since..).unwrap_or(&[]);
    Ok(serde_json::json!({
        "entries": serde_json::to_value(entries)?,
        "next": snapshot.log.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use examwatch_core::types::{AnomalyKind, LogEntry, Status};

    fn snapshot_with_log(n: usize) -> StatusSnapshot {
        let ts = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .expect("valid RFC3339")
            .with_timezone(&Utc);
        let mut snap = StatusSnapshot {
            status: Status::Alert,
            ..StatusSnapshot::default()
        };
        for _ in 0..n {
            Arc::make_mut(&mut snap.log).push(LogEntry::new(
                AnomalyKind::NoFace {
                    source_id: "local".into(),
                },
                ts,
            ));
        }
        snap.counters.no_face = n as u64;
        snap
    }

    #[test]
    fn log_page_starts_at_since() {
        let snap = snapshot_with_log(3);
        let page = dispatch("log", &serde_json::json!({"since": 1}), &snap)
            .expect("serializable")
            .expect("known method");
        assert_eq!(page["entries"].as_array().map(Vec::len), Some(2));
        assert_eq!(page["next"], 3);
        assert_eq!(page["entries"][0]["kind"], "no_face");
        assert_eq!(page["entries"][0]["message"], "No face detected at 10:00:00");
    }

    #[test]
    fn log_page_past_end_is_empty() {
        let snap = snapshot_with_log(1);
        let page = dispatch("log", &serde_json::json!({"since": 9}), &snap)
            .expect("serializable")
            .expect("known method");
        assert_eq!(page["entries"], serde_json::json!([]));
        assert_eq!(page["next"], 1);
    }

    #[test]
    fn counters_report_status_and_colour() {
        let snap = snapshot_with_log(2);
        let counters = dispatch("counters", &serde_json::Value::Null, &snap)
            .expect("serializable")
            .expect("known method");
        assert_eq!(counters["no_face_count"], 2);
        assert_eq!(counters["multi_face_count"], 0);
        assert_eq!(counters["colour"], "red");
        assert_eq!(counters["status"], serde_json::to_value(Status::Alert).expect("status"));
    }

    #[test]
    fn unknown_method_is_none() {
        let snap = StatusSnapshot::default();
        assert!(
            dispatch("list_panes", &serde_json::Value::Null, &snap)
                .expect("serializable")
                .is_none()
        );
    }

    #[tokio::test]
    async fn serves_status_over_socket_and_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("examwatch.sock");
        let socket = socket.to_str().expect("utf-8 path").to_string();

        let (_status_tx, status_rx) = watch::channel(snapshot_with_log(1));
        let cancel = CancellationToken::new();
        let server = tokio::spawn({
            let socket = socket.clone();
            let cancel = cancel.clone();
            async move { run_server(&socket, status_rx, cancel).await }
        });

        let mut result = None;
        for _ in 0..50 {
            match crate::client::rpc_call(&socket, "status", serde_json::Value::Null).await {
                Ok(v) => {
                    result = Some(v);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        }
        let status = result.expect("server answered");
        let snap: StatusSnapshot = serde_json::from_value(status).expect("snapshot");
        assert_eq!(snap.log.len(), 1);

        let err = crate::client::rpc_call(&socket, "nope", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("method not found"));

        cancel.cancel();
        server.await.expect("server task").expect("server result");
        assert!(!std::path::Path::new(&socket).exists());
    }
}
