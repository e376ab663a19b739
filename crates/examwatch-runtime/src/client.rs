//! UDS JSON-RPC client for CLI subcommands.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to session at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_socket_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("absent.sock");
        let socket = socket.to_str().expect("utf-8 path");
        let err = rpc_call(socket, "status", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot connect to session"));
        assert!(err.to_string().contains(socket));
    }
}
