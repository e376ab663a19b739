//! End-to-end session tests with scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use examwatch_core::types::{AnomalyKind, DeviceKind, Status};
use examwatch_core::{MonitorConfig, StatusSnapshot};
use examwatch_runtime::recorder::Recorder;
use examwatch_runtime::scripted::{ScenarioFile, spawn_visibility_script};
use examwatch_runtime::{Collaborators, client, engine, server};

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        face_interval_ms: 25,
        audio_interval_ms: 10,
        audio_cooldown_ms: 60_000,
        detector_timeout_ms: Some(500),
        ..MonitorConfig::default()
    }
}

fn start_scenario(json: &str) -> (engine::EngineHandle, CancellationToken) {
    let scenario = ScenarioFile::from_json(json).expect("valid scenario");
    let script_cancel = CancellationToken::new();
    let handle = engine::start(
        &fast_config(),
        Collaborators {
            detector: Arc::new(scenario.detector()),
            cameras: scenario.cameras(),
            microphone: scenario.microphone(),
            visibility: Some(spawn_visibility_script(
                scenario.visibility.clone(),
                script_cancel.clone(),
            )),
        },
    )
    .expect("valid config");
    (handle, script_cancel)
}

async fn wait_until(
    engine: &engine::EngineHandle,
    what: &str,
    pred: impl FnMut(&StatusSnapshot) -> bool,
) {
    let mut rx = engine.status();
    tokio::time::timeout(Duration::from_secs(3), rx.wait_for(pred))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("status channel open");
}

#[tokio::test]
async fn nominal_session_stays_ok() {
    let (engine, script) = start_scenario(
        r#"{
            "cameras": [{ "id": "local", "frames": [[[100, 80, 120, 120]]] }],
            "microphone": { "levels": [4, 6] }
        }"#,
    );
    wait_until(&engine, "a few face ticks", |s| {
        s.version >= 5 && s.canvas.width == 640
    })
    .await;

    script.cancel();
    let snap = engine.stop().await.expect("clean stop");
    assert_eq!(snap.status, Status::Ok);
    assert_eq!(snap.colour(), "green");
    assert!(snap.log.is_empty());
    assert_eq!(snap.counters.total(), 0);
    assert_eq!(snap.overlays.len(), 1);
}

#[tokio::test]
async fn anomalies_are_logged_counted_and_cleared() {
    let (engine, script) = start_scenario(
        r#"{
            "cameras": [
                { "id": "local", "frames": [[[0, 0, 50, 50], [60, 0, 50, 50]]] },
                { "id": "ipcam", "width": 320, "height": 240, "unavailable": true }
            ],
            "microphone": { "levels": [90] },
            "visibility": [{ "at_ms": 0, "visible": false }, { "at_ms": 50, "visible": true }]
        }"#,
    );
    wait_until(&engine, "multiple-face entries", |s| s.counters.multi_face >= 2).await;

    script.cancel();
    let snap = engine.stop().await.expect("clean stop");

    // Two faces on every tick keeps the session in alert.
    assert_eq!(snap.status, Status::Alert);
    assert_eq!(snap.colour(), "red");
    assert_eq!(snap.counters.no_face, 0);

    let face_entries = snap.log.iter().filter(|e| e.kind.is_face_anomaly()).count();
    assert_eq!(face_entries as u64, snap.counters.total());

    let loud = snap
        .log
        .iter()
        .filter(|e| matches!(e.kind, AnomalyKind::LoudNoise { .. }))
        .count();
    assert_eq!(loud, 1, "sustained noise logs once per cooldown window");

    assert!(snap.log.iter().any(|e| e.kind == AnomalyKind::TabSwitched));
    assert!(snap.log.iter().any(|e| matches!(
        &e.kind,
        AnomalyKind::SourceLost { device: DeviceKind::Camera, source_id } if source_id == "ipcam"
    )));
    assert!(snap.log.iter().all(|e| e.message.contains(" at ")));

    // Unavailable camera never delivered a frame: zero width on the canvas.
    assert_eq!(snap.canvas.width, 640);
    assert_eq!(snap.overlays.len(), 2);
}

#[tokio::test]
async fn log_is_append_only_across_snapshots() {
    let (engine, script) = start_scenario(
        r#"{ "cameras": [{ "id": "local", "frames": [[], [[10, 10, 50, 50]]] }] }"#,
    );
    let mut rx = engine.status();
    let mut previous: Vec<String> = Vec::new();
    for _ in 0..6 {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("snapshot within deadline")
            .expect("status channel open");
        let snap = rx.borrow_and_update().clone();
        let messages: Vec<String> = snap.log.iter().map(|e| e.message.clone()).collect();
        assert!(messages.starts_with(&previous), "earlier entries never change");
        assert_eq!(snap.counters.no_face as usize, snap.log.len());
        previous = messages;
    }
    script.cancel();
    engine.stop().await.expect("clean stop");
}

#[tokio::test]
async fn recorder_and_server_observe_the_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let audit = dir.path().join("audit.jsonl");
    let socket = dir.path().join("examwatch.sock");
    let socket = socket.to_str().expect("utf-8 path").to_string();

    let (engine, script) = start_scenario(
        r#"{ "cameras": [{ "id": "local", "frames": [[]] }] }"#,
    );

    let mut recorder =
        Recorder::new(&audit, engine.status(), CancellationToken::new()).expect("create");
    let recorder = tokio::spawn(async move {
        recorder.run().await;
        recorder.written()
    });
    let server = tokio::spawn({
        let socket = socket.clone();
        let status = engine.status();
        let cancel = engine.cancel_token();
        async move { server::run_server(&socket, status, cancel).await }
    });

    wait_until(&engine, "no-face entries", |s| s.counters.no_face >= 3).await;

    let mut counters = None;
    for _ in 0..50 {
        if let Ok(v) = client::rpc_call(&socket, "counters", serde_json::Value::Null).await {
            counters = Some(v);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let counters = counters.expect("server answered");
    assert!(counters["no_face_count"].as_u64().unwrap_or(0) >= 3);
    assert_eq!(counters["colour"], "red");

    let page = client::rpc_call(&socket, "log", serde_json::json!({ "since": 1 }))
        .await
        .expect("log page");
    let next = page["next"].as_u64().expect("next index");
    let entries = page["entries"].as_array().expect("entries").len() as u64;
    assert_eq!(entries, next - 1);

    script.cancel();
    let snap = engine.stop().await.expect("clean stop");
    server.await.expect("server task").expect("server result");
    let written = recorder.await.expect("recorder task");

    assert_eq!(written, snap.log.len());
    let content = std::fs::read_to_string(&audit).expect("read audit");
    assert_eq!(content.lines().count(), snap.log.len());
    assert!(content.lines().all(|l| l.contains("\"kind\":\"no_face\"")));
    assert!(!std::path::Path::new(&socket).exists());
}
