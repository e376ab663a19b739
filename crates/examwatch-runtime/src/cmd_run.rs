//! `examwatch run`: one proctoring session with scripted collaborators.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use examwatch_core::MonitorConfig;

use examwatch_runtime::engine::{self, Collaborators};
use examwatch_runtime::recorder::Recorder;
use examwatch_runtime::scripted::{ScenarioFile, spawn_visibility_script};
use examwatch_runtime::server;
use examwatch_runtime::sink::{TerminalSink, format_status_line, run_sink};

use crate::cli::{RunOpts, resolve_color};

/// Config file (or defaults) with flag overrides applied, then validated.
pub fn build_config(opts: &RunOpts) -> anyhow::Result<MonitorConfig> {
    let mut config = match &opts.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(v) = opts.face_interval_ms {
        config.face_interval_ms = v;
    }
    if let Some(v) = opts.audio_interval_ms {
        config.audio_interval_ms = v;
    }
    if let Some(v) = opts.loud_threshold {
        config.loud_threshold = v;
    }
    if let Some(v) = opts.audio_cooldown_ms {
        config.audio_cooldown_ms = v;
    }
    config.validate()?;
    Ok(config)
}

pub async fn cmd_run(opts: RunOpts, socket_path: &str) -> anyhow::Result<()> {
    let config = build_config(&opts)?;
    let scenario = ScenarioFile::load(&opts.scenario)?;
    tracing::info!(
        scenario = %scenario.name,
        cameras = scenario.cameras.len(),
        face_interval_ms = config.face_interval_ms,
        audio_interval_ms = config.audio_interval_ms,
        "starting session"
    );

    let script_cancel = CancellationToken::new();
    let collaborators = Collaborators {
        detector: Arc::new(scenario.detector()),
        cameras: scenario.cameras(),
        microphone: scenario.microphone(),
        visibility: Some(spawn_visibility_script(
            scenario.visibility.clone(),
            script_cancel.clone(),
        )),
    };
    let engine = engine::start(&config, collaborators)?;

    // Sink and recorder drain until the status channel closes, so they see
    // the final snapshot.
    let use_color = resolve_color(&opts.color);
    let sink = tokio::spawn(run_sink(
        TerminalSink::new(std::io::stdout(), use_color),
        engine.status(),
        CancellationToken::new(),
    ));

    let recorder = match &opts.record {
        Some(path) => {
            let mut recorder = Recorder::new(path, engine.status(), CancellationToken::new())?;
            tracing::info!(path = %path.display(), "recording audit log");
            Some(tokio::spawn(async move { recorder.run().await }))
        }
        None => None,
    };

    let server = if opts.serve {
        let socket_path = socket_path.to_string();
        let status = engine.status();
        let cancel = engine.cancel_token();
        Some(tokio::spawn(async move {
            server::run_server(&socket_path, status, cancel).await
        }))
    } else {
        None
    };

    match scenario.duration() {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    tracing::info!("scenario duration elapsed");
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            tracing::info!("interrupted");
        }
    }

    script_cancel.cancel();
    let snapshot = engine.stop().await?;

    sink.await?;
    if let Some(recorder) = recorder {
        recorder.await?;
    }
    if let Some(server) = server {
        server.await??;
    }

    println!("Session ended: {}", format_status_line(&snapshot, use_color));
    Ok(())
}
