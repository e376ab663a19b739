//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "examwatch", about = "Exam session proctoring monitor")]
pub struct Cli {
    /// UDS socket path (default: /tmp/examwatch-$USER/examwatch.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a proctoring session driven by a scenario file
    Run(RunOpts),
    /// Print the status of a running session
    Status(StatusOpts),
    /// Live-refresh status of a running session
    Watch(WatchOpts),
}

#[derive(clap::Args)]
pub struct RunOpts {
    /// Scenario file describing cameras, microphone and visibility changes
    #[arg(long)]
    pub scenario: PathBuf,

    /// TOML config file; flags below override its values
    #[arg(long, env = "EXAMWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Face sampling period in milliseconds
    #[arg(long)]
    pub face_interval_ms: Option<u64>,

    /// Audio sampling period in milliseconds
    #[arg(long)]
    pub audio_interval_ms: Option<u64>,

    /// Mean magnitude above which a reading is loud
    #[arg(long)]
    pub loud_threshold: Option<f64>,

    /// Refractory window after a loud trigger, in milliseconds
    #[arg(long)]
    pub audio_cooldown_ms: Option<u64>,

    /// Append every audit log entry to this JSONL file
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Serve status over the UDS socket while running
    #[arg(long)]
    pub serve: bool,

    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: String,
}

#[derive(clap::Args)]
pub struct StatusOpts {
    /// Print the raw snapshot as JSON
    #[arg(long)]
    pub json: bool,

    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: String,
}

#[derive(clap::Args)]
pub struct WatchOpts {
    /// Refresh interval in seconds
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: String,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/examwatch/examwatch.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/examwatch-{user}/examwatch.sock")
}

/// Resolve --color flag to bool.
pub fn resolve_color(color: &str) -> bool {
    use std::io::IsTerminal;
    match color {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}
