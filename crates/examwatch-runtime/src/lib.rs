//! examwatch-runtime: async proctoring session.
//!
//! Monitor tasks sample cameras, the microphone and tab visibility; a single
//! aggregator task owns the state from `examwatch-core` and publishes status
//! snapshots to sinks, the JSONL recorder and the UDS status server.

pub mod audio_monitor;
pub mod client;
pub mod engine;
pub mod focus_monitor;
pub mod frame_sampler;
pub mod media;
pub mod orchestrator;
pub mod recorder;
pub mod scripted;
pub mod server;
pub mod sink;

pub use engine::{Collaborators, EngineError, EngineHandle, start};
pub use focus_monitor::Visibility;
