//! voxread - Read text aloud with a local neural TTS model
//!
//! Text is split into sentence chunks, synthesized one chunk at a time by an
//! engine host, relayed to a playback session and played either as it streams
//! in or as one combined track.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod app;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod player;
pub mod session;
pub mod text;
pub mod tts;

// Core seams (synthesize → relay → play)
pub use audio::output::AudioOutput;
pub use ipc::relay::ConsumerTransport;
pub use player::settings::SettingsStore;
pub use tts::synthesizer::Synthesizer;

// Engine and session
pub use engine::{EngineHost, GenerationEngine};
pub use player::PlaybackController;
pub use session::{SessionCoordinator, SessionHandle};

// Error handling
pub use error::{Result, VoxError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.0.1+abc1234"` when git hash is available, `"0.0.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
