//! Default configuration constants for voxread.
//!
//! Shared by the config layer, the engine and the player so the numbers
//! that define the pipeline's timing live in one place.

/// Output sample rate of the TTS model in Hz.
pub const SAMPLE_RATE: u32 = 24000;

/// Soft upper bound on characters per synthesized text chunk.
pub const MAX_CHUNK_CHARS: usize = 300;

/// Maximum number of emitted but unacknowledged audio chunks.
///
/// Generation suspends once this many chunks are in flight.
pub const MAX_QUEUE_DEPTH: usize = 6;

/// How long a new generation waits for a superseded one to wind down.
pub const GRACE_PERIOD_MS: u64 = 100;

/// Upper bound on waiting for the model during auto-initialization.
pub const INIT_TIMEOUT_SECS: u64 = 120;

/// Status polling interval while waiting for the model to load.
pub const INIT_POLL_MS: u64 = 1000;

/// Delay before restarting generation after a mode switch.
///
/// Lets the cancellation of the previous generation land first.
pub const RESTART_DELAY_MS: u64 = 500;

/// Settle delay between consumer re-establishment and the delivery retry.
pub const RELAY_RETRY_DELAY_MS: u64 = 100;

/// Default voice identifier.
pub const DEFAULT_VOICE: &str = "af_heart";

/// Playback speed bounds for the buffered (full) mode.
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 3.0;
