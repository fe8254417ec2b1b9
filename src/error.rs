//! Error types for voxread.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Model errors
    #[error("Failed to load TTS model: {message}")]
    ModelLoad { message: String },

    #[error("Unknown voice: {voice}")]
    UnknownVoice { voice: String },

    // Synthesis errors (one chunk, recoverable)
    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    // Relay errors
    #[error("Delivery to {destination} failed: {message}")]
    Delivery { destination: String, message: String },

    #[error("Recipient {destination} not found")]
    RecipientNotFound { destination: String },

    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // Playback errors
    #[error("Playback failed: {message}")]
    Playback { message: String },

    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio encoding failed: {message}")]
    AudioEncode { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxError {
    /// True for delivery failures that a consumer re-establishment may fix.
    pub fn is_recipient_missing(&self) -> bool {
        matches!(self, VoxError::RecipientNotFound { .. })
    }
}

impl From<hound::Error> for VoxError {
    fn from(e: hound::Error) -> Self {
        VoxError::AudioEncode {
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VoxError>;
