//! Derived player view.
//!
//! [`derive_view`] is a pure function of the player flags and the model
//! state. The coordinator recomputes the whole view after every event
//! instead of patching individual fields.

use crate::error::VoxError;
use crate::tts::device::ComputeDevice;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How audio reaches the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Play chunks as they arrive.
    #[default]
    Streaming,
    /// Play one assembled resource once generation completes.
    Full,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Streaming => write!(f, "streaming"),
            PlaybackMode::Full => write!(f, "full"),
        }
    }
}

impl FromStr for PlaybackMode {
    type Err = VoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "streaming" | "stream" => Ok(PlaybackMode::Streaming),
            "full" => Ok(PlaybackMode::Full),
            other => Err(VoxError::ConfigInvalidValue {
                key: "mode".to_string(),
                message: format!("expected 'streaming' or 'full', got '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Idle,
    Generating,
    Playing,
    Paused,
    Complete,
    Error,
}

/// Model state as last reported by the engine host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelView {
    pub loaded: bool,
    pub loading: bool,
    pub progress: f32,
    pub device: Option<ComputeDevice>,
}

/// Everything the view depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewInput {
    pub mode: PlaybackMode,
    pub status: PlaybackStatus,
    pub is_generating: bool,
    pub is_playing: bool,
    pub is_paused: bool,
    pub generation_complete: bool,
    pub chunk_count: usize,
    pub has_audio: bool,
    pub error: Option<String>,
    pub model: ModelView,
}

/// Status light shown next to the status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Idle,
    Loading,
    Generating,
    Playing,
    Paused,
    Complete,
    Ready,
    Error,
}

/// Icon on the play/pause control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayIcon {
    Play,
    Pause,
    /// Playing, but pausing is not available.
    PlayDisabled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerView {
    pub status_text: String,
    pub indicator: Indicator,
    /// Model download progress in percent, while loading.
    pub progress: Option<f32>,
    pub chunk_info: Option<String>,
    pub device_badge: Option<&'static str>,
    pub show_play_pause: bool,
    pub play_icon: PlayIcon,
    pub show_stop: bool,
    pub show_speed: bool,
    pub download_enabled: bool,
    pub mode_toggle_enabled: bool,
}

fn chunk_label(mode: PlaybackMode, count: usize) -> String {
    match mode {
        PlaybackMode::Full => format!("Processing: {} chunks", count),
        PlaybackMode::Streaming => format!("Chunks: {}", count),
    }
}

pub fn derive_view(input: &ViewInput) -> PlayerView {
    let streaming = input.mode == PlaybackMode::Streaming;
    let full = input.mode == PlaybackMode::Full;
    let can_pause = full || input.generation_complete;
    let active = input.is_playing && !input.is_paused;

    let play_icon = match (active, can_pause) {
        (true, true) => PlayIcon::Pause,
        (true, false) => PlayIcon::PlayDisabled,
        (false, _) => PlayIcon::Play,
    };

    let (status_text, indicator, progress, chunk_info) = if let Some(message) = &input.error {
        (format!("Error: {}", message), Indicator::Error, None, None)
    } else if input.model.loading {
        (
            format!("Downloading... {}% (one-time)", input.model.progress.round() as u32),
            Indicator::Loading,
            Some(input.model.progress),
            None,
        )
    } else if input.is_generating && !input.is_playing {
        let text = if full { "Generating audio..." } else { "Generating..." };
        (
            text.to_string(),
            Indicator::Generating,
            None,
            Some(chunk_label(input.mode, input.chunk_count)),
        )
    } else if active {
        let text = if input.is_generating { "Streaming..." } else { "Playing..." };
        let info = input
            .is_generating
            .then(|| chunk_label(PlaybackMode::Streaming, input.chunk_count));
        (text.to_string(), Indicator::Playing, None, info)
    } else if input.is_paused {
        let info = input
            .is_generating
            .then(|| chunk_label(PlaybackMode::Streaming, input.chunk_count));
        ("Paused".to_string(), Indicator::Paused, None, info)
    } else if input.generation_complete && input.has_audio {
        ("Ready to play".to_string(), Indicator::Complete, None, None)
    } else if input.model.loaded {
        ("Ready".to_string(), Indicator::Ready, None, None)
    } else {
        ("Initializing...".to_string(), Indicator::Idle, None, None)
    };

    PlayerView {
        status_text,
        indicator,
        progress,
        chunk_info,
        device_badge: input.model.device.map(|d| d.badge()),
        // Full mode holds audio back until completion, so there is nothing
        // to toggle while generating in either mode.
        show_play_pause: !input.is_generating,
        play_icon,
        show_stop: input.is_generating || (streaming && input.is_playing),
        show_speed: full && input.generation_complete,
        download_enabled: input.generation_complete && input.has_audio,
        mode_toggle_enabled: true,
    }
}
