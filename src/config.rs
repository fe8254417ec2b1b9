use crate::defaults;
use crate::engine::generation::EngineConfig;
use crate::error::{Result, VoxError};
use crate::player::settings::PlayerSettings;
use crate::player::view::PlaybackMode;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub engine: EngineSection,
    pub playback: PlayerSettings,
    pub session: SessionSection,
    pub relay: RelaySection,
}

/// Generation engine and synthesizer backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSection {
    pub max_chunk_chars: usize,
    pub max_queue_depth: usize,
    pub grace_period_ms: u64,
    pub force_cpu: bool,
    /// External TTS program; the mock synthesizer is used when unset.
    pub synthesizer_command: Option<String>,
    /// Arguments, may contain `{voice}` and `{device}`.
    pub synthesizer_args: Vec<String>,
}

/// Read session timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSection {
    pub init_timeout_secs: u64,
    pub init_poll_ms: u64,
    pub restart_delay_ms: u64,
}

/// Engine → consumer relay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelaySection {
    pub retry_delay_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_chunk_chars: defaults::MAX_CHUNK_CHARS,
            max_queue_depth: defaults::MAX_QUEUE_DEPTH,
            grace_period_ms: defaults::GRACE_PERIOD_MS,
            force_cpu: false,
            synthesizer_command: None,
            synthesizer_args: Vec::new(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            init_timeout_secs: defaults::INIT_TIMEOUT_SECS,
            init_poll_ms: defaults::INIT_POLL_MS,
            restart_delay_ms: defaults::RESTART_DELAY_MS,
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            retry_delay_ms: defaults::RELAY_RETRY_DELAY_MS,
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> VoxError {
    VoxError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values. The result is validated.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VoxError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VoxError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if it doesn't exist
    ///
    /// Only a missing file falls back to defaults; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VoxError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXREAD_VOICE → playback.voice
    /// - VOXREAD_MODE → playback.mode
    /// - VOXREAD_SYNTH_COMMAND → engine.synthesizer_command
    /// - VOXREAD_FORCE_CPU → engine.force_cpu
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(voice) = std::env::var("VOXREAD_VOICE")
            && !voice.is_empty()
        {
            self.playback.voice = voice;
        }

        if let Ok(mode) = std::env::var("VOXREAD_MODE")
            && !mode.is_empty()
        {
            self.playback.mode = mode.parse::<PlaybackMode>()?;
        }

        if let Ok(command) = std::env::var("VOXREAD_SYNTH_COMMAND")
            && !command.is_empty()
        {
            self.engine.synthesizer_command = Some(command);
        }

        if let Ok(force) = std::env::var("VOXREAD_FORCE_CPU")
            && !force.is_empty()
        {
            self.engine.force_cpu = matches!(force.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(self)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.playback.validate()?;
        if self.engine.max_chunk_chars == 0 {
            return Err(invalid("engine.max_chunk_chars", "must be greater than 0"));
        }
        if self.engine.max_queue_depth == 0 {
            return Err(invalid("engine.max_queue_depth", "must be greater than 0"));
        }
        if self.session.init_timeout_secs == 0 {
            return Err(invalid("session.init_timeout_secs", "must be greater than 0"));
        }
        if self.session.init_poll_ms == 0 {
            return Err(invalid("session.init_poll_ms", "must be greater than 0"));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxread/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("voxread").join("config.toml"))
            .ok_or_else(|| VoxError::Other("could not determine config directory".to_string()))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_chunk_chars: self.engine.max_chunk_chars,
            max_queue_depth: self.engine.max_queue_depth,
            grace_period: Duration::from_millis(self.engine.grace_period_ms),
            force_cpu: self.engine.force_cpu,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            voice: self.playback.voice.clone(),
            init_timeout: Duration::from_secs(self.session.init_timeout_secs),
            init_poll: Duration::from_millis(self.session.init_poll_ms),
            restart_delay: Duration::from_millis(self.session.restart_delay_ms),
        }
    }

    pub fn relay_retry_delay(&self) -> Duration {
        Duration::from_millis(self.relay.retry_delay_ms)
    }
}
