//! Persistence for player settings changed at runtime.

use crate::defaults::{DEFAULT_VOICE, MAX_SPEED, MIN_SPEED};
use crate::error::{Result, VoxError};
use crate::player::view::PlaybackMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// User-facing playback preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub mode: PlaybackMode,
    pub voice: String,
    pub speed: f32,
    pub volume: f32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::Streaming,
            voice: DEFAULT_VOICE.to_string(),
            speed: 1.0,
            volume: 1.0,
        }
    }
}

impl PlayerSettings {
    /// Reject values the player cannot honour.
    pub fn validate(&self) -> Result<()> {
        validate_speed(self.speed)?;
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(VoxError::ConfigInvalidValue {
                key: "volume".to_string(),
                message: format!("{} is outside 0.0..=1.0", self.volume),
            });
        }
        Ok(())
    }
}

pub fn validate_speed(speed: f32) -> Result<()> {
    if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(())
    } else {
        Err(VoxError::ConfigInvalidValue {
            key: "speed".to_string(),
            message: format!("{} is outside {}..={}", speed, MIN_SPEED, MAX_SPEED),
        })
    }
}

/// Where player settings are remembered between sessions.
pub trait SettingsStore: Send + Sync {
    /// Stored settings, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<PlayerSettings>>;

    fn save(&self, settings: &PlayerSettings) -> Result<()>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for Arc<T> {
    fn load(&self) -> Result<Option<PlayerSettings>> {
        (**self).load()
    }

    fn save(&self, settings: &PlayerSettings) -> Result<()> {
        (**self).save(settings)
    }
}

/// In-memory store for tests and one-shot runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    saved: Arc<Mutex<Option<PlayerSettings>>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent save, if any.
    pub fn saved(&self) -> Option<PlayerSettings> {
        self.saved.lock().ok().and_then(|s| s.clone())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Option<PlayerSettings>> {
        Ok(self.saved())
    }

    fn save(&self, settings: &PlayerSettings) -> Result<()> {
        if let Ok(mut saved) = self.saved.lock() {
            *saved = Some(settings.clone());
        }
        Ok(())
    }
}

/// Settings kept in a small TOML file next to the config.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/voxread/player.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxread").join("player.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load(&self) -> Result<Option<PlayerSettings>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let settings: PlayerSettings = toml::from_str(&contents)?;
        settings.validate()?;
        Ok(Some(settings))
    }

    fn save(&self, settings: &PlayerSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string(settings).map_err(|e| VoxError::ConfigParse {
            message: e.to_string(),
        })?;
        fs::write(&self.path, contents)?;
        tracing::debug!(path = %self.path.display(), "Saved player settings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PlayerSettings::default().validate().is_ok());
    }

    #[test]
    fn test_speed_bounds() {
        assert!(validate_speed(0.5).is_ok());
        assert!(validate_speed(3.0).is_ok());
        assert!(validate_speed(0.4).is_err());
        assert!(validate_speed(3.5).is_err());
    }

    #[test]
    fn test_volume_bounds() {
        let settings = PlayerSettings {
            volume: 1.5,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.load().unwrap(), None);
        let settings = PlayerSettings {
            speed: 1.5,
            ..Default::default()
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), Some(settings));
    }

    #[test]
    fn test_toml_store_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = TomlSettingsStore::new(dir.path().join("player.toml"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_toml_store_creates_parent_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = TomlSettingsStore::new(dir.path().join("nested").join("player.toml"));
        let settings = PlayerSettings {
            mode: PlaybackMode::Full,
            voice: "bf_emma".to_string(),
            speed: 1.25,
            volume: 0.8,
        };
        store.save(&settings).unwrap();

        let reopened = TomlSettingsStore::new(store.path());
        assert_eq!(reopened.load().unwrap(), Some(settings));
    }

    #[test]
    fn test_toml_store_rejects_out_of_range_speed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("player.toml");
        fs::write(&path, "speed = 9.0\n").unwrap();
        assert!(TomlSettingsStore::new(&path).load().is_err());
    }
}
