//! Consumer-side playback: controller, derived view and settings.

pub mod controller;
pub mod settings;
pub mod view;

pub use controller::PlaybackController;
pub use settings::{MemorySettingsStore, PlayerSettings, SettingsStore, TomlSettingsStore};
pub use view::{ModelView, PlaybackMode, PlaybackStatus, PlayerView, derive_view};
