//! Text-to-speech backends, voices and compute device selection.

pub mod command;
pub mod device;
pub mod synthesizer;
pub mod voices;

pub use command::CommandSynthesizer;
pub use device::{ComputeDevice, select_device};
pub use synthesizer::{MockSynthesizer, Synthesizer};
pub use voices::{VoiceInfo, VoiceSummary, get_voice, list_voices};
