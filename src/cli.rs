//! Command-line interface for voxread
//!
//! Provides argument parsing using clap derive macros.

use crate::defaults::MAX_CHUNK_CHARS;
use crate::player::view::PlaybackMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Read text aloud with a local neural TTS model
#[derive(Parser, Debug)]
#[command(name = "voxread", version, about = "Read text aloud with a local neural TTS model")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_mode(s: &str) -> Result<PlaybackMode, String> {
    s.parse::<PlaybackMode>().map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize and play text from a file or stdin
    Read {
        /// Text file to read (default: stdin)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Playback mode: streaming or full
        #[arg(long, value_name = "MODE", value_parser = parse_mode)]
        mode: Option<PlaybackMode>,

        /// Voice id (see `voxread voices`)
        #[arg(long, value_name = "VOICE")]
        voice: Option<String>,

        /// Playback speed for full mode (0.5 to 3.0)
        #[arg(long, value_name = "RATE")]
        speed: Option<f32>,

        /// Also write the generated audio to a WAV file
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,

        /// Audio output device name, or "null" for silent timed playback
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,
    },

    /// List available voices
    Voices {
        /// Only voices for this language tag (e.g. en-us, ja)
        #[arg(long, value_name = "LANG")]
        language: Option<String>,
    },

    /// Show how text is split into synthesis chunks
    Chunk {
        /// Text file to split (default: stdin)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Soft upper bound on characters per chunk
        #[arg(long, value_name = "N", default_value_t = MAX_CHUNK_CHARS)]
        max_chars: usize,
    },

    /// List audio output devices
    #[cfg(feature = "cpal-audio")]
    Devices,
}
