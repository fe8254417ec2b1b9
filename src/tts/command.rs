//! Synthesizer backed by an external TTS program.
//!
//! The program receives the chunk text on stdin and must write a WAV file to
//! stdout. Arguments may contain `{voice}` and `{device}` placeholders, which
//! are substituted per call. Any sample rate and channel count is accepted;
//! output is downmixed and resampled to 24kHz mono.

use crate::audio::wav::decode_wav_at_model_rate;
use crate::error::{Result, VoxError};
use crate::tts::device::ComputeDevice;
use crate::tts::synthesizer::Synthesizer;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

const VOICE_PLACEHOLDER: &str = "{voice}";
const DEVICE_PLACEHOLDER: &str = "{device}";

/// Phrase synthesized once during load to check the program works.
const WARMUP_TEXT: &str = "Ready.";

#[derive(Debug)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
    device: Mutex<Option<ComputeDevice>>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            device: Mutex::new(None),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn current_device(&self) -> ComputeDevice {
        self.device
            .lock()
            .ok()
            .and_then(|d| *d)
            .unwrap_or(ComputeDevice::Cpu)
    }

    fn run(&self, text: &str, voice: &str, device: ComputeDevice) -> Result<Vec<u8>> {
        let args = expand_args(&self.args, voice, device);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    VoxError::ModelLoad {
                        message: format!("TTS program '{}' not found", self.program),
                    }
                } else {
                    VoxError::Synthesis {
                        message: format!("Failed to execute {}: {}", self.program, e),
                    }
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // Programs that take their input from arguments may close stdin early.
            if let Err(e) = stdin.write_all(text.as_bytes())
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(VoxError::Synthesis {
                    message: format!("Failed to write text to {}: {}", self.program, e),
                });
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoxError::Synthesis {
                message: format!(
                    "{} failed with status {:?}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ),
            });
        }
        Ok(output.stdout)
    }
}

/// Substitute placeholders in the configured arguments.
pub fn expand_args(args: &[String], voice: &str, device: ComputeDevice) -> Vec<String> {
    let device = device.to_string();
    args.iter()
        .map(|arg| {
            arg.replace(VOICE_PLACEHOLDER, voice)
                .replace(DEVICE_PLACEHOLDER, &device)
        })
        .collect()
}

impl Synthesizer for CommandSynthesizer {
    fn load(&self, device: ComputeDevice, progress: &dyn Fn(f32)) -> Result<()> {
        progress(0.0);
        let wav = self
            .run(WARMUP_TEXT, crate::defaults::DEFAULT_VOICE, device)
            .map_err(|e| VoxError::ModelLoad {
                message: e.to_string(),
            })?;
        decode_wav_at_model_rate(&wav).map_err(|e| VoxError::ModelLoad {
            message: format!("{} did not produce a WAV file: {}", self.program, e),
        })?;
        if let Ok(mut slot) = self.device.lock() {
            *slot = Some(device);
        }
        progress(100.0);
        Ok(())
    }

    fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<f32>> {
        let wav = self.run(text, voice, self.current_device())?;
        decode_wav_at_model_rate(&wav).map_err(|e| VoxError::Synthesis {
            message: format!("Invalid audio from {}: {}", self.program, e),
        })
    }

    /// Only a program that is told which device to use can be accelerated.
    fn supports_acceleration(&self) -> Result<bool> {
        Ok(self.args.iter().any(|a| a.contains(DEVICE_PLACEHOLDER)))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_args_substitutes_placeholders() {
        let args = vec![
            "--voice={voice}".to_string(),
            "--device".to_string(),
            "{device}".to_string(),
            "-".to_string(),
        ];
        let expanded = expand_args(&args, "bf_emma", ComputeDevice::Gpu);
        assert_eq!(expanded, vec!["--voice=bf_emma", "--device", "gpu", "-"]);
    }

    #[test]
    fn test_acceleration_requires_device_placeholder() {
        let plain = CommandSynthesizer::new("tts", vec!["--voice".into(), "{voice}".into()]);
        assert!(!plain.supports_acceleration().unwrap());

        let with_device = CommandSynthesizer::new("tts", vec!["--device={device}".into()]);
        assert!(with_device.supports_acceleration().unwrap());
    }

    #[test]
    fn test_missing_program_is_load_failure() {
        let synth = CommandSynthesizer::new("voxread-no-such-program-xyz", vec![]);
        let result = synth.load(ComputeDevice::Cpu, &|_| {});
        assert!(matches!(result, Err(VoxError::ModelLoad { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_program_output_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let wav = crate::audio::wav::encode_wav(&[0.5; 2400], 24000).unwrap();
        std::fs::write(&path, wav).unwrap();

        let synth = CommandSynthesizer::new("cat", vec![path.to_string_lossy().to_string()]);
        synth.load(ComputeDevice::Cpu, &|_| {}).unwrap();
        let samples = synth.synthesize("Hello world.", "af_heart").unwrap();

        assert_eq!(samples.len(), 2400);
        assert!((samples[0] - 0.5).abs() < 1e-3);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_wav_output_fails_load() {
        let synth = CommandSynthesizer::new("echo", vec!["not audio".into()]);
        let result = synth.load(ComputeDevice::Cpu, &|_| {});
        assert!(matches!(result, Err(VoxError::ModelLoad { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_is_synthesis_error() {
        let synth = CommandSynthesizer::new("false", vec![]);
        let result = synth.synthesize("Hello", "af_heart");
        assert!(matches!(result, Err(VoxError::Synthesis { .. })));
    }
}
