//! Speaker output via cpal.
//!
//! One output stream is opened at the device's native config; a small mixer
//! behind a mutex feeds it from whichever primitive is active. Model-rate
//! audio is resampled to the device rate, and the buffered resource is
//! time-stretched when its rate changes.

use crate::audio::output::{AudioOutput, OutputEvent, OutputEvents, PlaybackId};
use crate::audio::stretch::time_stretch;
use crate::audio::wav::{self, resample};
use crate::defaults::{MAX_SPEED, MIN_SPEED, SAMPLE_RATE};
use crate::error::{Result, VoxError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is owned by `CpalOutput` and only touched through
/// `&mut self`, never from two threads at once.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

struct StreamingSource {
    id: PlaybackId,
    samples: Vec<f32>,
    cursor: usize,
}

struct BufferedResource {
    id: PlaybackId,
    /// Decoded audio at the model rate, unstretched.
    original: Vec<f32>,
    /// `original` stretched to the current rate and resampled to the device.
    rendered: Vec<f32>,
    cursor: usize,
    playing: bool,
}

struct Mixer {
    source: Option<StreamingSource>,
    resource: Option<BufferedResource>,
    volume: f32,
    events: OutputEvents,
}

impl Mixer {
    fn next_sample(&mut self) -> f32 {
        if let Some(source) = self.source.as_mut() {
            if let Some(&sample) = source.samples.get(source.cursor) {
                source.cursor += 1;
                return sample * self.volume;
            }
            let _ = self.events.send(OutputEvent::SourceEnded(source.id));
            self.source = None;
            return 0.0;
        }

        if let Some(resource) = self.resource.as_mut()
            && resource.playing
        {
            if let Some(&sample) = resource.rendered.get(resource.cursor) {
                resource.cursor += 1;
                return sample * self.volume;
            }
            resource.playing = false;
            let _ = self.events.send(OutputEvent::ResourceEnded(resource.id));
        }
        0.0
    }
}

/// Real playback through the default (or named) output device.
pub struct CpalOutput {
    _stream: SendableStream,
    mixer: Arc<Mutex<Mixer>>,
    device_rate: u32,
    rate: f32,
}

impl CpalOutput {
    /// Open an output device.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the default output device.
    /// * `events` - Channel that receives completion events.
    pub fn new(device_name: Option<&str>, events: OutputEvents) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| VoxError::Playback {
                    message: format!("Failed to enumerate output devices: {}", e),
                })?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| VoxError::AudioDeviceNotFound {
                    device: name.to_string(),
                })?,
            None => host
                .default_output_device()
                .ok_or_else(|| VoxError::AudioDeviceNotFound {
                    device: "default".to_string(),
                })?,
        };

        let supported = device
            .default_output_config()
            .map_err(|e| VoxError::Playback {
                message: format!("Failed to query default output config: {}", e),
            })?;
        let device_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let stream_config: cpal::StreamConfig = supported.clone().into();

        let mixer = Arc::new(Mutex::new(Mixer {
            source: None,
            resource: None,
            volume: 1.0,
            events,
        }));

        let err_callback = |err| {
            tracing::error!("Audio output stream error: {}", err);
        };

        let feed = Arc::clone(&mixer);
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut mixer) = feed.lock() {
                        for frame in data.chunks_mut(channels) {
                            let sample = mixer.next_sample();
                            frame.fill(sample);
                        }
                    }
                },
                err_callback,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut mixer) = feed.lock() {
                        for frame in data.chunks_mut(channels) {
                            let sample = wav::quantize(mixer.next_sample());
                            frame.fill(sample);
                        }
                    }
                },
                err_callback,
                None,
            ),
            fmt => {
                return Err(VoxError::Playback {
                    message: format!("Unsupported output sample format: {:?}", fmt),
                });
            }
        }
        .map_err(|e| VoxError::Playback {
            message: format!("Failed to build output stream: {}", e),
        })?;

        stream.play().map_err(|e| VoxError::Playback {
            message: format!("Failed to start output stream: {}", e),
        })?;

        tracing::info!(device_rate, channels, "Opened audio output");

        Ok(Self {
            _stream: SendableStream(stream),
            mixer,
            device_rate,
            rate: 1.0,
        })
    }

    fn render(&self, original: &[f32]) -> Vec<f32> {
        resample(
            &time_stretch(original, self.rate),
            SAMPLE_RATE,
            self.device_rate,
        )
    }

    fn with_mixer<R>(&self, f: impl FnOnce(&mut Mixer) -> R) -> Option<R> {
        self.mixer.lock().ok().map(|mut m| f(&mut m))
    }
}

impl AudioOutput for CpalOutput {
    fn start_source(&mut self, id: PlaybackId, samples: &[f32]) -> Result<()> {
        let samples = resample(samples, SAMPLE_RATE, self.device_rate);
        self.with_mixer(|m| {
            m.source = Some(StreamingSource {
                id,
                samples,
                cursor: 0,
            })
        });
        Ok(())
    }

    fn stop_source(&mut self) {
        self.with_mixer(|m| m.source = None);
    }

    fn load_resource(&mut self, id: PlaybackId, wav_bytes: &[u8]) -> Result<()> {
        let decoded = wav::decode_wav(Cursor::new(wav_bytes))?;
        let original = resample(&decoded.samples, decoded.sample_rate, SAMPLE_RATE);
        let rendered = self.render(&original);
        self.with_mixer(|m| {
            m.resource = Some(BufferedResource {
                id,
                original,
                rendered,
                cursor: 0,
                playing: false,
            })
        });
        Ok(())
    }

    fn play_resource(&mut self) -> Result<()> {
        let started = self
            .with_mixer(|m| match m.resource.as_mut() {
                Some(resource) => {
                    resource.playing = true;
                    true
                }
                None => false,
            })
            .unwrap_or(false);
        if started {
            Ok(())
        } else {
            Err(VoxError::Playback {
                message: "no audio loaded".to_string(),
            })
        }
    }

    fn pause_resource(&mut self) {
        self.with_mixer(|m| {
            if let Some(resource) = m.resource.as_mut() {
                resource.playing = false;
            }
        });
    }

    fn rewind_resource(&mut self) {
        self.with_mixer(|m| {
            if let Some(resource) = m.resource.as_mut() {
                resource.cursor = 0;
            }
        });
    }

    fn set_rate(&mut self, rate: f32) {
        let old_rate = self.rate;
        self.rate = rate.clamp(MIN_SPEED, MAX_SPEED);
        let Some(Some((original, cursor))) = self.with_mixer(|m| {
            m.resource
                .as_ref()
                .map(|r| (r.original.clone(), r.cursor))
        }) else {
            return;
        };

        // Keep the content position across the re-render.
        let content_secs = cursor as f64 / self.device_rate as f64 * old_rate as f64;
        let rendered = self.render(&original);
        let new_cursor = (content_secs / self.rate as f64 * self.device_rate as f64) as usize;
        self.with_mixer(|m| {
            if let Some(resource) = m.resource.as_mut() {
                resource.cursor = new_cursor.min(rendered.len());
                resource.rendered = rendered;
            }
        });
    }

    fn set_volume(&mut self, volume: f32) {
        self.with_mixer(|m| m.volume = volume.clamp(0.0, 1.0));
    }

    fn resource_position(&self) -> f64 {
        let rate = self.rate as f64;
        let device_rate = self.device_rate as f64;
        self.with_mixer(|m| {
            m.resource
                .as_ref()
                .map(|r| r.cursor as f64 / device_rate * rate)
                .unwrap_or(0.0)
        })
        .unwrap_or(0.0)
    }

    fn release_resource(&mut self) {
        self.with_mixer(|m| m.resource = None);
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

/// List output device names.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.output_devices().map_err(|e| VoxError::Playback {
        message: format!("Failed to enumerate output devices: {}", e),
    })?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}
