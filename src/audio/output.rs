//! Audio output abstraction for playback.
//!
//! An output offers two primitives. A *streaming source* plays one buffer of
//! samples once and reports when it ran to its end. A *buffered resource*
//! holds an encoded WAV, can be played, paused, rewound and rate-controlled,
//! and reports when it reaches its end. Completion is reported through an
//! [`OutputEvent`] channel handed to the output at construction.

use crate::audio::wav::{self, DecodedAudio};
use crate::defaults::{MAX_SPEED, MIN_SPEED};
use crate::error::Result;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Identifier the controller assigns to each source or resource it starts.
pub type PlaybackId = u64;

/// Completion notifications sent by an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// The streaming source played to its end without being stopped.
    SourceEnded(PlaybackId),
    /// The buffered resource reached its end.
    ResourceEnded(PlaybackId),
}

/// Sender half used by outputs to report completion.
pub type OutputEvents = mpsc::UnboundedSender<OutputEvent>;

/// Trait for audio playback devices.
///
/// Implementations must never report `SourceEnded` for a source that was
/// stopped, and must never report `ResourceEnded` after the resource was
/// paused or released.
pub trait AudioOutput: Send {
    /// Play `samples` (mono, model sample rate) once as a streaming source.
    fn start_source(&mut self, id: PlaybackId, samples: &[f32]) -> Result<()>;

    /// Stop the current streaming source, if any.
    fn stop_source(&mut self);

    /// Load an encoded WAV as the buffered resource, replacing any previous one.
    fn load_resource(&mut self, id: PlaybackId, wav: &[u8]) -> Result<()>;

    /// Start or resume the buffered resource from its current position.
    fn play_resource(&mut self) -> Result<()>;

    /// Pause the buffered resource, keeping its position.
    fn pause_resource(&mut self);

    /// Move the buffered resource back to its start.
    fn rewind_resource(&mut self);

    /// Set the buffered resource's playback rate (pitch preserving).
    fn set_rate(&mut self, rate: f32);

    /// Set the output volume for both primitives, in `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32);

    /// Content position of the buffered resource in seconds.
    fn resource_position(&self) -> f64;

    /// Drop the buffered resource.
    fn release_resource(&mut self);

    /// Short name for logs and diagnostics.
    fn name(&self) -> &str;
}

impl AudioOutput for Box<dyn AudioOutput> {
    fn start_source(&mut self, id: PlaybackId, samples: &[f32]) -> Result<()> {
        (**self).start_source(id, samples)
    }

    fn stop_source(&mut self) {
        (**self).stop_source()
    }

    fn load_resource(&mut self, id: PlaybackId, wav: &[u8]) -> Result<()> {
        (**self).load_resource(id, wav)
    }

    fn play_resource(&mut self) -> Result<()> {
        (**self).play_resource()
    }

    fn pause_resource(&mut self) {
        (**self).pause_resource()
    }

    fn rewind_resource(&mut self) {
        (**self).rewind_resource()
    }

    fn set_rate(&mut self, rate: f32) {
        (**self).set_rate(rate)
    }

    fn set_volume(&mut self, volume: f32) {
        (**self).set_volume(volume)
    }

    fn resource_position(&self) -> f64 {
        (**self).resource_position()
    }

    fn release_resource(&mut self) {
        (**self).release_resource()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A call made on an output, as recorded by [`OutputLog`].
#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    StartSource { id: PlaybackId, samples: usize },
    StopSource,
    LoadResource { id: PlaybackId, samples: usize },
    PlayResource,
    PauseResource,
    RewindResource,
    SetRate(f32),
    SetVolume(f32),
    ReleaseResource,
}

/// Shared, cloneable record of output calls.
#[derive(Debug, Clone, Default)]
pub struct OutputLog {
    calls: Arc<Mutex<Vec<OutputCall>>>,
}

impl OutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: OutputCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    /// Snapshot of every call recorded so far.
    pub fn calls(&self) -> Vec<OutputCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of streaming sources started.
    pub fn sources_started(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, OutputCall::StartSource { .. }))
            .count()
    }

    /// Number of buffered resources loaded.
    pub fn resources_loaded(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, OutputCall::LoadResource { .. }))
            .count()
    }
}

fn decode(wav: &[u8]) -> Result<DecodedAudio> {
    wav::decode_wav(Cursor::new(wav))
}

/// Output that records calls and never completes anything on its own.
///
/// Tests drive completion by feeding [`OutputEvent`]s to the controller.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    log: OutputLog,
}

impl RecordingOutput {
    pub fn new(log: OutputLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> OutputLog {
        self.log.clone()
    }
}

impl AudioOutput for RecordingOutput {
    fn start_source(&mut self, id: PlaybackId, samples: &[f32]) -> Result<()> {
        self.log.record(OutputCall::StartSource {
            id,
            samples: samples.len(),
        });
        Ok(())
    }

    fn stop_source(&mut self) {
        self.log.record(OutputCall::StopSource);
    }

    fn load_resource(&mut self, id: PlaybackId, wav: &[u8]) -> Result<()> {
        let audio = decode(wav)?;
        self.log.record(OutputCall::LoadResource {
            id,
            samples: audio.samples.len(),
        });
        Ok(())
    }

    fn play_resource(&mut self) -> Result<()> {
        self.log.record(OutputCall::PlayResource);
        Ok(())
    }

    fn pause_resource(&mut self) {
        self.log.record(OutputCall::PauseResource);
    }

    fn rewind_resource(&mut self) {
        self.log.record(OutputCall::RewindResource);
    }

    fn set_rate(&mut self, rate: f32) {
        self.log.record(OutputCall::SetRate(rate));
    }

    fn set_volume(&mut self, volume: f32) {
        self.log.record(OutputCall::SetVolume(volume));
    }

    fn resource_position(&self) -> f64 {
        0.0
    }

    fn release_resource(&mut self) {
        self.log.record(OutputCall::ReleaseResource);
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct ClockedResource {
    id: PlaybackId,
    duration: f64,
    /// Content position at the last play/pause/rate change.
    position: f64,
    /// Set while playing.
    started_at: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    /// Set by the timer once the end was reached.
    ended: Arc<AtomicBool>,
}

impl ClockedResource {
    fn is_playing(&self) -> bool {
        self.started_at.is_some() && !self.ended.load(Ordering::SeqCst)
    }

    fn position(&self, rate: f32) -> f64 {
        if self.ended.load(Ordering::SeqCst) {
            return self.duration;
        }
        let running = self
            .started_at
            .map(|t| t.elapsed().as_secs_f64() * rate as f64)
            .unwrap_or(0.0);
        (self.position + running).min(self.duration)
    }

    fn halt(&mut self, rate: f32) {
        self.position = self.position(rate);
        self.started_at = None;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Headless output that plays nothing but keeps real time.
///
/// Sources end after their duration; the resource ends after its remaining
/// duration divided by the rate. Must be used from within a tokio runtime.
pub struct ClockedOutput {
    events: OutputEvents,
    log: OutputLog,
    source_timer: Option<JoinHandle<()>>,
    resource: Option<ClockedResource>,
    rate: f32,
}

impl ClockedOutput {
    pub fn new(events: OutputEvents) -> Self {
        Self {
            events,
            log: OutputLog::new(),
            source_timer: None,
            resource: None,
            rate: 1.0,
        }
    }

    /// Record calls into `log`.
    pub fn with_log(mut self, log: OutputLog) -> Self {
        self.log = log;
        self
    }

    fn arm_resource_timer(&mut self) {
        let rate = self.rate;
        let Some(resource) = self.resource.as_mut() else {
            return;
        };
        let remaining = (resource.duration - resource.position).max(0.0) / rate as f64;
        let id = resource.id;
        let events = self.events.clone();
        let ended = Arc::new(AtomicBool::new(false));
        resource.ended = Arc::clone(&ended);
        resource.started_at = Some(Instant::now());
        resource.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(remaining)).await;
            ended.store(true, Ordering::SeqCst);
            let _ = events.send(OutputEvent::ResourceEnded(id));
        }));
    }
}

impl AudioOutput for ClockedOutput {
    fn start_source(&mut self, id: PlaybackId, samples: &[f32]) -> Result<()> {
        self.stop_source();
        self.log.record(OutputCall::StartSource {
            id,
            samples: samples.len(),
        });
        let duration = Duration::from_secs_f64(wav::duration_secs(samples.len()));
        let events = self.events.clone();
        self.source_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = events.send(OutputEvent::SourceEnded(id));
        }));
        Ok(())
    }

    fn stop_source(&mut self) {
        if let Some(timer) = self.source_timer.take() {
            timer.abort();
            self.log.record(OutputCall::StopSource);
        }
    }

    fn load_resource(&mut self, id: PlaybackId, wav: &[u8]) -> Result<()> {
        let audio = decode(wav)?;
        self.release_resource();
        self.log.record(OutputCall::LoadResource {
            id,
            samples: audio.samples.len(),
        });
        self.resource = Some(ClockedResource {
            id,
            duration: audio.duration_secs(),
            position: 0.0,
            started_at: None,
            timer: None,
            ended: Arc::new(AtomicBool::new(false)),
        });
        Ok(())
    }

    fn play_resource(&mut self) -> Result<()> {
        let rate = self.rate;
        let Some(resource) = self.resource.as_mut() else {
            return Err(crate::error::VoxError::Playback {
                message: "no audio loaded".to_string(),
            });
        };
        resource.halt(rate);
        self.log.record(OutputCall::PlayResource);
        self.arm_resource_timer();
        Ok(())
    }

    fn pause_resource(&mut self) {
        let rate = self.rate;
        if let Some(resource) = self.resource.as_mut() {
            resource.halt(rate);
            self.log.record(OutputCall::PauseResource);
        }
    }

    fn rewind_resource(&mut self) {
        let rate = self.rate;
        if let Some(resource) = self.resource.as_mut() {
            let playing = resource.is_playing();
            resource.halt(rate);
            resource.position = 0.0;
            resource.ended.store(false, Ordering::SeqCst);
            self.log.record(OutputCall::RewindResource);
            if playing {
                self.arm_resource_timer();
            }
        }
    }

    fn set_rate(&mut self, rate: f32) {
        let rate = rate.clamp(MIN_SPEED, MAX_SPEED);
        self.log.record(OutputCall::SetRate(rate));
        let old = self.rate;
        let playing = match self.resource.as_mut() {
            Some(resource) => {
                let playing = resource.is_playing();
                resource.halt(old);
                playing
            }
            None => false,
        };
        self.rate = rate;
        if playing {
            self.arm_resource_timer();
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.log.record(OutputCall::SetVolume(volume));
    }

    fn resource_position(&self) -> f64 {
        self.resource
            .as_ref()
            .map(|r| r.position(self.rate))
            .unwrap_or(0.0)
    }

    fn release_resource(&mut self) {
        let rate = self.rate;
        if let Some(mut resource) = self.resource.take() {
            resource.halt(rate);
            self.log.record(OutputCall::ReleaseResource);
        }
    }

    fn name(&self) -> &str {
        "clocked"
    }
}

impl Drop for ClockedOutput {
    fn drop(&mut self) {
        self.stop_source();
        self.release_resource();
    }
}
