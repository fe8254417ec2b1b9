//! Playback controller.
//!
//! Owns the audio output and everything received for the current session:
//! the streaming queue, the archive of every chunk, and the play/pause
//! flags the view is derived from.
//!
//! In streaming mode chunks start playing as they arrive; the queue head is
//! removed only after its source ran to the end, so pause or stop never
//! skips audio. In full mode chunks only go to the archive until generation
//! completes, then the archive is assembled into one WAV resource with rate
//! control. Replay after completion always uses that combined resource.

use crate::audio::output::{AudioOutput, OutputEvent, PlaybackId};
use crate::audio::wav;
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, VoxError};
use crate::ipc::protocol::{AudioChunk, SessionId};
use crate::player::settings::{PlayerSettings, SettingsStore, validate_speed};
use crate::player::view::{ModelView, PlaybackMode, PlaybackStatus, PlayerView, ViewInput, derive_view};
use std::collections::VecDeque;
use std::sync::Arc;

pub struct PlaybackController<O: AudioOutput> {
    output: O,
    mode: PlaybackMode,
    settings: PlayerSettings,
    store: Arc<dyn SettingsStore>,
    /// Session whose chunks are accepted.
    session: Option<SessionId>,
    queue: VecDeque<Arc<[f32]>>,
    archive: Vec<Arc<[f32]>>,
    is_generating: bool,
    is_playing: bool,
    is_paused: bool,
    generation_complete: bool,
    chunk_count: usize,
    expected_chunks: Option<usize>,
    error: Option<String>,
    next_id: PlaybackId,
    source: Option<PlaybackId>,
    resource: Option<PlaybackId>,
    /// Seconds of streamed audio that played to the end.
    streamed_secs: f64,
}

impl<O: AudioOutput> PlaybackController<O> {
    pub fn new(mut output: O, settings: PlayerSettings, store: Arc<dyn SettingsStore>) -> Self {
        output.set_volume(settings.volume);
        Self {
            output,
            mode: settings.mode,
            settings,
            store,
            session: None,
            queue: VecDeque::new(),
            archive: Vec::new(),
            is_generating: false,
            is_playing: false,
            is_paused: false,
            generation_complete: false,
            chunk_count: 0,
            expected_chunks: None,
            error: None,
            next_id: 0,
            source: None,
            resource: None,
            streamed_secs: 0.0,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn generation_complete(&self) -> bool {
        self.generation_complete
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Chunk total announced by the engine for the current session.
    pub fn expected_chunks(&self) -> Option<usize> {
        self.expected_chunks
    }

    /// Chunks waiting in the streaming queue, including the one playing.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn status(&self) -> PlaybackStatus {
        if self.error.is_some() {
            PlaybackStatus::Error
        } else if self.is_paused {
            PlaybackStatus::Paused
        } else if self.is_playing {
            PlaybackStatus::Playing
        } else if self.is_generating {
            PlaybackStatus::Generating
        } else if self.generation_complete {
            PlaybackStatus::Complete
        } else {
            PlaybackStatus::Idle
        }
    }

    /// Playback position in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        if self.resource.is_some() {
            self.output.resource_position()
        } else {
            self.streamed_secs
        }
    }

    pub fn view(&self, model: &ModelView) -> PlayerView {
        derive_view(&ViewInput {
            mode: self.mode,
            status: self.status(),
            is_generating: self.is_generating,
            is_playing: self.is_playing,
            is_paused: self.is_paused,
            generation_complete: self.generation_complete,
            chunk_count: self.chunk_count,
            has_audio: !self.archive.is_empty(),
            error: self.error.clone(),
            model: model.clone(),
        })
    }

    /// Reset for a new generation and mark it in flight.
    pub fn begin_generation(&mut self) {
        self.reset();
        self.is_generating = true;
    }

    /// Accept chunks of `session` from now on.
    pub fn attach(&mut self, session: SessionId) {
        self.session = Some(session);
    }

    fn accepts(&self, session: SessionId) -> bool {
        self.session == Some(session)
    }

    pub fn on_chunk_count(&mut self, session: SessionId, count: usize) {
        if self.accepts(session) {
            self.expected_chunks = Some(count);
        }
    }

    pub fn on_chunk(&mut self, chunk: AudioChunk) -> Result<()> {
        if !self.accepts(chunk.session_id) || !self.is_generating {
            tracing::debug!(
                session = chunk.session_id,
                sequence = chunk.sequence,
                "Dropping chunk from another session"
            );
            return Ok(());
        }
        if chunk.sequence as usize != self.archive.len() {
            tracing::warn!(
                expected = self.archive.len(),
                got = chunk.sequence,
                "Chunk sequence gap"
            );
        }

        let samples: Arc<[f32]> = chunk.samples.into();
        self.archive.push(Arc::clone(&samples));
        self.chunk_count += 1;

        if self.mode == PlaybackMode::Streaming {
            self.queue.push_back(samples);
            if !self.is_playing && !self.is_paused {
                self.start_head()?;
            }
        }
        Ok(())
    }

    pub fn on_complete(&mut self, session: SessionId) -> Result<()> {
        if !self.accepts(session) || !self.is_generating {
            return Ok(());
        }
        self.is_generating = false;
        self.generation_complete = true;
        tracing::info!(session, chunks = self.chunk_count, mode = %self.mode, "Generation complete");

        if self.mode == PlaybackMode::Full && !self.archive.is_empty() {
            self.play_combined()?;
        }
        Ok(())
    }

    /// Handle a terminal error. Session-less errors always apply.
    pub fn on_error(&mut self, session: Option<SessionId>, message: &str) {
        if let Some(session) = session
            && !self.accepts(session)
        {
            return;
        }
        self.fail(message);
    }

    /// Enter the error state, halting playback but keeping the archive.
    pub fn fail(&mut self, message: &str) {
        tracing::warn!("Playback error: {}", message);
        self.halt_source();
        if self.resource.is_some() {
            self.output.pause_resource();
        }
        self.is_generating = false;
        self.is_playing = false;
        self.is_paused = false;
        self.error = Some(message.to_string());
    }

    pub fn on_output(&mut self, event: OutputEvent) -> Result<()> {
        match event {
            OutputEvent::SourceEnded(id) => {
                if self.source != Some(id) {
                    return Ok(());
                }
                self.source = None;
                if let Some(head) = self.queue.pop_front() {
                    self.streamed_secs += wav::duration_secs(head.len());
                }
                if self.queue.is_empty() {
                    // More chunks restart playback when they arrive.
                    self.is_playing = false;
                    Ok(())
                } else {
                    self.start_head()
                }
            }
            OutputEvent::ResourceEnded(id) => {
                if self.resource != Some(id) {
                    return Ok(());
                }
                self.is_playing = false;
                self.is_paused = false;
                self.output.rewind_resource();
                Ok(())
            }
        }
    }

    /// Play/pause control.
    ///
    /// Does nothing while generating: streaming cannot re-buffer mid-stream
    /// and full mode has nothing to play yet.
    pub fn toggle_play_pause(&mut self) -> Result<()> {
        if self.is_generating {
            tracing::debug!(mode = %self.mode, "Play/pause ignored while generating");
            return Ok(());
        }
        self.error = None;

        if self.resource.is_some() {
            if self.is_playing && !self.is_paused {
                self.output.pause_resource();
                self.is_paused = true;
            } else {
                self.output.play_resource()?;
                self.is_playing = true;
                self.is_paused = false;
            }
            return Ok(());
        }

        if self.is_playing && !self.is_paused {
            self.halt_source();
            self.is_paused = true;
        } else if !self.queue.is_empty() {
            self.start_head()?;
        } else if self.generation_complete && !self.archive.is_empty() {
            self.play_combined()?;
        }
        Ok(())
    }

    /// Stop playback and discard the session.
    pub fn stop(&mut self) {
        self.reset();
        tracing::debug!("Playback stopped");
    }

    /// Switch mode. Returns whether a generation was in flight, in which
    /// case the caller restarts it under the new mode.
    pub fn switch_mode(&mut self, mode: PlaybackMode) -> bool {
        let was_generating = self.is_generating;
        if was_generating || self.is_playing {
            self.reset();
        } else {
            self.release_resource();
        }
        tracing::info!(from = %self.mode, to = %mode, was_generating, "Switching playback mode");
        self.mode = mode;
        was_generating
    }

    /// Change the resource playback rate and persist it.
    pub fn set_speed(&mut self, speed: f32) -> Result<()> {
        validate_speed(speed)?;
        self.settings.speed = speed;
        if self.resource.is_some() {
            self.output.set_rate(speed);
        }
        self.store.save(&self.settings)
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        let settings = PlayerSettings {
            volume,
            ..self.settings.clone()
        };
        settings.validate()?;
        self.settings = settings;
        self.output.set_volume(volume);
        self.store.save(&self.settings)
    }

    /// Encode the archive as one WAV file.
    ///
    /// # Errors
    /// `VoxError::Playback` until a generation completed with audio
    pub fn export(&self) -> Result<Vec<u8>> {
        if !self.generation_complete || self.archive.is_empty() {
            return Err(VoxError::Playback {
                message: "no audio to export until generation completes".to_string(),
            });
        }
        let samples = wav::concat(self.archive.iter().map(|c| &c[..]));
        wav::encode_wav(&samples, SAMPLE_RATE)
    }

    fn next_playback_id(&mut self) -> PlaybackId {
        self.next_id += 1;
        self.next_id
    }

    fn start_head(&mut self) -> Result<()> {
        let Some(head) = self.queue.front().cloned() else {
            return Ok(());
        };
        self.release_resource();
        let id = self.next_playback_id();
        self.output.start_source(id, &head)?;
        self.source = Some(id);
        self.is_playing = true;
        self.is_paused = false;
        Ok(())
    }

    fn play_combined(&mut self) -> Result<()> {
        self.halt_source();
        self.release_resource();

        let samples = wav::concat(self.archive.iter().map(|c| &c[..]));
        let encoded = wav::encode_wav(&samples, SAMPLE_RATE)?;
        let id = self.next_playback_id();
        self.output.load_resource(id, &encoded)?;
        self.resource = Some(id);
        self.output.set_rate(self.settings.speed);
        self.output.set_volume(self.settings.volume);
        self.output.play_resource()?;
        self.is_playing = true;
        self.is_paused = false;
        tracing::debug!(
            samples = samples.len(),
            secs = wav::duration_secs(samples.len()),
            "Playing combined resource"
        );
        Ok(())
    }

    fn halt_source(&mut self) {
        if self.source.take().is_some() {
            self.output.stop_source();
        }
    }

    fn release_resource(&mut self) {
        if self.resource.take().is_some() {
            self.output.release_resource();
        }
    }

    fn reset(&mut self) {
        self.halt_source();
        self.release_resource();
        self.session = None;
        self.queue.clear();
        self.archive.clear();
        self.is_generating = false;
        self.is_playing = false;
        self.is_paused = false;
        self.generation_complete = false;
        self.chunk_count = 0;
        self.expected_chunks = None;
        self.error = None;
        self.streamed_secs = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::{OutputCall, OutputLog, RecordingOutput};
    use crate::player::settings::MemorySettingsStore;

    fn controller(mode: PlaybackMode) -> (PlaybackController<RecordingOutput>, OutputLog, MemorySettingsStore) {
        let log = OutputLog::new();
        let store = MemorySettingsStore::new();
        let settings = PlayerSettings {
            mode,
            ..Default::default()
        };
        let controller = PlaybackController::new(
            RecordingOutput::new(log.clone()),
            settings,
            Arc::new(store.clone()),
        );
        (controller, log, store)
    }

    fn chunk(session_id: SessionId, sequence: u32, len: usize) -> AudioChunk {
        AudioChunk {
            session_id,
            sequence,
            samples: vec![0.1; len],
            source_text: format!("chunk {}", sequence),
        }
    }

    fn started(log: &OutputLog) -> Vec<(PlaybackId, usize)> {
        log.calls()
            .into_iter()
            .filter_map(|c| match c {
                OutputCall::StartSource { id, samples } => Some((id, samples)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_streaming_plays_first_chunk_immediately() {
        let (mut c, log, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(1);

        c.on_chunk(chunk(1, 0, 100)).unwrap();
        c.on_chunk(chunk(1, 1, 200)).unwrap();

        assert_eq!(started(&log), vec![(1, 100)]);
        assert_eq!(c.status(), PlaybackStatus::Playing);
        assert_eq!(c.queued(), 2);

        c.on_output(OutputEvent::SourceEnded(1)).unwrap();
        assert_eq!(started(&log), vec![(1, 100), (2, 200)]);
        assert_eq!(c.queued(), 1);
    }

    #[test]
    fn test_streaming_waits_for_more_chunks_when_queue_drains() {
        let (mut c, log, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        c.on_output(OutputEvent::SourceEnded(1)).unwrap();

        assert!(!c.is_playing());
        assert_eq!(c.status(), PlaybackStatus::Generating);

        c.on_chunk(chunk(1, 1, 50)).unwrap();
        assert_eq!(started(&log).len(), 2);
    }

    #[test]
    fn test_chunks_of_other_sessions_are_dropped() {
        let (mut c, log, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(2);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        assert!(started(&log).is_empty());
        assert_eq!(c.chunk_count(), 0);
    }

    #[test]
    fn test_stale_source_end_is_ignored() {
        let (mut c, log, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        c.on_output(OutputEvent::SourceEnded(42)).unwrap();
        assert_eq!(c.queued(), 1);
        assert_eq!(started(&log).len(), 1);
    }

    #[test]
    fn test_pause_disallowed_while_streaming_generation_runs() {
        let (mut c, log, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();

        c.toggle_play_pause().unwrap();
        assert_eq!(c.status(), PlaybackStatus::Playing);
        assert!(!log.calls().contains(&OutputCall::StopSource));
    }

    #[test]
    fn test_pause_after_completion_keeps_head() {
        let (mut c, log, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        c.on_complete(1).unwrap();

        c.toggle_play_pause().unwrap();
        assert_eq!(c.status(), PlaybackStatus::Paused);
        assert_eq!(c.queued(), 1);

        c.toggle_play_pause().unwrap();
        assert_eq!(c.status(), PlaybackStatus::Playing);
        assert_eq!(started(&log), vec![(1, 100), (2, 100)]);
    }

    #[test]
    fn test_streaming_replay_uses_combined_resource() {
        let (mut c, log, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        c.on_chunk(chunk(1, 1, 60)).unwrap();
        c.on_complete(1).unwrap();
        c.on_output(OutputEvent::SourceEnded(1)).unwrap();
        c.on_output(OutputEvent::SourceEnded(2)).unwrap();
        assert_eq!(c.status(), PlaybackStatus::Complete);

        c.toggle_play_pause().unwrap();
        assert!(log.calls().contains(&OutputCall::LoadResource { id: 3, samples: 160 }));
        assert_eq!(c.status(), PlaybackStatus::Playing);
    }

    #[test]
    fn test_full_mode_accumulates_then_plays_one_resource() {
        let (mut c, log, _) = controller(PlaybackMode::Full);
        c.begin_generation();
        c.attach(1);
        c.on_chunk_count(1, 3);
        for sequence in 0..3 {
            c.on_chunk(chunk(1, sequence, 100)).unwrap();
        }
        assert_eq!(log.sources_started(), 0);
        assert_eq!(log.resources_loaded(), 0);
        assert_eq!(c.status(), PlaybackStatus::Generating);
        assert_eq!(c.expected_chunks(), Some(3));

        c.on_complete(1).unwrap();
        assert_eq!(log.resources_loaded(), 1);
        assert!(log.calls().contains(&OutputCall::LoadResource { id: 1, samples: 300 }));
        assert!(log.calls().contains(&OutputCall::SetRate(1.0)));
        assert!(log.calls().contains(&OutputCall::PlayResource));
        assert_eq!(log.sources_started(), 0);
        assert_eq!(c.status(), PlaybackStatus::Playing);
        assert!(c.view(&ModelView::default()).show_speed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resource_ends_once_and_replays_from_start() {
        use crate::audio::output::ClockedOutput;
        use std::time::Duration;
        use tokio::sync::mpsc;
        use tokio::time::Instant;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut c = PlaybackController::new(
            ClockedOutput::new(tx),
            PlayerSettings {
                mode: PlaybackMode::Full,
                ..Default::default()
            },
            Arc::new(MemorySettingsStore::new()),
        );
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, SAMPLE_RATE as usize)).unwrap();
        c.on_complete(1).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut ends = 0;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            ends += 1;
            c.on_output(event).unwrap();
        }
        assert_eq!(ends, 1);
        assert_eq!(c.status(), PlaybackStatus::Complete);

        c.toggle_play_pause().unwrap();
        let replayed = Instant::now();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, OutputEvent::ResourceEnded(_)));
        assert!(replayed.elapsed() >= Duration::from_millis(999));
    }

    #[test]
    fn test_resource_end_rewinds_for_replay() {
        let (mut c, log, _) = controller(PlaybackMode::Full);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        c.on_complete(1).unwrap();

        c.on_output(OutputEvent::ResourceEnded(1)).unwrap();
        assert_eq!(c.status(), PlaybackStatus::Complete);
        assert!(log.calls().contains(&OutputCall::RewindResource));

        c.toggle_play_pause().unwrap();
        assert_eq!(c.status(), PlaybackStatus::Playing);
        assert_eq!(log.resources_loaded(), 1);
    }

    #[test]
    fn test_full_mode_pause_and_resume() {
        let (mut c, log, _) = controller(PlaybackMode::Full);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        c.on_complete(1).unwrap();

        c.toggle_play_pause().unwrap();
        assert_eq!(c.status(), PlaybackStatus::Paused);
        assert!(log.calls().contains(&OutputCall::PauseResource));
        c.toggle_play_pause().unwrap();
        assert_eq!(c.status(), PlaybackStatus::Playing);
    }

    #[test]
    fn test_empty_completion_is_complete_without_audio() {
        let (mut c, log, _) = controller(PlaybackMode::Full);
        c.begin_generation();
        c.attach(1);
        c.on_complete(1).unwrap();
        assert_eq!(c.status(), PlaybackStatus::Complete);
        assert_eq!(log.resources_loaded(), 0);
        assert!(c.export().is_err());
    }

    #[test]
    fn test_stop_resets_and_releases() {
        let (mut c, log, _) = controller(PlaybackMode::Full);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        c.on_complete(1).unwrap();

        c.stop();
        assert!(log.calls().contains(&OutputCall::ReleaseResource));
        assert_eq!(c.status(), PlaybackStatus::Idle);
        assert_eq!(c.chunk_count(), 0);
        assert!(c.export().is_err());

        c.on_chunk(chunk(1, 1, 100)).unwrap();
        assert_eq!(c.chunk_count(), 0);
    }

    #[test]
    fn test_switch_mode_mid_generation_resets() {
        let (mut c, log, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        c.on_chunk(chunk(1, 1, 100)).unwrap();

        assert!(c.switch_mode(PlaybackMode::Full));
        assert_eq!(c.mode(), PlaybackMode::Full);
        assert_eq!(c.chunk_count(), 0);
        assert_eq!(c.queued(), 0);
        assert_eq!(c.session(), None);
        assert!(log.calls().contains(&OutputCall::StopSource));
    }

    #[test]
    fn test_switch_mode_when_idle_does_not_restart() {
        let (mut c, _, _) = controller(PlaybackMode::Streaming);
        assert!(!c.switch_mode(PlaybackMode::Full));
        assert_eq!(c.mode(), PlaybackMode::Full);
    }

    #[test]
    fn test_speed_applies_and_persists() {
        let (mut c, log, store) = controller(PlaybackMode::Full);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        c.on_complete(1).unwrap();

        c.set_speed(1.5).unwrap();
        assert!(log.calls().contains(&OutputCall::SetRate(1.5)));
        assert_eq!(store.saved().map(|s| s.speed), Some(1.5));

        assert!(c.set_speed(4.0).is_err());
        assert_eq!(c.settings().speed, 1.5);
    }

    #[test]
    fn test_export_after_completion() {
        let (mut c, _, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(1);
        c.on_chunk(chunk(1, 0, 100)).unwrap();
        assert!(c.export().is_err());
        c.on_chunk(chunk(1, 1, 50)).unwrap();
        c.on_complete(1).unwrap();

        let bytes = c.export().unwrap();
        assert_eq!(bytes.len(), wav::WAV_HEADER_LEN + 150 * 2);
    }

    #[test]
    fn test_error_renders_and_recovers() {
        let (mut c, _, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(1);
        c.on_error(Some(1), "model exploded");

        assert_eq!(c.status(), PlaybackStatus::Error);
        let view = c.view(&ModelView::default());
        assert_eq!(view.status_text, "Error: model exploded");
        assert!(view.show_play_pause);

        c.begin_generation();
        assert_eq!(c.status(), PlaybackStatus::Generating);
    }

    #[test]
    fn test_error_for_other_session_is_ignored() {
        let (mut c, _, _) = controller(PlaybackMode::Streaming);
        c.begin_generation();
        c.attach(2);
        c.on_error(Some(1), "old");
        assert_eq!(c.status(), PlaybackStatus::Generating);
    }
}
