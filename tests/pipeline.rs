//! End-to-end tests: engine host, relay, session coordinator and a clocked
//! output wired together in one process, driven by the mock synthesizer.

#![cfg(feature = "cli")]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voxread::app::{Pipeline, ReadOptions, start_pipeline};
use voxread::audio::output::{ClockedOutput, OutputLog};
use voxread::audio::wav::decode_wav;
use voxread::config::Config;
use voxread::defaults::SAMPLE_RATE;
use voxread::player::settings::MemorySettingsStore;
use voxread::player::view::{PlaybackMode, PlaybackStatus};
use voxread::session::SessionSnapshot;
use voxread::tts::MockSynthesizer;

const SAMPLES_PER_CHAR: usize = 10;
const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    pipeline: Pipeline,
    log: OutputLog,
    synth: MockSynthesizer,
}

impl Harness {
    fn start(synth: MockSynthesizer, mode: PlaybackMode) -> Self {
        let mut config = Config::default();
        config.session.init_poll_ms = 20;

        let log = OutputLog::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let output = ClockedOutput::new(events_tx).with_log(log.clone());
        let options = ReadOptions {
            mode: Some(mode),
            ..Default::default()
        };
        let pipeline = start_pipeline(
            &config,
            Arc::new(synth.clone()),
            output,
            events_rx,
            Arc::new(MemorySettingsStore::new()),
            &options,
        )
        .unwrap();

        Self {
            pipeline,
            log,
            synth,
        }
    }

    async fn preload(&self) {
        self.pipeline.engine.init().await.unwrap();
    }

    async fn wait_for(&self, done: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
        tokio::time::timeout(WAIT, self.pipeline.session.wait_for(done))
            .await
            .expect("timed out waiting for session state")
            .unwrap()
    }

    async fn wait_complete(&self) -> SessionSnapshot {
        self.wait_for(|s| s.status == PlaybackStatus::Complete).await
    }
}

fn tone() -> MockSynthesizer {
    MockSynthesizer::new().with_samples_per_char(SAMPLES_PER_CHAR)
}

fn paragraphs(count: usize) -> String {
    (1..=count)
        .map(|i| format!("This is paragraph number {}.", i))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[tokio::test]
async fn test_hello_world_initializes_model_and_completes() {
    let harness = Harness::start(tone().with_load_delay(Duration::from_millis(100)), PlaybackMode::Streaming);

    harness.pipeline.session.read("Hello world.").await.unwrap();
    let done = harness.wait_complete().await;

    assert_eq!(done.expected_chunks, Some(1));
    assert_eq!(done.chunk_count, 1);
    assert!(!done.waiting_for_model);
    assert_eq!(done.view.status_text, "Ready to play");
    assert!(done.view.download_enabled);
    assert_eq!(harness.synth.load_count(), 1);
    assert_eq!(harness.log.sources_started(), 1);

    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_streaming_playback_starts_before_generation_finishes() {
    let harness = Harness::start(
        tone().with_synthesis_delay(Duration::from_millis(80)),
        PlaybackMode::Streaming,
    );
    harness.preload().await;

    harness.pipeline.session.read(paragraphs(3)).await.unwrap();
    let first = harness.wait_for(|s| s.chunk_count >= 1).await;

    assert_eq!(first.expected_chunks, Some(3));
    assert!(first.chunk_count < 3);
    assert!(harness.log.sources_started() >= 1);
    assert_eq!(harness.log.resources_loaded(), 0);

    let done = harness.wait_complete().await;
    assert_eq!(done.chunk_count, 3);
    assert_eq!(harness.log.sources_started(), 3);

    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_full_mode_plays_one_combined_resource() {
    let harness = Harness::start(tone(), PlaybackMode::Full);
    harness.preload().await;

    harness.pipeline.session.read(paragraphs(4)).await.unwrap();
    let done = harness.wait_complete().await;

    assert_eq!(done.chunk_count, 4);
    assert_eq!(done.mode, PlaybackMode::Full);
    assert!(done.view.show_speed);
    assert_eq!(harness.log.sources_started(), 0);
    assert_eq!(harness.log.resources_loaded(), 1);

    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_switch_to_full_mid_generation_restarts_once() {
    let harness = Harness::start(
        tone().with_synthesis_delay(Duration::from_millis(50)),
        PlaybackMode::Streaming,
    );
    harness.preload().await;

    harness.pipeline.session.read(paragraphs(4)).await.unwrap();
    let first = harness.wait_for(|s| s.chunk_count >= 1).await;
    let old_session = first.session;
    assert!(old_session.is_some());

    harness
        .pipeline
        .session
        .switch_mode(PlaybackMode::Full)
        .await
        .unwrap();
    let done = harness.wait_complete().await;

    assert_eq!(done.mode, PlaybackMode::Full);
    assert_eq!(done.chunk_count, 4);
    assert_ne!(done.session, old_session);
    assert_eq!(harness.log.resources_loaded(), 1);

    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_stop_after_first_chunk_discards_the_rest() {
    let harness = Harness::start(
        tone().with_synthesis_delay(Duration::from_millis(100)),
        PlaybackMode::Streaming,
    );
    harness.preload().await;

    harness.pipeline.session.read(paragraphs(5)).await.unwrap();
    harness.wait_for(|s| s.chunk_count >= 1).await;
    harness.pipeline.session.stop().await.unwrap();
    harness.wait_for(|s| s.status == PlaybackStatus::Idle).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    let after = harness.pipeline.session.snapshot();
    assert_eq!(after.status, PlaybackStatus::Idle);
    assert_eq!(after.chunk_count, 0);
    assert!(after.session.is_none());
    assert!(harness.synth.synthesis_count() < 5);
    assert!(harness.pipeline.session.export().await.is_err());

    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_new_read_supersedes_running_generation() {
    let harness = Harness::start(
        tone().with_synthesis_delay(Duration::from_millis(50)),
        PlaybackMode::Streaming,
    );
    harness.preload().await;

    harness.pipeline.session.read(paragraphs(5)).await.unwrap();
    harness.wait_for(|s| s.session.is_some()).await;
    harness.pipeline.session.read("Second text only.").await.unwrap();

    let done = harness.wait_for(|s| s.reads == 2 && s.status == PlaybackStatus::Complete).await;
    assert_eq!(done.expected_chunks, Some(1));
    assert_eq!(done.chunk_count, 1);

    let wav = harness.pipeline.session.export().await.unwrap();
    let decoded = decode_wav(Cursor::new(wav)).unwrap();
    assert_eq!(decoded.samples.len(), "Second text only.".len() * SAMPLES_PER_CHAR);

    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_export_after_full_read_is_model_rate_wav() {
    let harness = Harness::start(tone(), PlaybackMode::Full);
    harness.preload().await;

    harness.pipeline.session.read("Hello world.").await.unwrap();
    harness.wait_complete().await;

    let wav = harness.pipeline.session.export().await.unwrap();
    let decoded = decode_wav(Cursor::new(wav)).unwrap();
    assert_eq!(decoded.sample_rate, SAMPLE_RATE);
    assert_eq!(decoded.samples.len(), "Hello world.".len() * SAMPLES_PER_CHAR);
    assert!(
        decoded
            .samples
            .iter()
            .all(|s| (s - MockSynthesizer::LEVEL).abs() < 1e-3)
    );

    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_failed_chunk_is_skipped_and_read_completes() {
    let harness = Harness::start(tone().failing_on("number 2"), PlaybackMode::Streaming);
    harness.preload().await;

    harness.pipeline.session.read(paragraphs(3)).await.unwrap();
    let done = harness.wait_complete().await;

    assert_eq!(done.expected_chunks, Some(3));
    assert_eq!(done.chunk_count, 2);
    assert_eq!(harness.synth.synthesis_count(), 3);

    let wav = harness.pipeline.session.export().await.unwrap();
    let decoded = decode_wav(Cursor::new(wav)).unwrap();
    let expected = ["This is paragraph number 1.", "This is paragraph number 3."]
        .iter()
        .map(|t| t.len() * SAMPLES_PER_CHAR)
        .sum::<usize>();
    assert_eq!(decoded.samples.len(), expected);

    harness.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_unknown_voice_is_rejected_before_start() {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let options = ReadOptions {
        voice: Some("zz_nobody".to_string()),
        ..Default::default()
    };
    let result = start_pipeline(
        &Config::default(),
        Arc::new(tone()),
        ClockedOutput::new(events_tx),
        events_rx,
        Arc::new(MemorySettingsStore::new()),
        &options,
    );
    assert!(result.is_err());
}
