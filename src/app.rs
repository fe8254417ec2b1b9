//! Read-aloud application entry point.
//!
//! Wires the whole pipeline inside one process:
//! engine host → relay → session coordinator → audio output

use crate::audio::output::{AudioOutput, ClockedOutput, OutputEvent, OutputEvents};
use crate::config::Config;
use crate::engine::{EngineHost, GenerationEngine};
use crate::error::{Result, VoxError};
use crate::ipc::client::HostClient;
use crate::ipc::protocol::{DestinationId, Event};
use crate::ipc::relay::{ChannelTransport, ChunkAcknowledger, Relay, RouteTable};
use crate::ipc::server::serve;
use crate::player::controller::PlaybackController;
use crate::player::settings::{MemorySettingsStore, SettingsStore, TomlSettingsStore};
use crate::player::view::{PlaybackMode, PlaybackStatus};
use crate::session::{SessionCoordinator, SessionHandle, SessionSnapshot};
use crate::tts::voices::get_voice;
use crate::tts::{CommandSynthesizer, MockSynthesizer, Synthesizer};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the consumer's event inbox.
const INBOX_CAPACITY: usize = 16;

/// Overrides for one `read` invocation.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub mode: Option<PlaybackMode>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub output: Option<PathBuf>,
    pub device: Option<String>,
    pub quiet: bool,
}

/// A running pipeline with one consumer attached.
pub struct Pipeline {
    pub session: SessionHandle,
    pub engine: Arc<GenerationEngine>,
    coordinator: JoinHandle<()>,
}

impl Pipeline {
    /// Stop the coordinator and wait for it to release the output.
    pub async fn shutdown(self) {
        let _ = self.session.shutdown().await;
        if let Err(e) = self.coordinator.await {
            tracing::warn!("Session coordinator task failed: {}", e);
        }
    }
}

/// Pick the synthesizer backend the config asks for.
pub fn build_synthesizer(config: &Config) -> Arc<dyn Synthesizer> {
    match &config.engine.synthesizer_command {
        Some(program) => Arc::new(CommandSynthesizer::new(
            program.clone(),
            config.engine.synthesizer_args.clone(),
        )),
        None => {
            tracing::warn!("No synthesizer_command configured, using the built-in tone synthesizer");
            Arc::new(MockSynthesizer::new())
        }
    }
}

/// Open the requested audio output.
///
/// `"null"` selects the silent clocked output. Without the `cpal-audio`
/// feature that is also the default.
pub fn build_output(device: Option<&str>, events: OutputEvents) -> Result<Box<dyn AudioOutput>> {
    if device == Some("null") {
        return Ok(Box::new(ClockedOutput::new(events)));
    }

    #[cfg(feature = "cpal-audio")]
    {
        let output = crate::audio::cpal_output::CpalOutput::new(device, events)?;
        Ok(Box::new(output))
    }

    #[cfg(not(feature = "cpal-audio"))]
    {
        if let Some(name) = device {
            return Err(VoxError::AudioDeviceNotFound {
                device: format!("{} (built without cpal-audio)", name),
            });
        }
        Ok(Box::new(ClockedOutput::new(events)))
    }
}

/// Start engine host, relay and coordinator around `output`.
pub fn start_pipeline<O>(
    config: &Config,
    synthesizer: Arc<dyn Synthesizer>,
    controller_output: O,
    output_events: mpsc::UnboundedReceiver<OutputEvent>,
    store: Arc<dyn SettingsStore>,
    options: &ReadOptions,
) -> Result<Pipeline>
where
    O: AudioOutput + 'static,
{
    let voice = options
        .voice
        .clone()
        .unwrap_or_else(|| config.playback.voice.clone());
    if get_voice(&voice).is_none() {
        return Err(VoxError::UnknownVoice { voice });
    }

    let mut settings = config.playback.clone();
    if let Some(saved) = store.load()? {
        settings.speed = saved.speed;
        settings.volume = saved.volume;
    }
    if let Some(mode) = options.mode {
        settings.mode = mode;
    }
    if let Some(speed) = options.speed {
        settings.speed = speed;
    }
    settings.voice = voice.clone();
    settings.validate()?;

    let (engine, events) = GenerationEngine::new(synthesizer, config.engine_config());
    let routes = RouteTable::new();

    let (requests_tx, requests_rx) = mpsc::channel(32);
    tokio::spawn(serve(EngineHost::new(Arc::clone(&engine), routes.clone()), requests_rx));

    let consumer = DestinationId(1);
    let (inbox_tx, inbox_rx) = mpsc::channel::<Event>(INBOX_CAPACITY);
    let transport = ChannelTransport::new();
    transport.register(consumer, inbox_tx);
    let acknowledger: Arc<dyn ChunkAcknowledger> = engine.clone();
    let relay = Relay::new(transport, routes, acknowledger).with_retry_delay(config.relay_retry_delay());
    tokio::spawn(relay.run(events));

    let controller = PlaybackController::new(controller_output, settings, store);
    let mut session_config = config.session_config();
    session_config.voice = voice;
    let (coordinator, session) =
        SessionCoordinator::new(HostClient::new(consumer, requests_tx), controller, session_config);
    let coordinator = tokio::spawn(coordinator.run(inbox_rx, output_events));

    Ok(Pipeline {
        session,
        engine,
        coordinator,
    })
}

fn settings_store() -> Arc<dyn SettingsStore> {
    match TomlSettingsStore::default_path() {
        Some(path) => Arc::new(TomlSettingsStore::new(path)),
        None => Arc::new(MemorySettingsStore::new()),
    }
}

/// The read has nothing left to do.
pub fn is_finished(snapshot: &SessionSnapshot) -> bool {
    snapshot.reads > 0
        && !snapshot.waiting_for_model
        && matches!(
            snapshot.status,
            PlaybackStatus::Complete | PlaybackStatus::Error | PlaybackStatus::Idle
        )
}

/// Run the read command: synthesize `text`, play it, optionally export it.
pub async fn run_read_command(config: Config, text: String, options: ReadOptions) -> Result<()> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let output = build_output(options.device.as_deref(), events_tx)?;
    if !options.quiet {
        eprintln!("{} {}", "Output:".dimmed(), output.name());
    }

    let pipeline = start_pipeline(
        &config,
        build_synthesizer(&config),
        output,
        events_rx,
        settings_store(),
        &options,
    )?;
    let session = pipeline.session.clone();
    session.read(text).await?;

    let finished = tokio::select! {
        result = follow(&session, options.quiet) => Some(result?),
        _ = tokio::signal::ctrl_c() => {
            if !options.quiet {
                eprintln!("\n{}", "Stopping...".yellow());
            }
            session.stop().await?;
            None
        }
    };

    let outcome = match finished {
        Some(snapshot) if snapshot.status == PlaybackStatus::Error => Err(VoxError::Playback {
            message: snapshot
                .view
                .status_text
                .trim_start_matches("Error: ")
                .to_string(),
        }),
        Some(snapshot) if snapshot.status == PlaybackStatus::Complete => {
            if let Some(path) = &options.output {
                let wav = session.export().await?;
                std::fs::write(path, &wav)?;
                if !options.quiet {
                    eprintln!("{} {}", "Saved".green(), path.display());
                }
            }
            Ok(())
        }
        _ => Ok(()),
    };

    pipeline.shutdown().await;
    outcome
}

/// Print status changes until the read is finished.
async fn follow(session: &SessionHandle, quiet: bool) -> Result<SessionSnapshot> {
    let mut updates = session.subscribe();
    let mut last_line = String::new();
    loop {
        let snapshot = updates.borrow_and_update().clone();
        if !quiet {
            let mut line = snapshot.view.status_text.clone();
            if let Some(info) = &snapshot.view.chunk_info {
                line = format!("{} ({})", line, info);
            }
            if let Some(badge) = snapshot.view.device_badge {
                line = format!("[{}] {}", badge, line);
            }
            if line != last_line {
                if snapshot.status == PlaybackStatus::Error {
                    eprintln!("{}", line.red());
                } else {
                    eprintln!("{}", line.cyan());
                }
                last_line = line;
            }
        }
        if is_finished(&snapshot) {
            return Ok(snapshot);
        }
        updates.changed().await.map_err(|_| VoxError::Protocol {
            message: "session coordinator stopped".to_string(),
        })?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_device_is_clocked() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let output = build_output(Some("null"), tx).unwrap();
        assert_eq!(output.name(), "clocked");
    }

    #[test]
    fn test_mock_synthesizer_without_command() {
        let synth = build_synthesizer(&Config::default());
        assert_eq!(synth.name(), "mock");
    }

    #[test]
    fn test_command_synthesizer_from_config() {
        let mut config = Config::default();
        config.engine.synthesizer_command = Some("kokoro-tts".to_string());
        let synth = build_synthesizer(&config);
        assert_eq!(synth.name(), "kokoro-tts");
    }
}
