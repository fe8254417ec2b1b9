//! Session coordinator.
//!
//! One task that owns the [`PlaybackController`] and serializes everything
//! that touches it: user commands, events relayed from the engine host,
//! completion reports from the audio output, the auto-init poll and the
//! delayed restart after a mode switch. After every step it publishes a
//! fresh [`SessionSnapshot`].

use crate::audio::output::{AudioOutput, OutputEvent};
use crate::defaults;
use crate::error::{Result, VoxError};
use crate::ipc::client::HostClient;
use crate::ipc::protocol::{Event, Request, Response, SessionId};
use crate::player::controller::PlaybackController;
use crate::player::view::{ModelView, PlaybackMode, PlaybackStatus, PlayerView};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub voice: String,
    /// Upper bound on waiting for the model before the first generation.
    pub init_timeout: Duration,
    pub init_poll: Duration,
    /// Delay before regenerating after a mode switch.
    pub restart_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            voice: defaults::DEFAULT_VOICE.to_string(),
            init_timeout: Duration::from_secs(defaults::INIT_TIMEOUT_SECS),
            init_poll: Duration::from_millis(defaults::INIT_POLL_MS),
            restart_delay: Duration::from_millis(defaults::RESTART_DELAY_MS),
        }
    }
}

/// User commands accepted by the coordinator.
#[derive(Debug)]
pub enum Command {
    Read(String),
    PlayPause,
    Stop,
    SwitchMode(PlaybackMode),
    SetSpeed(f32),
    SetVolume(f32),
    Export(oneshot::Sender<Result<Vec<u8>>>),
    Shutdown,
}

/// Published state after each step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub view: PlayerView,
    pub status: PlaybackStatus,
    pub mode: PlaybackMode,
    pub session: Option<SessionId>,
    pub chunk_count: usize,
    pub expected_chunks: Option<usize>,
    pub elapsed_secs: f64,
    pub waiting_for_model: bool,
    /// Read requests handled so far.
    pub reads: u64,
}

/// A read parked until the model is ready.
struct PendingInit {
    text: String,
    deadline: Instant,
    next_poll: Instant,
}

pub struct SessionCoordinator<O: AudioOutput> {
    client: HostClient,
    controller: PlaybackController<O>,
    config: SessionConfig,
    model: ModelView,
    current_text: Option<String>,
    pending: Option<PendingInit>,
    restart_at: Option<Instant>,
    reads: u64,
    commands: mpsc::Receiver<Command>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl<O: AudioOutput> SessionCoordinator<O> {
    pub fn new(
        client: HostClient,
        controller: PlaybackController<O>,
        config: SessionConfig,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(32);
        let model = ModelView::default();
        let initial = SessionSnapshot {
            view: controller.view(&model),
            status: controller.status(),
            mode: controller.mode(),
            session: None,
            chunk_count: 0,
            expected_chunks: None,
            elapsed_secs: 0.0,
            waiting_for_model: false,
            reads: 0,
        };
        let (snapshot, snapshot_rx) = watch::channel(initial);
        let coordinator = Self {
            client,
            controller,
            config,
            model,
            current_text: None,
            pending: None,
            restart_at: None,
            reads: 0,
            commands,
            snapshot,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
        };
        (coordinator, handle)
    }

    /// Run until shutdown or until every handle is dropped.
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Event>,
        mut output_events: mpsc::UnboundedReceiver<OutputEvent>,
    ) {
        self.refresh_status().await;
        self.publish();

        loop {
            let poll_at = self.pending.as_ref().map(|p| p.next_poll);
            let restart_at = self.restart_at;

            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(event) = inbox.recv() => self.handle_event(event).await,
                Some(event) = output_events.recv() => {
                    if let Err(e) = self.controller.on_output(event) {
                        self.controller.fail(&e.to_string());
                    }
                }
                _ = sleep_until(poll_at.unwrap_or_else(Instant::now)), if poll_at.is_some() => {
                    self.poll_init().await;
                }
                _ = sleep_until(restart_at.unwrap_or_else(Instant::now)), if restart_at.is_some() => {
                    self.restart_at = None;
                    if let Some(text) = self.current_text.clone() {
                        tracing::info!(mode = %self.controller.mode(), "Restarting generation");
                        self.start_read(text).await;
                    }
                }
            }
            self.publish();
        }

        self.controller.stop();
        self.send_stop().await;
        self.publish();
        tracing::debug!("Session coordinator stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Read(text) => self.start_read(text).await,
            Command::PlayPause => {
                if let Err(e) = self.controller.toggle_play_pause() {
                    self.controller.fail(&e.to_string());
                }
            }
            Command::Stop => {
                self.pending = None;
                self.restart_at = None;
                self.controller.stop();
                self.send_stop().await;
            }
            Command::SwitchMode(mode) => self.switch_mode(mode).await,
            Command::SetSpeed(speed) => {
                if let Err(e) = self.controller.set_speed(speed) {
                    tracing::warn!("Speed not changed: {}", e);
                }
            }
            Command::SetVolume(volume) => {
                if let Err(e) = self.controller.set_volume(volume) {
                    tracing::warn!("Volume not changed: {}", e);
                }
            }
            Command::Export(reply) => {
                let _ = reply.send(self.controller.export());
            }
            Command::Shutdown => {}
        }
    }

    async fn handle_event(&mut self, event: Event) {
        tracing::trace!(event = event.kind(), "Consumer event");
        match event {
            Event::ModelLoading { progress, device } => {
                self.model.loading = true;
                self.model.progress = progress;
                self.model.device = Some(device);
            }
            Event::ModelReady { device } => {
                self.model.loaded = true;
                self.model.loading = false;
                self.model.progress = 100.0;
                self.model.device = Some(device);
                if let Some(pending) = self.pending.take() {
                    self.request_generation(pending.text).await;
                }
            }
            Event::ChunkCount { session_id, count } => {
                self.controller.on_chunk_count(session_id, count);
            }
            Event::AudioChunk(chunk) => {
                if let Err(e) = self.controller.on_chunk(chunk) {
                    self.controller.fail(&e.to_string());
                }
            }
            Event::GenerationComplete { session_id } => {
                if let Err(e) = self.controller.on_complete(session_id) {
                    self.controller.fail(&e.to_string());
                }
            }
            Event::TtsError {
                session_id,
                message,
            } => {
                self.model.loading = false;
                if session_id.is_none() && self.pending.take().is_some() {
                    tracing::warn!("Model initialization failed: {}", message);
                }
                self.controller.on_error(session_id, &message);
            }
        }
    }

    async fn start_read(&mut self, text: String) {
        self.reads += 1;
        if text.trim().is_empty() {
            tracing::debug!("Empty text, nothing to read");
            return;
        }
        self.current_text = Some(text.clone());
        self.restart_at = None;
        self.pending = None;
        self.controller.begin_generation();

        if !self.model.loaded {
            self.refresh_status().await;
        }
        if self.model.loaded {
            self.request_generation(text).await;
            return;
        }

        tracing::info!("Model not loaded, initializing before generation");
        if let Err(e) = self.client.request(Request::InitModel).await {
            self.controller.fail(&e.to_string());
            return;
        }
        let now = Instant::now();
        self.pending = Some(PendingInit {
            text,
            deadline: now + self.config.init_timeout,
            next_poll: now + self.config.init_poll,
        });
    }

    async fn poll_init(&mut self) {
        self.refresh_status().await;
        let Some(mut pending) = self.pending.take() else {
            return;
        };

        if self.model.loaded {
            self.request_generation(pending.text).await;
        } else if Instant::now() >= pending.deadline {
            let error = VoxError::Timeout {
                what: "Model loading".to_string(),
                secs: self.config.init_timeout.as_secs(),
            };
            tracing::error!("{}", error);
            self.controller.fail(&error.to_string());
        } else {
            pending.next_poll += self.config.init_poll;
            self.pending = Some(pending);
        }
    }

    async fn request_generation(&mut self, text: String) {
        let request = Request::GenerateSpeech {
            text,
            voice: self.config.voice.clone(),
        };
        match self.client.request(request).await {
            Ok(Response::GenerationStarted { session_id }) => {
                tracing::debug!(session = session_id, "Generation accepted");
                self.controller.attach(session_id);
            }
            Ok(Response::Error { message }) => self.controller.fail(&message),
            Ok(other) => self.controller.fail(
                &VoxError::Protocol {
                    message: format!("unexpected response to GENERATE_SPEECH: {:?}", other),
                }
                .to_string(),
            ),
            Err(e) => self.controller.fail(&e.to_string()),
        }
    }

    async fn switch_mode(&mut self, mode: PlaybackMode) {
        if mode == self.controller.mode() {
            return;
        }
        // A read parked on the model counts as generating and is restarted too.
        self.pending = None;
        if self.controller.switch_mode(mode) {
            self.send_stop().await;
            if self.current_text.is_some() {
                self.restart_at = Some(Instant::now() + self.config.restart_delay);
            }
        }
    }

    async fn refresh_status(&mut self) {
        match self.client.request(Request::GetStatus).await {
            Ok(Response::Status {
                model_loaded,
                device,
                load_progress,
                ..
            }) => {
                self.model.loaded = model_loaded;
                if model_loaded {
                    self.model.loading = false;
                }
                self.model.progress = load_progress;
                if device.is_some() {
                    self.model.device = device;
                }
            }
            Ok(other) => tracing::warn!("Unexpected status response: {:?}", other),
            Err(e) => tracing::warn!("Status request failed: {}", e),
        }
    }

    async fn send_stop(&mut self) {
        if let Err(e) = self.client.request(Request::StopGeneration).await {
            tracing::debug!("Stop request failed: {}", e);
        }
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot {
            view: self.controller.view(&self.model),
            status: self.controller.status(),
            mode: self.controller.mode(),
            session: self.controller.session(),
            chunk_count: self.controller.chunk_count(),
            expected_chunks: self.controller.expected_chunks(),
            elapsed_secs: self.controller.elapsed_secs(),
            waiting_for_model: self.pending.is_some(),
            reads: self.reads,
        };
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Cloneable handle for driving a running coordinator.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| VoxError::Protocol {
                message: "session coordinator is not running".to_string(),
            })
    }

    pub async fn read(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::Read(text.into())).await
    }

    pub async fn play_pause(&self) -> Result<()> {
        self.send(Command::PlayPause).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    pub async fn switch_mode(&self, mode: PlaybackMode) -> Result<()> {
        self.send(Command::SwitchMode(mode)).await
    }

    pub async fn set_speed(&self, speed: f32) -> Result<()> {
        self.send(Command::SetSpeed(speed)).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(Command::SetVolume(volume)).await
    }

    /// WAV bytes of the completed session.
    pub async fn export(&self) -> Result<Vec<u8>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Export(reply)).await?;
        response.await.map_err(|_| VoxError::Protocol {
            message: "session coordinator dropped the export".to_string(),
        })?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until a published snapshot satisfies `done`.
    pub async fn wait_for(&self, done: impl FnMut(&SessionSnapshot) -> bool) -> Result<SessionSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx.wait_for(done).await.map_err(|_| VoxError::Protocol {
            message: "session coordinator stopped".to_string(),
        })?;
        Ok(snapshot.clone())
    }
}
