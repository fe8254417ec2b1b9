//! The generation engine.
//!
//! Owns the synthesizer, loads the model once, and runs at most one
//! generation at a time. Every emission is checked against the active
//! token under the same lock that assigns sequence numbers, so a superseded
//! or stopped generation can never put another event on the channel.

use crate::defaults;
use crate::engine::session::{GenerationSession, SessionState};
use crate::engine::token::GenerationToken;
use crate::error::{Result, VoxError};
use crate::ipc::protocol::{AudioChunk, Event, SessionId};
use crate::ipc::relay::ChunkAcknowledger;
use crate::text::TextChunker;
use crate::tts::device::{ComputeDevice, current_platform, select_device};
use crate::tts::synthesizer::Synthesizer;
use crate::tts::voices::get_voice;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_chunk_chars: usize,
    /// Emitted but unacknowledged chunks allowed before production suspends.
    pub max_queue_depth: usize,
    /// How long a new generation waits for the superseded one to stop.
    pub grace_period: Duration,
    pub force_cpu: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: defaults::MAX_CHUNK_CHARS,
            max_queue_depth: defaults::MAX_QUEUE_DEPTH,
            grace_period: Duration::from_millis(defaults::GRACE_PERIOD_MS),
            force_cpu: false,
        }
    }
}

/// Process-wide model state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelState {
    pub loaded: bool,
    pub loading: bool,
    /// Load progress in percent.
    pub progress: f32,
    pub device: Option<ComputeDevice>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Active {
    token: Option<GenerationToken>,
    session: Option<GenerationSession>,
}

pub struct GenerationEngine {
    synthesizer: Arc<dyn Synthesizer>,
    chunker: TextChunker,
    config: EngineConfig,
    events: mpsc::UnboundedSender<Event>,
    model: OnceCell<ComputeDevice>,
    model_state: Arc<Mutex<ModelState>>,
    active: Mutex<Active>,
    next_id: AtomicU64,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl GenerationEngine {
    /// Create an engine and the receiver for everything it emits.
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        config: EngineConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            synthesizer,
            chunker: TextChunker::with_max_chars(config.max_chunk_chars),
            config,
            events,
            model: OnceCell::new(),
            model_state: Arc::new(Mutex::new(ModelState::default())),
            active: Mutex::new(Active::default()),
            next_id: AtomicU64::new(0),
            worker: tokio::sync::Mutex::new(None),
        });
        (engine, rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load the model if needed and return the device it runs on.
    ///
    /// Concurrent callers share one load. A failed load leaves the engine
    /// unloaded so a later call retries.
    pub async fn init(&self) -> Result<ComputeDevice> {
        self.model
            .get_or_try_init(|| self.load_model())
            .await
            .copied()
    }

    /// Like [`init`](Self::init), but reports the outcome as events.
    ///
    /// An already loaded model re-announces `ModelReady` so late consumers
    /// learn about it; a failure is reported as a session-less `TtsError`.
    pub async fn init_and_announce(&self) {
        if let Some(device) = self.model.get() {
            let _ = self.events.send(Event::ModelReady { device: *device });
            return;
        }
        if let Err(e) = self.init().await {
            let _ = self.events.send(Event::TtsError {
                session_id: None,
                message: e.to_string(),
            });
        }
    }

    async fn load_model(&self) -> Result<ComputeDevice> {
        let probe = Arc::clone(&self.synthesizer);
        let force_cpu = self.config.force_cpu;
        let device = tokio::task::spawn_blocking(move || {
            select_device(force_cpu, current_platform(), || probe.supports_acceleration())
        })
        .await
        .unwrap_or(ComputeDevice::Cpu);

        self.update_model_state(|state| {
            state.loading = true;
            state.progress = 0.0;
            state.device = Some(device);
            state.last_error = None;
        });
        tracing::info!(%device, backend = self.synthesizer.name(), "Loading TTS model");
        let _ = self.events.send(Event::ModelLoading {
            progress: 0.0,
            device,
        });

        let synthesizer = Arc::clone(&self.synthesizer);
        let events = self.events.clone();
        let state = Arc::clone(&self.model_state);
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            synthesizer.load(device, &|progress| {
                if let Ok(mut state) = state.lock() {
                    state.progress = progress;
                }
                let _ = events.send(Event::ModelLoading { progress, device });
            })
        })
        .await
        .unwrap_or_else(|e| {
            Err(VoxError::ModelLoad {
                message: format!("load task failed: {}", e),
            })
        });

        match result {
            Ok(()) => {
                self.update_model_state(|state| {
                    state.loaded = true;
                    state.loading = false;
                    state.progress = 100.0;
                });
                tracing::info!(%device, elapsed_ms = started.elapsed().as_millis() as u64, "TTS model ready");
                let _ = self.events.send(Event::ModelReady { device });
                Ok(device)
            }
            Err(e) => {
                tracing::error!("TTS model load failed: {}", e);
                self.update_model_state(|state| {
                    state.loading = false;
                    state.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Start a new generation, cancelling any active one.
    ///
    /// Returns once the new generation is running. Events for it arrive on
    /// the engine's channel; the model is loaded first if necessary.
    pub async fn generate(self: &Arc<Self>, text: &str, voice: &str) -> Result<SessionId> {
        self.generate_with(text, voice, |_| {}).await
    }

    /// [`generate`](Self::generate), calling `on_assigned` with the new
    /// session id before the generation can emit anything.
    pub async fn generate_with<F>(
        self: &Arc<Self>,
        text: &str,
        voice: &str,
        on_assigned: F,
    ) -> Result<SessionId>
    where
        F: FnOnce(SessionId) + Send,
    {
        if get_voice(voice).is_none() {
            return Err(VoxError::UnknownVoice {
                voice: voice.to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        on_assigned(id);
        let token = GenerationToken::new(id, self.config.max_queue_depth);
        {
            let mut active = self.lock_active();
            if let Some(previous) = active.token.replace(token.clone()) {
                previous.cancel();
            }
            if let Some(previous) = active.session.as_mut()
                && previous.transition(SessionState::Cancelled)
            {
                tracing::info!(session = previous.id, "Generation superseded");
            }
            let mut session = GenerationSession::new(id, voice);
            session.transition(SessionState::Generating);
            active.session = Some(session);
        }

        let mut worker = self.worker.lock().await;
        if let Some(previous) = worker.take()
            && tokio::time::timeout(self.config.grace_period, previous)
                .await
                .is_err()
        {
            tracing::debug!("Superseded generation still winding down");
        }

        let engine = Arc::clone(self);
        let text = text.to_string();
        let voice = voice.to_string();
        *worker = Some(tokio::spawn(async move {
            engine.run(token, text, voice).await;
        }));
        Ok(id)
    }

    /// Cancel the active generation. Returns whether one was running.
    pub fn stop(&self) -> bool {
        let mut active = self.lock_active();
        if let Some(token) = active.token.take() {
            token.cancel();
        }
        let Some(session) = active.session.as_mut() else {
            return false;
        };
        let stopped = session.transition(SessionState::Cancelled);
        if stopped {
            tracing::info!(session = session.id, "Generation stopped");
        }
        stopped
    }

    /// Record that the consumer took one chunk of `session_id`.
    ///
    /// Acknowledgements for anything but the active session are ignored.
    pub fn acknowledge(&self, session_id: SessionId) {
        let mut active = self.lock_active();
        let Active { token, session } = &mut *active;
        match (token.as_ref(), session.as_mut()) {
            (Some(token), Some(session))
                if token.id() == session_id && session.queue_depth > 0 =>
            {
                session.queue_depth -= 1;
                token.release();
            }
            _ => tracing::trace!(session = session_id, "Ignoring stale acknowledgement"),
        }
    }

    pub fn status(&self) -> ModelState {
        self.model_state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the most recent generation session.
    pub fn session(&self) -> Option<GenerationSession> {
        self.lock_active().session.clone()
    }

    async fn run(&self, token: GenerationToken, text: String, voice: String) {
        let id = token.id();

        if let Err(e) = self.init().await {
            self.finish(
                &token,
                SessionState::Errored,
                Event::TtsError {
                    session_id: Some(id),
                    message: e.to_string(),
                },
            );
            return;
        }

        let chunks = self.chunker.chunk(&text);
        tracing::info!(session = id, chunks = chunks.len(), %voice, "Generation started");
        if !self.emit(
            &token,
            Event::ChunkCount {
                session_id: id,
                count: chunks.len(),
            },
        ) {
            return;
        }

        let total = chunks.len();
        for chunk in chunks {
            if !self.is_current(&token) {
                tracing::debug!(session = id, "Generation cancelled");
                return;
            }
            if !token.reserve().await || !self.is_current(&token) {
                tracing::debug!(session = id, "Generation cancelled during backpressure wait");
                return;
            }

            let synthesizer = Arc::clone(&self.synthesizer);
            let content = chunk.content.clone();
            let voice_id = voice.clone();
            let started = Instant::now();
            let result =
                tokio::task::spawn_blocking(move || synthesizer.synthesize(&content, &voice_id))
                    .await
                    .unwrap_or_else(|e| {
                        Err(VoxError::Synthesis {
                            message: format!("synthesis task failed: {}", e),
                        })
                    });

            if !self.is_current(&token) {
                tracing::debug!(session = id, "Generation cancelled during synthesis");
                return;
            }

            match result {
                Ok(samples) => {
                    tracing::debug!(
                        session = id,
                        chunk = chunk.sequence + 1,
                        total,
                        samples = samples.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Chunk synthesized"
                    );
                    if !self.emit_chunk(&token, samples, chunk.content) {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(session = id, chunk = chunk.sequence + 1, "Skipping chunk: {}", e);
                    token.release();
                }
            }
        }

        if self.finish(
            &token,
            SessionState::Complete,
            Event::GenerationComplete { session_id: id },
        ) {
            tracing::info!(session = id, "Generation complete");
        }
    }

    fn is_current_locked(active: &Active, token: &GenerationToken) -> bool {
        !token.is_cancelled()
            && active
                .token
                .as_ref()
                .is_some_and(|current| current.same_generation(token))
    }

    fn is_current(&self, token: &GenerationToken) -> bool {
        Self::is_current_locked(&self.lock_active(), token)
    }

    fn emit(&self, token: &GenerationToken, event: Event) -> bool {
        let active = self.lock_active();
        if !Self::is_current_locked(&active, token) {
            return false;
        }
        self.events.send(event).is_ok()
    }

    fn emit_chunk(&self, token: &GenerationToken, samples: Vec<f32>, source_text: String) -> bool {
        let mut active = self.lock_active();
        if !Self::is_current_locked(&active, token) {
            return false;
        }
        let Some(session) = active.session.as_mut() else {
            return false;
        };
        let chunk = AudioChunk {
            session_id: session.id,
            sequence: session.emitted,
            samples,
            source_text,
        };
        session.emitted += 1;
        session.queue_depth += 1;
        self.events.send(Event::AudioChunk(chunk)).is_ok()
    }

    fn finish(&self, token: &GenerationToken, state: SessionState, event: Event) -> bool {
        let mut active = self.lock_active();
        if !Self::is_current_locked(&active, token) {
            return false;
        }
        if let Some(session) = active.session.as_mut() {
            session.transition(state);
        }
        self.events.send(event).is_ok()
    }

    fn lock_active(&self) -> MutexGuard<'_, Active> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_model_state(&self, f: impl FnOnce(&mut ModelState)) {
        if let Ok(mut state) = self.model_state.lock() {
            f(&mut state);
        }
    }
}

impl ChunkAcknowledger for GenerationEngine {
    fn acknowledge(&self, session_id: SessionId) {
        GenerationEngine::acknowledge(self, session_id);
    }
}
