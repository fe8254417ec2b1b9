//! Message protocol between the consumer side and the engine host.
//!
//! Requests flow consumer → host and get exactly one [`Response`]. Engine
//! output flows host → consumer as [`Event`]s. All three are closed tagged
//! enums serialised as JSON with a `type` field.

use crate::tts::device::ComputeDevice;
use crate::tts::voices::VoiceSummary;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation token value identifying one generation session.
pub type SessionId = u64;

/// Identity of a consumer that messages are delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DestinationId(pub u64);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Requests sent by a consumer to the engine host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Query model state and the voice catalog
    GetStatus,
    /// Load the model if it is not loaded yet
    InitModel,
    /// Start a new generation, superseding any active one
    GenerateSpeech { text: String, voice: String },
    /// Cancel the active generation
    StopGeneration,
}

/// Responses sent by the engine host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Request succeeded
    Ok,
    /// Current engine status
    Status {
        model_loaded: bool,
        device: Option<ComputeDevice>,
        load_progress: f32,
        voices: Vec<VoiceSummary>,
    },
    /// A generation was accepted
    GenerationStarted { session_id: SessionId },
    /// Request failed
    Error { message: String },
}

/// One synthesized chunk of audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    pub session_id: SessionId,
    /// Position within the session, contiguous from 0
    pub sequence: u32,
    /// Mono samples at 24kHz
    pub samples: Vec<f32>,
    /// Text the samples were synthesized from
    pub source_text: String,
}

/// Events emitted by the engine and relayed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    ModelLoading {
        progress: f32,
        device: ComputeDevice,
    },
    ModelReady {
        device: ComputeDevice,
    },
    ChunkCount {
        session_id: SessionId,
        count: usize,
    },
    AudioChunk(AudioChunk),
    GenerationComplete {
        session_id: SessionId,
    },
    TtsError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        message: String,
    },
}

impl Event {
    /// Session this event belongs to, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Event::ModelLoading { .. } | Event::ModelReady { .. } => None,
            Event::ChunkCount { session_id, .. } | Event::GenerationComplete { session_id } => {
                Some(*session_id)
            }
            Event::AudioChunk(chunk) => Some(chunk.session_id),
            Event::TtsError { session_id, .. } => *session_id,
        }
    }

    /// Model lifecycle events go to every consumer.
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Event::ModelLoading { .. } | Event::ModelReady { .. })
    }

    /// Last event a session produces.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Event::GenerationComplete { .. }
                | Event::TtsError {
                    session_id: Some(_),
                    ..
                }
        )
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ModelLoading { .. } => "MODEL_LOADING",
            Event::ModelReady { .. } => "MODEL_READY",
            Event::ChunkCount { .. } => "CHUNK_COUNT",
            Event::AudioChunk(_) => "AUDIO_CHUNK",
            Event::GenerationComplete { .. } => "GENERATION_COMPLETE",
            Event::TtsError { .. } => "TTS_ERROR",
        }
    }
}

macro_rules! impl_json {
    ($($ty:ty),*) => {$(
        impl $ty {
            /// Serialize to a JSON string.
            pub fn to_json(&self) -> Result<String, serde_json::Error> {
                serde_json::to_string(self)
            }

            /// Deserialize from a JSON string.
            pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
                serde_json::from_str(s)
            }
        }
    )*};
}

impl_json!(Request, Response, Event);
