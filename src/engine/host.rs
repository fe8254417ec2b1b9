//! Request handling for the engine host.
//!
//! The host is the single owner of the [`GenerationEngine`]. It answers
//! consumer requests and keeps the [`RouteTable`] the relay uses to decide
//! where each engine event goes.

use crate::engine::generation::GenerationEngine;
use crate::ipc::protocol::{DestinationId, Request, Response};
use crate::ipc::relay::RouteTable;
use crate::ipc::server::RequestHandler;
use crate::tts::voices::voice_summaries;
use std::sync::Arc;

pub struct EngineHost {
    engine: Arc<GenerationEngine>,
    routes: RouteTable,
}

impl EngineHost {
    pub fn new(engine: Arc<GenerationEngine>, routes: RouteTable) -> Self {
        Self { engine, routes }
    }

    pub fn engine(&self) -> &Arc<GenerationEngine> {
        &self.engine
    }

    fn status(&self) -> Response {
        let state = self.engine.status();
        Response::Status {
            model_loaded: state.loaded,
            device: state.device,
            load_progress: state.progress,
            voices: voice_summaries(),
        }
    }
}

#[async_trait::async_trait]
impl RequestHandler for EngineHost {
    async fn handle(&self, from: DestinationId, request: Request) -> Response {
        self.routes.record_requester(from);

        match request {
            Request::GetStatus => self.status(),
            Request::InitModel => {
                // Outcome arrives as MODEL_READY or TTS_ERROR.
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move { engine.init_and_announce().await });
                Response::Ok
            }
            Request::GenerateSpeech { text, voice } => {
                let routes = self.routes.clone();
                match self
                    .engine
                    .generate_with(&text, &voice, |session| routes.bind_session(session, from))
                    .await
                {
                    Ok(session_id) => {
                        tracing::info!(session = session_id, %from, %voice, chars = text.len(), "Generation started");
                        Response::GenerationStarted { session_id }
                    }
                    Err(e) => {
                        tracing::warn!(%from, "Generation rejected: {}", e);
                        Response::Error {
                            message: e.to_string(),
                        }
                    }
                }
            }
            Request::StopGeneration => {
                self.engine.stop();
                Response::Ok
            }
        }
    }
}
