use crate::ipc::protocol::SessionId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Generating,
    Cancelled,
    Complete,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Cancelled | SessionState::Complete | SessionState::Errored
        )
    }
}

/// Snapshot of one generation as tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSession {
    pub id: SessionId,
    pub voice_id: String,
    pub state: SessionState,
    /// Chunks emitted but not yet acknowledged.
    pub queue_depth: usize,
    /// Chunks emitted so far.
    pub emitted: u32,
}

impl GenerationSession {
    pub fn new(id: SessionId, voice_id: &str) -> Self {
        Self {
            id,
            voice_id: voice_id.to_string(),
            state: SessionState::Idle,
            queue_depth: 0,
            emitted: 0,
        }
    }

    /// Move to `next` unless already terminal. Returns whether it moved.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = next;
        true
    }
}
