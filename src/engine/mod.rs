//! The generation engine and the host that serves it to consumers.

pub mod generation;
pub mod host;
pub mod session;
pub mod token;

pub use generation::{EngineConfig, GenerationEngine, ModelState};
pub use host::EngineHost;
pub use session::{GenerationSession, SessionState};
pub use token::GenerationToken;
