//! Per-read orchestration of the engine host and the player.

pub mod coordinator;

pub use coordinator::{Command, SessionConfig, SessionCoordinator, SessionHandle, SessionSnapshot};
