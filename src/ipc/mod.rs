//! Messaging between the engine host and its consumers.
//!
//! ```text
//! consumer ──Request──▶ server ──▶ EngineHost ──▶ GenerationEngine
//!    ▲                                                  │
//!    └───────────── Relay ◀──────── Event ──────────────┘
//! ```

pub mod client;
pub mod protocol;
pub mod relay;
pub mod server;

pub use client::HostClient;
pub use protocol::{AudioChunk, DestinationId, Event, Request, Response, SessionId};
pub use relay::{ChannelTransport, ChunkAcknowledger, ConsumerTransport, Relay, RouteTable};
pub use server::{HostRequest, RequestHandler, serve};
