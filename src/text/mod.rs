//! Text preparation for synthesis.

pub mod chunker;

pub use chunker::{ChunkerConfig, TextChunk, TextChunker, chunk};
