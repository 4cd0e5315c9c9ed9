//! Text preprocessing for narration.

pub mod chunker;

pub use chunker::{DEFAULT_MAX_CHUNK_LEN, READ_MODE_MAX_CHUNKS, split};
