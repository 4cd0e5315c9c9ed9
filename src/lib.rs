//! Avatar relay: turns chat messages into speakable avatar messages.
//!
//! Each request flows through a strictly sequential pipeline:
//! text → (chunking | LLM reply) → speech synthesis → lip-sync cues → JSON
//!
//! # Architecture
//!
//! - **Text chunker**: splits read-mode input at sentence boundaries
//! - **LLM**: asks the Gemini `generateContent` API for a reply, with canned fallbacks
//! - **TTS**: ordered provider chain ending in a local silent clip that never fails
//! - **Lip-sync**: runs the rhubarb recognizer, or generates synthetic mouth cues
//! - **Pipeline**: assembles `{text, audio, lipsync, facialExpression, animation}` messages
//! - **Server**: axum routes, CORS, body limit and static frontend

pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod llm;
pub mod lipsync;
pub mod media;
pub mod pipeline;
pub mod server;
pub mod text;
pub mod tts;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use pipeline::{ChatRequest, Message, Relay};
pub use server::{AppState, RelayServer};
