//! Error types for the avatar relay.
//!
//! Each subsystem owns a narrow error enum ([`LlmError`](crate::llm::LlmError),
//! [`TtsError`](crate::tts::TtsError), [`MediaError`](crate::media::MediaError),
//! [`LipsyncError`](crate::lipsync::LipsyncError)). Those are recovered locally by the
//! pipeline; only the failures below can escape to the HTTP layer.

/// Top-level error type for the relay service.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server setup error (bind, serve).
    #[error("server error: {0}")]
    Server(String),

    /// Response assembly failed before any message could be produced.
    #[error("pipeline error: {0}")]
    Pipeline(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RelayError>;
