//! Reply generation for chat mode.
//!
//! [`respond`] never fails: every [`LlmError`] maps to one of three canned replies
//! chosen by cause, so the avatar always has something to say.

pub mod gemini;

use async_trait::async_trait;

pub use gemini::GeminiClient;

/// Reply when the model cannot be reached or answers with an error status.
pub const REPLY_UNREACHABLE: &str =
    "I'm sorry, I'm having trouble connecting to my brain right now. Please try again later.";

/// Reply when the model refuses the prompt on safety grounds.
pub const REPLY_BLOCKED: &str =
    "I'm sorry, I can't respond to that request. It may contain inappropriate content.";

/// Reply when the model answers with something unparseable.
pub const REPLY_UNEXPECTED: &str =
    "I'm not sure how to respond to that. Could you try asking something else?";

/// Stable error codes for programmatic handling.
pub mod error_codes {
    /// No API key configured.
    pub const MISSING_API_KEY: &str = "MISSING_API_KEY";
    /// Transport failure.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";
    /// Request exceeded its timeout.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Non-success HTTP status.
    pub const HTTP_STATUS: &str = "HTTP_STATUS";
    /// Safety filter blocked the prompt.
    pub const BLOCKED: &str = "BLOCKED";
    /// Body did not contain reply text.
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
}

/// Errors produced while generating a reply.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// No API key configured.
    #[error("[{}] API key is not configured", error_codes::MISSING_API_KEY)]
    MissingApiKey,

    /// Transport failure.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    Request(String),

    /// Request exceeded its timeout.
    #[error("[{}] no reply within {} s", error_codes::TIMEOUT, .0)]
    Timeout(u64),

    /// Non-success HTTP status.
    #[error("[{}] HTTP {status}: {message}", error_codes::HTTP_STATUS)]
    Http {
        /// Status code.
        status: u16,
        /// Error text extracted from the body.
        message: String,
    },

    /// The prompt was blocked, with the reported reason.
    #[error("[{}] prompt blocked: {}", error_codes::BLOCKED, .0)]
    Blocked(String),

    /// The body did not contain reply text.
    #[error("[{}] {}", error_codes::INVALID_RESPONSE, .0)]
    InvalidResponse(String),
}

impl LlmError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            LlmError::MissingApiKey => error_codes::MISSING_API_KEY,
            LlmError::Request(_) => error_codes::REQUEST_FAILED,
            LlmError::Timeout(_) => error_codes::TIMEOUT,
            LlmError::Http { .. } => error_codes::HTTP_STATUS,
            LlmError::Blocked(_) => error_codes::BLOCKED,
            LlmError::InvalidResponse(_) => error_codes::INVALID_RESPONSE,
        }
    }

    /// The canned reply spoken in place of a model answer.
    pub fn fallback_reply(&self) -> &'static str {
        match self {
            LlmError::MissingApiKey
            | LlmError::Request(_)
            | LlmError::Timeout(_)
            | LlmError::Http { .. } => REPLY_UNREACHABLE,
            LlmError::Blocked(_) => REPLY_BLOCKED,
            LlmError::InvalidResponse(_) => REPLY_UNEXPECTED,
        }
    }
}

/// A hosted language model that turns a user message into a reply.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Generate a reply to `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Generate a reply, substituting the matching canned reply on any failure.
pub async fn respond(generator: &dyn ReplyGenerator, prompt: &str) -> String {
    let started = std::time::Instant::now();
    match generator.generate(prompt).await {
        Ok(reply) => {
            tracing::info!(
                model = generator.name(),
                chars = reply.chars().count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "reply generated"
            );
            reply
        }
        Err(e) => {
            tracing::warn!(
                model = generator.name(),
                code = e.code(),
                error = %e,
                "reply generation failed, using canned reply"
            );
            e.fallback_reply().to_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    struct Scripted(std::sync::Mutex<Option<Result<String, LlmError>>>);

    impl Scripted {
        fn new(outcome: Result<String, LlmError>) -> Self {
            Self(std::sync::Mutex::new(Some(outcome)))
        }
    }

    #[async_trait]
    impl ReplyGenerator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            self.0
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(LlmError::InvalidResponse("exhausted".into())))
        }
    }

    #[tokio::test]
    async fn success_passes_reply_through() {
        let generator = Scripted::new(Ok("Hi! How can I help?".into()));
        assert_eq!(respond(&generator, "Hello").await, "Hi! How can I help?");
    }

    #[tokio::test]
    async fn each_cause_maps_to_its_canned_reply() {
        let cases = vec![
            (LlmError::MissingApiKey, REPLY_UNREACHABLE),
            (LlmError::Request("dns".into()), REPLY_UNREACHABLE),
            (LlmError::Timeout(30), REPLY_UNREACHABLE),
            (
                LlmError::Http {
                    status: 503,
                    message: "overloaded".into(),
                },
                REPLY_UNREACHABLE,
            ),
            (LlmError::Blocked("SAFETY".into()), REPLY_BLOCKED),
            (LlmError::InvalidResponse("no candidates".into()), REPLY_UNEXPECTED),
        ];
        for (error, expected) in cases {
            let code = error.code();
            let reply = respond(&Scripted::new(Err(error)), "x").await;
            assert_eq!(reply, expected, "code {code}");
        }
    }

    #[test]
    fn display_includes_code() {
        let err = LlmError::Timeout(30);
        assert_eq!(err.to_string(), "[TIMEOUT] no reply within 30 s");
        assert_eq!(LlmError::MissingApiKey.code(), "MISSING_API_KEY");
    }
}
