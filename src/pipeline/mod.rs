//! Response assembly: greeting, read mode and chat mode.
//!
//! Processing is strictly sequential per request:
//! validate → greeting | read chunks | chat reply → speech → mouth cues → messages.
//! Failures inside a message are absorbed locally; only failing to set up the
//! request itself surfaces as an error.

pub mod context;
pub mod expression;
pub mod messages;

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::config::{GreetingConfig, RelayConfig};
use crate::error::{RelayError, Result};
use crate::lipsync::{self, LipSync, PhonemeRecognizer, VisemeTrack};
use crate::llm::{self, GeminiClient, ReplyGenerator};
use crate::media::{self, MediaTools};
use crate::text;
use crate::tts::SpeechChain;

pub use context::RequestContext;
pub use messages::{Animation, ChatRequest, ChatResponse, FacialExpression, Message, Mode};

/// Text of the catch-all apology returned with HTTP 500.
pub const APOLOGY_TEXT: &str =
    "I'm sorry, I encountered an error processing your request. Please try again.";

/// The complete relay pipeline shared by all requests.
#[derive(Clone)]
pub struct Relay {
    generator: Arc<dyn ReplyGenerator>,
    speech: Arc<SpeechChain>,
    lipsync: LipSync,
    greeting: GreetingConfig,
    work_dir: PathBuf,
    keep_artifacts: bool,
    fallback_duration_secs: f64,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("generator", &self.generator.name())
            .field("speech", &self.speech)
            .field("lipsync", &self.lipsync)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl Relay {
    /// Assemble a relay from its stages.
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        speech: Arc<SpeechChain>,
        lipsync: LipSync,
        config: &RelayConfig,
    ) -> Self {
        Self {
            generator,
            speech,
            lipsync,
            greeting: config.greeting.clone(),
            work_dir: config.storage.work_dir.clone(),
            keep_artifacts: config.storage.keep_artifacts,
            fallback_duration_secs: f64::from(config.lipsync.fallback_duration_secs),
        }
    }

    /// Wire the production stages: Gemini, the configured speech chain and the given recognizer.
    pub fn from_config(
        config: &RelayConfig,
        media: Arc<MediaTools>,
        recognizer: Option<Arc<dyn PhonemeRecognizer>>,
    ) -> Self {
        let generator = Arc::new(GeminiClient::new(config.llm.clone()));
        let speech = Arc::new(SpeechChain::from_config(&config.tts, media.clone()));
        let lipsync = LipSync::new(
            recognizer,
            media,
            f64::from(config.lipsync.fallback_duration_secs),
        );
        Self::new(generator, speech, lipsync, config)
    }

    /// The reply generator (used by the health check endpoint).
    pub fn generator(&self) -> &Arc<dyn ReplyGenerator> {
        &self.generator
    }

    /// The speech chain.
    pub fn speech(&self) -> &Arc<SpeechChain> {
        &self.speech
    }

    /// The lip-sync stage.
    pub fn lipsync(&self) -> &LipSync {
        &self.lipsync
    }

    /// Root directory for request artifacts.
    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }

    /// Turn a chat request into playable messages.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Pipeline`] only when the request's working directory
    /// cannot be created.
    pub async fn handle(&self, request: &ChatRequest) -> Result<Vec<Message>> {
        let Some(text) = request.text() else {
            return Ok(vec![self.greeting().await]);
        };

        let ctx = RequestContext::create(&self.work_dir, self.keep_artifacts)
            .await
            .map_err(|e| {
                RelayError::Pipeline(format!(
                    "cannot create request directory under {}: {e}",
                    self.work_dir.display()
                ))
            })?;
        let mode = request.mode();
        tracing::info!(request_id = %ctx.id(), ?mode, chars = text.chars().count(), "handling chat request");

        let drafts = match mode {
            Mode::Read => text::split(text, text::DEFAULT_MAX_CHUNK_LEN)
                .into_iter()
                .take(text::READ_MODE_MAX_CHUNKS)
                .enumerate()
                .map(|(i, chunk)| {
                    Message::text_only(chunk, FacialExpression::Default, expression::read_animation(i))
                })
                .collect::<Vec<_>>(),
            Mode::Chat => {
                let reply = llm::respond(self.generator.as_ref(), text).await;
                let (face, animation) = expression::classify(&reply);
                vec![Message::text_only(reply, face, animation)]
            }
        };

        let mut messages = Vec::with_capacity(drafts.len());
        for (index, draft) in drafts.into_iter().enumerate() {
            messages.push(self.voice_message(&ctx, index, draft, request).await);
        }

        ctx.finish().await;
        Ok(messages)
    }

    /// Attach audio and mouth cues to a drafted message.
    async fn voice_message(
        &self,
        ctx: &RequestContext,
        index: usize,
        mut message: Message,
        request: &ChatRequest,
    ) -> Message {
        let speech_request = request.speech_request(&message.text);
        let speech = self.speech.synthesize(&speech_request, ctx.dir()).await;
        let path = ctx.audio_path(index, speech.format);

        let track = match tokio::fs::write(&path, &speech.bytes).await {
            Ok(()) => {
                self.lipsync
                    .build_track(&path, speech.format, &message.text)
                    .await
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.id(),
                    index,
                    error = %e,
                    "could not persist audio, using synthetic lip-sync"
                );
                self.estimated_track(&message.text)
            }
        };

        tracing::debug!(
            request_id = %ctx.id(),
            index,
            provider = %speech.provider,
            cues = track.mouth_cues.len(),
            "message voiced"
        );
        message.audio = Some(BASE64.encode(&speech.bytes));
        message.lipsync = Some(track);
        message
    }

    fn estimated_track(&self, text: &str) -> VisemeTrack {
        let duration = media::estimate_speech_secs(text).unwrap_or(self.fallback_duration_secs);
        lipsync::synthetic::generate(duration, &mut rand::thread_rng())
    }

    /// The welcome message, with pre-recorded assets when both are readable.
    pub async fn greeting(&self) -> Message {
        match self.load_greeting_assets().await {
            Ok((audio, track)) => Message {
                text: self.greeting.text.clone(),
                audio: Some(BASE64.encode(audio)),
                lipsync: Some(track),
                facial_expression: FacialExpression::Smile,
                animation: Animation::Waving,
            },
            Err(reason) => {
                tracing::debug!(%reason, "greeting assets unavailable, sending text only");
                Message::text_only(self.greeting.text.clone(), FacialExpression::Smile, Animation::Talking1)
            }
        }
    }

    async fn load_greeting_assets(&self) -> std::result::Result<(Vec<u8>, VisemeTrack), String> {
        let audio = tokio::fs::read(&self.greeting.audio_file)
            .await
            .map_err(|e| format!("{}: {e}", self.greeting.audio_file.display()))?;
        let json = tokio::fs::read_to_string(&self.greeting.lipsync_file)
            .await
            .map_err(|e| format!("{}: {e}", self.greeting.lipsync_file.display()))?;
        let track = VisemeTrack::from_json(&json).map_err(|e| e.to_string())?;
        Ok((audio, track))
    }
}

/// The message returned alongside HTTP 500.
pub fn apology_message() -> Message {
    Message::text_only(APOLOGY_TEXT, FacialExpression::Sad, Animation::Talking0)
}
