//! Text-to-speech synthesis through an ordered chain of providers.
//!
//! Remote vendors implement [`SpeechProvider`]; [`SpeechChain`] tries them in the
//! configured order and finishes with a local silent clip so a request always has
//! audio to play.

pub mod chain;
pub mod responsive_voice;
pub mod silence;
pub mod voicevox;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use chain::{SpeechChain, SynthesizedSpeech};
pub use responsive_voice::ResponsiveVoiceProvider;
pub use silence::SilenceProvider;
pub use voicevox::VoicevoxProvider;

/// Voice selector sent by the frontend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceType {
    /// The deployment's default voice.
    #[default]
    Default,
    /// Female voice.
    Female,
    /// Male voice.
    Male,
    /// Child voice.
    Child,
}

impl VoiceType {
    /// Every voice type, in catalog order.
    pub const ALL: [VoiceType; 4] = [
        VoiceType::Default,
        VoiceType::Female,
        VoiceType::Male,
        VoiceType::Child,
    ];

    /// Lowercase tag used in requests and config tables.
    pub fn as_str(self) -> &'static str {
        match self {
            VoiceType::Default => "default",
            VoiceType::Female => "female",
            VoiceType::Male => "male",
            VoiceType::Child => "child",
        }
    }

    /// Parse a frontend tag case-insensitively. Unknown tags map to [`VoiceType::Default`].
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(tag))
            .unwrap_or_default()
    }
}

/// Container format of synthesized audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// MPEG layer III.
    Mp3,
    /// RIFF WAVE.
    Wav,
}

impl AudioFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    /// Identify the format from magic bytes: RIFF/WAVE, an `ID3` tag or an MPEG frame sync.
    /// `None` for anything else (HTML error pages, JSON, truncated bodies).
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(AudioFormat::Wav),
            [b'I', b'D', b'3', ..] => Some(AudioFormat::Mp3),
            [0xFF, second, ..] if second & 0xE0 == 0xE0 => Some(AudioFormat::Mp3),
            _ => None,
        }
    }
}

/// Text plus voice and prosody settings for one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    /// Text to speak.
    pub text: String,
    /// Voice selector.
    pub voice: VoiceType,
    /// Pitch multiplier (1.0 = natural).
    pub pitch: f32,
    /// Speed multiplier (1.0 = natural).
    pub speed: f32,
    /// Volume in percent (0–100).
    pub volume: u8,
}

impl SpeechRequest {
    /// A request with natural prosody.
    pub fn new(text: impl Into<String>, voice: VoiceType) -> Self {
        Self {
            text: text.into(),
            voice,
            pitch: 1.0,
            speed: 1.0,
            volume: 100,
        }
    }
}

/// Encoded audio returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    /// Encoded bytes.
    pub bytes: Vec<u8>,
    /// Container format of `bytes`.
    pub format: AudioFormat,
}

/// Speech synthesis errors. The chain recovers from all of them.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// Provider misconfiguration.
    #[error("config error: {0}")]
    Config(String),

    /// Transport failure.
    #[error("request failed: {0}")]
    Request(String),

    /// The provider did not answer within its budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code.
        status: u16,
        /// Error text extracted from the body.
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Audio payload too small to be real speech.
    #[error("suspiciously small audio payload: {len} bytes (minimum {min})")]
    PayloadTooSmall {
        /// Received length.
        len: usize,
        /// Configured minimum.
        min: usize,
    },

    /// Local audio generation failed.
    #[error("media error: {0}")]
    Media(#[from] crate::media::MediaError),
}

impl From<reqwest::Error> for TtsError {
    fn from(e: reqwest::Error) -> Self {
        TtsError::Request(e.to_string())
    }
}

/// A text-to-speech backend.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Provider name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Overall budget for one synthesis call, enforced by the chain.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Synthesize `request`. `scratch` is a request-private directory for temporary files.
    async fn synthesize(
        &self,
        request: &SpeechRequest,
        scratch: &Path,
    ) -> Result<SynthesizedAudio, TtsError>;
}

/// Map a non-success response to [`TtsError::Http`], pulling a message out of JSON
/// bodies of the form `{"error": {"message": ..}}`, `{"error": ..}` or `{"errorMessage": ..}`.
pub(crate) fn map_http_error(status: reqwest::StatusCode, body: &str) -> TtsError {
    TtsError::Http {
        status: status.as_u16(),
        message: extract_error_message(body),
    }
}

fn extract_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error"))
                .or_else(|| v.get("errorMessage"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Accept a 2xx body as audio only when it is not a text/JSON document and its
/// magic bytes identify a supported container.
pub(crate) fn audio_payload(content_type: Option<&str>, bytes: Vec<u8>) -> Result<SynthesizedAudio, TtsError> {
    if let Some(ct) = content_type {
        let ct = ct.trim().to_ascii_lowercase();
        if ct.starts_with("text/") || ct.starts_with("application/json") {
            let preview: String = String::from_utf8_lossy(&bytes).chars().take(80).collect();
            return Err(TtsError::InvalidResponse(format!(
                "expected audio, got {ct}: {preview:?}"
            )));
        }
    }
    let format = AudioFormat::detect(&bytes).ok_or_else(|| {
        TtsError::InvalidResponse(format!(
            "payload of {} bytes is neither MP3 nor WAV",
            bytes.len()
        ))
    })?;
    Ok(SynthesizedAudio { bytes, format })
}

/// Replace the value of a `key=` query parameter for logging.
pub(crate) fn mask_key(url: &str) -> String {
    match url.find("key=") {
        Some(pos) => {
            let value_start = pos + 4;
            let value_end = url[value_start..]
                .find('&')
                .map_or(url.len(), |i| value_start + i);
            format!("{}****{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_owned(),
    }
}
