//! Request and response types exchanged with the frontend.

use serde::{Deserialize, Serialize};

use crate::lipsync::VisemeTrack;
use crate::tts::{SpeechRequest, VoiceType};

/// Prosody multipliers are clamped to this range.
pub const PROSODY_RANGE: (f32, f32) = (0.25, 4.0);

/// How the relay treats the incoming message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Ask the model and speak its single reply.
    #[default]
    Chat,
    /// Narrate the message itself, chunked at sentence boundaries.
    Read,
}

impl Mode {
    /// Parse a frontend tag. Anything but `read` is chat.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().eq_ignore_ascii_case("read") {
            Mode::Read
        } else {
            Mode::Chat
        }
    }
}

/// Body of `POST /chat`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatRequest {
    /// User text. Missing or blank asks for the greeting.
    pub message: Option<String>,
    /// `chat` (default) or `read`.
    pub mode: Option<String>,
    /// `default`, `female`, `male` or `child`.
    pub voice_type: Option<String>,
    /// Pitch multiplier, default 1.0.
    pub voice_pitch: Option<f32>,
    /// Speed multiplier, default 1.0.
    pub voice_speed: Option<f32>,
    /// Volume in percent, default 100.
    pub voice_volume: Option<f32>,
}

impl ChatRequest {
    /// Chat-mode request for `message` with default voice settings.
    pub fn chat(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Read-mode request for `message` with default voice settings.
    pub fn read(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            mode: Some("read".to_owned()),
            ..Self::default()
        }
    }

    /// The message text, or `None` when the greeting should be returned.
    pub fn text(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.trim().is_empty())
    }

    /// Requested mode.
    pub fn mode(&self) -> Mode {
        self.mode.as_deref().map(Mode::from_tag).unwrap_or_default()
    }

    /// Requested voice.
    pub fn voice(&self) -> VoiceType {
        self.voice_type
            .as_deref()
            .map(VoiceType::from_tag)
            .unwrap_or_default()
    }

    /// Speech settings for `text`. Missing, zero or non-finite values take the defaults.
    pub fn speech_request(&self, text: &str) -> SpeechRequest {
        let (lo, hi) = PROSODY_RANGE;
        let multiplier = |v: Option<f32>| match v {
            Some(v) if v.is_finite() && v != 0.0 => v.clamp(lo, hi),
            _ => 1.0,
        };
        let volume = match self.voice_volume {
            Some(v) if v.is_finite() && v != 0.0 => v.clamp(0.0, 100.0).round() as u8,
            _ => 100,
        };
        SpeechRequest {
            text: text.to_owned(),
            voice: self.voice(),
            pitch: multiplier(self.voice_pitch),
            speed: multiplier(self.voice_speed),
            volume,
        }
    }
}

/// Facial expression shown while a message plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacialExpression {
    /// Neutral face.
    #[default]
    Default,
    /// Smiling.
    Smile,
    /// Sad.
    Sad,
    /// Surprised.
    Surprised,
}

/// Body animation played with a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Animation {
    /// Neutral talking loop.
    #[default]
    #[serde(rename = "Talking_0")]
    Talking0,
    /// Animated talking loop.
    #[serde(rename = "Talking_1")]
    Talking1,
    /// Subdued talking loop.
    #[serde(rename = "Talking_2")]
    Talking2,
    /// Laughing.
    Laughing,
    /// Waving hello.
    Waving,
}

/// One speakable unit in the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Text spoken by the avatar.
    pub text: String,
    /// Base64-encoded audio. Absent only for the text-only greeting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// Mouth cues for `audio`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lipsync: Option<VisemeTrack>,
    /// Facial expression.
    pub facial_expression: FacialExpression,
    /// Body animation.
    pub animation: Animation,
}

impl Message {
    /// A message without audio or lip-sync.
    pub fn text_only(text: impl Into<String>, facial_expression: FacialExpression, animation: Animation) -> Self {
        Self {
            text: text.into(),
            audio: None,
            lipsync: None,
            facial_expression,
            animation,
        }
    }
}

/// Body of a successful `POST /chat` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Messages in playback order.
    pub messages: Vec<Message>,
}
