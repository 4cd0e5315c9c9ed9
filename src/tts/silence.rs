//! Silent placeholder clip, the last link of every speech chain.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::{AudioFormat, SpeechProvider, SpeechRequest, SynthesizedAudio, TtsError};
use crate::media::{self, GENERATED_SAMPLE_RATE, MediaTools};

/// 44-byte header of an empty 16-bit mono WAV at 24 kHz.
const EMPTY_WAV: [u8; 44] = [
    b'R', b'I', b'F', b'F', 36, 0, 0, 0, b'W', b'A', b'V', b'E', // RIFF chunk
    b'f', b'm', b't', b' ', 16, 0, 0, 0, 1, 0, 1, 0, // fmt: PCM, mono
    0xC0, 0x5D, 0, 0, 0x80, 0xBB, 0, 0, 2, 0, 16, 0, // 24000 Hz, 48000 B/s, align 2, 16 bit
    b'd', b'a', b't', b'a', 0, 0, 0, 0, // empty data chunk
];

/// Renders silence with ffmpeg as MP3, or in-process as WAV when ffmpeg is missing.
#[derive(Debug, Clone)]
pub struct SilenceProvider {
    media: Arc<MediaTools>,
    seconds: f32,
}

impl SilenceProvider {
    /// Create a provider producing `seconds` of silence.
    pub fn new(media: Arc<MediaTools>, seconds: f32) -> Self {
        Self { media, seconds }
    }

    /// Render the clip. Never fails and never returns an empty buffer.
    pub async fn render(&self, scratch: &Path) -> SynthesizedAudio {
        if self.media.ffmpeg().is_some() {
            let out = scratch.join("silence.mp3");
            match self.media.silence_mp3(self.seconds, &out).await {
                Ok(bytes) if !bytes.is_empty() => {
                    return SynthesizedAudio {
                        bytes,
                        format: AudioFormat::Mp3,
                    };
                }
                Ok(_) => tracing::warn!("ffmpeg produced an empty silence clip"),
                Err(e) => tracing::warn!(error = %e, "ffmpeg silence generation failed"),
            }
        }

        let bytes = media::silent_wav_bytes(self.seconds, GENERATED_SAMPLE_RATE).unwrap_or_else(|e| {
            tracing::error!(error = %e, "in-process silence encoding failed");
            EMPTY_WAV.to_vec()
        });
        SynthesizedAudio {
            bytes,
            format: AudioFormat::Wav,
        }
    }
}

#[async_trait]
impl SpeechProvider for SilenceProvider {
    fn name(&self) -> &str {
        "silence"
    }

    async fn synthesize(
        &self,
        _request: &SpeechRequest,
        scratch: &Path,
    ) -> Result<SynthesizedAudio, TtsError> {
        Ok(self.render(scratch).await)
    }
}
