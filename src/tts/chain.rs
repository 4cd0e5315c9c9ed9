//! Ordered provider chain with a terminal silent clip.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{
    AudioFormat, ResponsiveVoiceProvider, SilenceProvider, SpeechProvider, SpeechRequest,
    SynthesizedAudio, TtsError, VoicevoxProvider,
};
use crate::config::{TtsConfig, TtsProviderKind};
use crate::media::MediaTools;

/// Audio produced by the chain, tagged with the provider that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSpeech {
    /// Encoded bytes. Never empty.
    pub bytes: Vec<u8>,
    /// Container format of `bytes`.
    pub format: AudioFormat,
    /// Name of the provider that produced the audio.
    pub provider: String,
}

/// Tries each provider in order until one returns usable audio.
///
/// A provider fails on error, on exceeding its timeout, or on returning fewer than
/// `min_audio_bytes` bytes. When every provider fails the silence provider renders
/// a placeholder clip.
pub struct SpeechChain {
    providers: Vec<Arc<dyn SpeechProvider>>,
    silence: SilenceProvider,
    min_audio_bytes: usize,
    /// Count of requests answered with silence (for observability).
    silence_count: AtomicU32,
}

impl SpeechChain {
    /// Create a chain from explicit providers.
    pub fn new(
        providers: Vec<Arc<dyn SpeechProvider>>,
        silence: SilenceProvider,
        min_audio_bytes: usize,
    ) -> Self {
        Self {
            providers,
            silence,
            min_audio_bytes,
            silence_count: AtomicU32::new(0),
        }
    }

    /// Build the chain described by `config`.
    pub fn from_config(config: &TtsConfig, media: Arc<MediaTools>) -> Self {
        let providers = config
            .providers
            .iter()
            .map(|kind| -> Arc<dyn SpeechProvider> {
                match kind {
                    TtsProviderKind::Voicevox => {
                        Arc::new(VoicevoxProvider::new(config.voicevox.clone()))
                    }
                    TtsProviderKind::ResponsiveVoice => {
                        Arc::new(ResponsiveVoiceProvider::new(config.responsive_voice.clone()))
                    }
                }
            })
            .collect();
        Self::new(
            providers,
            SilenceProvider::new(media, config.silence_seconds),
            config.min_audio_bytes,
        )
    }

    /// Provider names in the order they are tried, ending with `silence`.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.name().to_owned())
            .chain(std::iter::once(self.silence.name().to_owned()))
            .collect()
    }

    /// Number of times the chain fell through to silence.
    pub fn silence_count(&self) -> u32 {
        self.silence_count.load(Ordering::Relaxed)
    }

    /// Synthesize `request`, always returning non-empty audio.
    pub async fn synthesize(&self, request: &SpeechRequest, scratch: &Path) -> SynthesizedSpeech {
        for provider in &self.providers {
            let started = std::time::Instant::now();
            match self.attempt(provider.as_ref(), request, scratch).await {
                Ok(audio) => {
                    tracing::info!(
                        provider = provider.name(),
                        bytes = audio.bytes.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "speech synthesized"
                    );
                    return SynthesizedSpeech {
                        bytes: audio.bytes,
                        format: audio.format,
                        provider: provider.name().to_owned(),
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "speech provider failed, trying next"
                    );
                }
            }
        }

        self.silence_count.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("all speech providers failed, using silent placeholder");
        let audio = self.silence.render(scratch).await;
        SynthesizedSpeech {
            bytes: audio.bytes,
            format: audio.format,
            provider: self.silence.name().to_owned(),
        }
    }

    async fn attempt(
        &self,
        provider: &dyn SpeechProvider,
        request: &SpeechRequest,
        scratch: &Path,
    ) -> Result<SynthesizedAudio, TtsError> {
        let audio = match provider.timeout() {
            Some(limit) => tokio::time::timeout(limit, provider.synthesize(request, scratch))
                .await
                .map_err(|_| TtsError::Timeout(limit))??,
            None => provider.synthesize(request, scratch).await?,
        };
        if audio.bytes.len() < self.min_audio_bytes {
            return Err(TtsError::PayloadTooSmall {
                len: audio.bytes.len(),
                min: self.min_audio_bytes,
            });
        }
        if AudioFormat::detect(&audio.bytes).is_none() {
            return Err(TtsError::InvalidResponse(format!(
                "{} returned {} bytes that are neither MP3 nor WAV",
                provider.name(),
                audio.bytes.len()
            )));
        }
        Ok(audio)
    }
}

impl std::fmt::Debug for SpeechChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechChain")
            .field("providers", &self.provider_names())
            .field("min_audio_bytes", &self.min_audio_bytes)
            .field("silence_count", &self.silence_count())
            .finish()
    }
}
