//! VOICEVOX synthesis through the tts.quest hosted API.
//!
//! Two steps: `GET /v3/voicevox/synthesis` returns JSON with an `mp3StreamingUrl`,
//! then the MP3 is downloaded from that URL.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{SpeechProvider, SpeechRequest, SynthesizedAudio, TtsError, VoiceType};
use crate::config::VoicevoxConfig;

/// Speaker used when the voice table has no entry for the requested type.
const FALLBACK_SPEAKER: &str = "3";

/// tts.quest VOICEVOX provider.
#[derive(Debug, Clone)]
pub struct VoicevoxProvider {
    client: reqwest::Client,
    config: VoicevoxConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisResponse {
    #[serde(default)]
    success: bool,
    mp3_streaming_url: Option<String>,
    mp3_download_url: Option<String>,
    error_message: Option<String>,
}

impl VoicevoxProvider {
    /// Create a provider. The client timeout mirrors the configured budget.
    pub fn new(config: VoicevoxConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Speaker id for `voice`.
    pub fn speaker_for(&self, voice: VoiceType) -> &str {
        self.config
            .voices
            .get(voice.as_str())
            .or_else(|| self.config.voices.get(VoiceType::Default.as_str()))
            .map_or(FALLBACK_SPEAKER, String::as_str)
    }

    fn synthesis_url(&self) -> String {
        format!(
            "{}/v3/voicevox/synthesis",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn request_audio_url(&self, request: &SpeechRequest) -> Result<String, TtsError> {
        let speaker = self.speaker_for(request.voice);
        let mut query: Vec<(&str, &str)> = vec![("text", request.text.as_str()), ("speaker", speaker)];
        if !self.config.api_key.is_empty() {
            query.push(("key", self.config.api_key.as_str()));
        }

        let req = self.client.get(self.synthesis_url()).query(&query).build()?;
        tracing::debug!(url = %super::mask_key(req.url().as_str()), speaker, "requesting voicevox synthesis");

        let resp = self.client.execute(req).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(super::map_http_error(status, &body));
        }

        let body: SynthesisResponse = resp
            .json()
            .await
            .map_err(|e| TtsError::InvalidResponse(e.to_string()))?;
        if !body.success {
            return Err(TtsError::InvalidResponse(
                body.error_message
                    .unwrap_or_else(|| "synthesis reported failure".to_owned()),
            ));
        }
        body.mp3_streaming_url
            .or(body.mp3_download_url)
            .ok_or_else(|| TtsError::InvalidResponse("no mp3StreamingUrl in response".to_owned()))
    }
}

#[async_trait]
impl SpeechProvider for VoicevoxProvider {
    fn name(&self) -> &str {
        "voicevox"
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.config.timeout_secs))
    }

    async fn synthesize(
        &self,
        request: &SpeechRequest,
        _scratch: &Path,
    ) -> Result<SynthesizedAudio, TtsError> {
        let audio_url = self.request_audio_url(request).await?;

        let resp = self.client.get(&audio_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(super::map_http_error(status, &body));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = resp.bytes().await?.to_vec();
        super::audio_payload(content_type.as_deref(), bytes)
    }
}
