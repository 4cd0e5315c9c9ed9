//! ResponsiveVoice text synthesis endpoint. Returns MP3 bytes directly.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::{SpeechProvider, SpeechRequest, SynthesizedAudio, TtsError, VoiceType};
use crate::config::ResponsiveVoiceConfig;

const FALLBACK_VOICE: &str = "en-US-Wavenet-F";

/// ResponsiveVoice provider.
#[derive(Debug, Clone)]
pub struct ResponsiveVoiceProvider {
    client: reqwest::Client,
    config: ResponsiveVoiceConfig,
}

impl ResponsiveVoiceProvider {
    /// Create a provider. The client timeout mirrors the configured budget.
    pub fn new(config: ResponsiveVoiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Voice name for `voice`.
    pub fn voice_for(&self, voice: VoiceType) -> &str {
        self.config
            .voices
            .get(voice.as_str())
            .or_else(|| self.config.voices.get(VoiceType::Default.as_str()))
            .map_or(FALLBACK_VOICE, String::as_str)
    }

    /// Query parameters for `request`. Prosody is mapped onto the endpoint's 0–1 scales,
    /// where 0.5 is natural pitch and rate.
    fn query(&self, request: &SpeechRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("text", request.text.clone()),
            ("lang", self.config.lang.clone()),
            ("engine", self.config.engine.clone()),
            ("name", self.voice_for(request.voice).to_owned()),
            ("pitch", format!("{:.2}", (request.pitch / 2.0).clamp(0.0, 1.0))),
            ("rate", format!("{:.2}", (request.speed / 2.0).clamp(0.0, 1.0))),
            ("volume", format!("{:.2}", f32::from(request.volume.min(100)) / 100.0)),
        ];
        if !self.config.api_key.is_empty() {
            query.push(("key", self.config.api_key.clone()));
        }
        query.push(("gender", gender(request.voice).to_owned()));
        query
    }
}

fn content_type(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn gender(voice: VoiceType) -> &'static str {
    match voice {
        VoiceType::Male => "male",
        _ => "female",
    }
}

#[async_trait]
impl SpeechProvider for ResponsiveVoiceProvider {
    fn name(&self) -> &str {
        "responsive_voice"
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.config.timeout_secs))
    }

    async fn synthesize(
        &self,
        request: &SpeechRequest,
        _scratch: &Path,
    ) -> Result<SynthesizedAudio, TtsError> {
        let url = format!(
            "{}/v1/text:synthesize",
            self.config.base_url.trim_end_matches('/')
        );
        let req = self.client.get(url).query(&self.query(request)).build()?;
        tracing::debug!(url = %super::mask_key(req.url().as_str()), "requesting responsive voice synthesis");

        let resp = self.client.execute(req).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(super::map_http_error(status, &body));
        }
        let content_type = content_type(&resp);
        let bytes = resp.bytes().await?.to_vec();
        super::audio_payload(content_type.as_deref(), bytes)
    }
}
