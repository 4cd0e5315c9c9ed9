//! Configuration types for the relay service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Placeholder shown in place of a configured API key.
pub const REDACTED: &str = "****";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP listener and CORS settings.
    pub server: ServerConfig,
    /// Language model settings.
    pub llm: LlmConfig,
    /// Text-to-speech provider chain.
    pub tts: TtsConfig,
    /// Audio conversion tools.
    pub media: MediaConfig,
    /// Phoneme recognizer and synthetic fallback.
    pub lipsync: LipsyncConfig,
    /// Transient per-request artifacts.
    pub storage: StorageConfig,
    /// Welcome message returned for empty input.
    pub greeting: GreetingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` = auto-assign).
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Optional directory with a built frontend, served for unmatched GET requests.
    pub static_dir: Option<PathBuf>,
    /// Maximum accepted JSON body size in bytes.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            allowed_origins: vec!["http://localhost:5173".to_owned()],
            static_dir: None,
            body_limit_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Language model configuration (Gemini `generateContent` API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API base URL.
    pub base_url: String,
    /// Model name, e.g. `gemini-2.0-flash`.
    pub model: String,
    /// API key. Usually supplied via `GEMINI_API_KEY`.
    pub api_key: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate per reply.
    pub max_output_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            model: "gemini-2.0-flash".to_owned(),
            api_key: String::new(),
            temperature: 0.7,
            max_output_tokens: 800,
            timeout_secs: 30,
        }
    }
}

/// Supported remote TTS vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsProviderKind {
    /// VOICEVOX via the tts.quest hosted API (JSON, then MP3 download).
    Voicevox,
    /// ResponsiveVoice text synthesis endpoint (direct MP3 body).
    ResponsiveVoice,
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Remote providers in fallback order. The local silence provider is always appended.
    pub providers: Vec<TtsProviderKind>,
    /// Payloads smaller than this are treated as provider failures.
    pub min_audio_bytes: usize,
    /// Length of the silent placeholder clip in seconds.
    pub silence_seconds: f32,
    /// VOICEVOX / tts.quest settings.
    pub voicevox: VoicevoxConfig,
    /// ResponsiveVoice settings.
    pub responsive_voice: ResponsiveVoiceConfig,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            providers: vec![TtsProviderKind::Voicevox, TtsProviderKind::ResponsiveVoice],
            min_audio_bytes: 100,
            silence_seconds: 1.0,
            voicevox: VoicevoxConfig::default(),
            responsive_voice: ResponsiveVoiceConfig::default(),
        }
    }
}

/// A voice offered to the frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceEntry {
    /// Provider voice identifier.
    pub id: String,
    /// Human readable label.
    pub name: String,
}

/// tts.quest VOICEVOX provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicevoxConfig {
    /// API base URL.
    pub base_url: String,
    /// API key. Usually supplied via `TTS_OPEN_API_KEY`.
    pub api_key: String,
    /// Budget for the synthesis call plus the audio download.
    pub timeout_secs: u64,
    /// Voice type (`default`, `female`, `male`, `child`) to speaker id.
    pub voices: BTreeMap<String, String>,
    /// Labels for `GET /voices`, keyed by speaker id.
    pub labels: BTreeMap<String, String>,
}

impl Default for VoicevoxConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tts.quest".to_owned(),
            api_key: String::new(),
            timeout_secs: 15,
            voices: BTreeMap::from([
                ("default".to_owned(), "3".to_owned()),
                ("female".to_owned(), "3".to_owned()),
                ("male".to_owned(), "10".to_owned()),
                ("child".to_owned(), "1".to_owned()),
            ]),
            labels: BTreeMap::from([
                ("3".to_owned(), "Female (English)".to_owned()),
                ("10".to_owned(), "Male (English)".to_owned()),
                ("1".to_owned(), "Child (English)".to_owned()),
            ]),
        }
    }
}

/// ResponsiveVoice provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsiveVoiceConfig {
    /// API base URL.
    pub base_url: String,
    /// API key. Usually supplied via `RESPONSIVE_VOICE_KEY`.
    pub api_key: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Language tag sent with every request.
    pub lang: String,
    /// Engine name.
    pub engine: String,
    /// Voice type (`default`, `female`, `male`, `child`) to voice name.
    pub voices: BTreeMap<String, String>,
}

impl Default for ResponsiveVoiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://texttospeech.responsivevoice.org".to_owned(),
            api_key: String::new(),
            timeout_secs: 10,
            lang: "en-US".to_owned(),
            engine: "g1".to_owned(),
            voices: BTreeMap::from([
                ("default".to_owned(), "en-US-Wavenet-F".to_owned()),
                ("female".to_owned(), "en-US-Wavenet-F".to_owned()),
                ("male".to_owned(), "en-US-Wavenet-D".to_owned()),
                ("child".to_owned(), "en-US-Wavenet-F".to_owned()),
            ]),
        }
    }
}

/// Audio conversion tool locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Explicit ffmpeg path. Falls back to `PATH` lookup.
    pub ffmpeg: Option<PathBuf>,
    /// Explicit ffprobe path. Falls back to `PATH` lookup.
    pub ffprobe: Option<PathBuf>,
}

/// Lip-sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LipsyncConfig {
    /// Explicit rhubarb executable path.
    pub rhubarb: Option<PathBuf>,
    /// Explicit pronunciation dictionary path.
    pub dictionary: Option<PathBuf>,
    /// Directories probed (in order) for `rhubarb` and `res/sphinx/cmudict-en-us.dict`
    /// when no explicit path is set.
    pub search_dirs: Vec<PathBuf>,
    /// Recognizer passed to rhubarb (`phonetic` or `pocketSphinx`).
    pub recognizer: String,
    /// Seconds of synthetic cues used when the audio duration cannot be determined.
    pub fallback_duration_secs: f32,
}

impl Default for LipsyncConfig {
    fn default() -> Self {
        Self {
            rhubarb: None,
            dictionary: None,
            search_dirs: vec![PathBuf::from("backend/bin"), PathBuf::from("bin")],
            recognizer: "phonetic".to_owned(),
            fallback_duration_secs: 3.0,
        }
    }
}

/// Storage for transient audio handed to external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; each request gets its own subdirectory.
    pub work_dir: PathBuf,
    /// Keep per-request directories after the response is sent.
    pub keep_artifacts: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("audios"),
            keep_artifacts: false,
        }
    }
}

/// Greeting returned for an empty message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingConfig {
    /// Greeting text.
    pub text: String,
    /// Pre-recorded greeting audio.
    pub audio_file: PathBuf,
    /// Pre-computed mouth cues for the greeting audio.
    pub lipsync_file: PathBuf,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            text: "Hello! I'm your AI reader. Type text for me to read or ask me a question!"
                .to_owned(),
            audio_file: PathBuf::from("audios/greeting.mp3"),
            lipsync_file: PathBuf::from("audios/greeting.json"),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::RelayError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> crate::error::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::error::RelayError::Config(e.to_string()))
    }

    /// Copy with every configured API key replaced by a mask, for display.
    pub fn redacted(&self) -> Self {
        fn mask(key: &mut String) {
            if !key.is_empty() {
                *key = REDACTED.to_owned();
            }
        }

        let mut copy = self.clone();
        mask(&mut copy.llm.api_key);
        mask(&mut copy.tts.voicevox.api_key);
        mask(&mut copy.tts.responsive_voice.api_key);
        copy
    }

    /// Returns the default config file path: `~/.config/avatar-relay/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("avatar-relay").join("config.toml")
        } else if let Some(config) = dirs::config_dir() {
            config.join("avatar-relay").join("config.toml")
        } else {
            PathBuf::from("/tmp/avatar-relay/config.toml")
        }
    }

    /// Overlay secrets and deployment knobs from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup (used by [`Self::apply_env_overrides`]).
    ///
    /// Empty values are ignored. An unparsable `PORT` is logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GEMINI_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(key) = get("TTS_OPEN_API_KEY") {
            self.tts.voicevox.api_key = key;
        }
        if let Some(key) = get("RESPONSIVE_VOICE_KEY") {
            self.tts.responsive_voice.api_key = key;
        }
        if let Some(port) = get("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!(value = %port, error = %e, "ignoring invalid PORT"),
            }
        }
        if let Some(origins) = get("RELAY_ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_owned)
                .collect();
        }
    }

    /// Voices advertised by `GET /voices`: the primary provider's speaker ids, deduplicated,
    /// in voice-type order.
    pub fn voice_catalog(&self) -> Vec<VoiceEntry> {
        let mut entries: Vec<VoiceEntry> = Vec::new();
        let ordered = crate::tts::VoiceType::ALL
            .iter()
            .filter_map(|voice| self.tts.voicevox.voices.get(voice.as_str()));
        for id in ordered {
            if entries.iter().any(|e| &e.id == id) {
                continue;
            }
            let name = self
                .tts
                .voicevox
                .labels
                .get(id)
                .cloned()
                .unwrap_or_else(|| format!("Speaker {id}"));
            entries.push(VoiceEntry {
                id: id.clone(),
                name,
            });
        }
        entries
    }
}
