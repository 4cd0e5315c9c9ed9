//! Mouth-cue tracks for lip-sync animation.
//!
//! A track is an ordered list of [`MouthCue`]s labelled with the nine mouth shapes
//! used by the avatar (A–H plus X for a closed/resting mouth). Tracks come from an
//! external phoneme recognizer when one is available and produces usable output,
//! and from the synthetic generator otherwise. Callers cannot tell the two apart.

pub mod rhubarb;
pub mod synthetic;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::media::MediaTools;
use crate::tts::AudioFormat;

pub use rhubarb::RhubarbRecognizer;

/// Minimum number of cues for a recognizer track to be accepted.
pub const MIN_RECOGNIZED_CUES: usize = 2;

/// Mouth shape labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouthShape {
    /// Closed mouth for P, B, M.
    A,
    /// Slightly open, clenched teeth.
    B,
    /// Open mouth.
    C,
    /// Wide open mouth.
    D,
    /// Slightly rounded.
    E,
    /// Puckered lips.
    F,
    /// Upper teeth on lower lip (F, V).
    G,
    /// Tongue raised (L).
    H,
    /// Idle / silence.
    X,
}

impl MouthShape {
    /// Every shape, in label order.
    pub const ALL: [MouthShape; 9] = [
        MouthShape::A,
        MouthShape::B,
        MouthShape::C,
        MouthShape::D,
        MouthShape::E,
        MouthShape::F,
        MouthShape::G,
        MouthShape::H,
        MouthShape::X,
    ];
}

/// A timed mouth shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthCue {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Shape shown during `[start, end)`.
    pub value: MouthShape,
}

/// Ordered, non-overlapping mouth cues covering an audio clip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisemeTrack {
    /// Cues ordered by `start`.
    #[serde(rename = "mouthCues")]
    pub mouth_cues: Vec<MouthCue>,
}

impl VisemeTrack {
    /// Parse a recognizer JSON document. Unknown top-level fields (e.g. `metadata`) are ignored.
    pub fn from_json(json: &str) -> Result<Self, LipsyncError> {
        serde_json::from_str(json).map_err(|e| LipsyncError::InvalidOutput(e.to_string()))
    }

    /// Check the structural invariants: enough cues, finite times, `start <= end`,
    /// ordered and non-overlapping.
    pub fn validate(&self) -> Result<(), LipsyncError> {
        if self.mouth_cues.len() < MIN_RECOGNIZED_CUES {
            return Err(LipsyncError::TooFewCues(self.mouth_cues.len()));
        }
        let mut previous_end = 0.0_f64;
        for (i, cue) in self.mouth_cues.iter().enumerate() {
            if !cue.start.is_finite() || !cue.end.is_finite() || cue.start > cue.end {
                return Err(LipsyncError::InvalidOutput(format!("cue {i} has bad bounds")));
            }
            // Allow sub-millisecond jitter from rounded recognizer output.
            if cue.start + 1e-3 < previous_end {
                return Err(LipsyncError::InvalidOutput(format!("cue {i} overlaps its predecessor")));
            }
            previous_end = cue.end;
        }
        Ok(())
    }

    /// End time of the last cue, or zero for an empty track.
    pub fn duration(&self) -> f64 {
        self.mouth_cues.last().map_or(0.0, |c| c.end)
    }
}

/// Lip-sync failures. Always recovered by falling back to a synthetic track.
#[derive(Debug, thiserror::Error)]
pub enum LipsyncError {
    /// No recognizer executable was found at startup.
    #[error("recognizer not available")]
    Unavailable,

    /// The recognizer could not be run or exited unsuccessfully.
    #[error("recognizer failed: {0}")]
    Recognizer(String),

    /// Output was not a valid cue track.
    #[error("invalid recognizer output: {0}")]
    InvalidOutput(String),

    /// Output parsed but had fewer than [`MIN_RECOGNIZED_CUES`] cues.
    #[error("recognizer returned {0} cue(s)")]
    TooFewCues(usize),

    /// Audio preparation failed.
    #[error("audio preparation failed: {0}")]
    Media(#[from] crate::media::MediaError),
}

/// Derives a mouth-cue track from a WAV file.
#[async_trait]
pub trait PhonemeRecognizer: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Recognize mouth cues for `wav`. `dialog` is the text being spoken.
    async fn recognize(&self, wav: &Path, dialog: &str) -> Result<VisemeTrack, LipsyncError>;
}

/// Builds a track for each synthesized clip, never failing.
#[derive(Clone)]
pub struct LipSync {
    recognizer: Option<Arc<dyn PhonemeRecognizer>>,
    media: Arc<MediaTools>,
    fallback_duration_secs: f64,
}

impl std::fmt::Debug for LipSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LipSync")
            .field("recognizer", &self.recognizer.as_ref().map(|r| r.name().to_owned()))
            .field("fallback_duration_secs", &self.fallback_duration_secs)
            .finish()
    }
}

impl LipSync {
    /// Create a lip-sync stage. `recognizer` is `None` when no tool was found.
    pub fn new(
        recognizer: Option<Arc<dyn PhonemeRecognizer>>,
        media: Arc<MediaTools>,
        fallback_duration_secs: f64,
    ) -> Self {
        Self {
            recognizer,
            media,
            fallback_duration_secs,
        }
    }

    /// Whether a recognizer is configured.
    pub fn has_recognizer(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Produce a track for `audio`: convert to WAV if needed, run the recognizer,
    /// validate, and fall back to synthetic cues on any failure.
    pub async fn build_track(&self, audio: &Path, format: AudioFormat, text: &str) -> VisemeTrack {
        let wav = match self.prepare_wav(audio, format).await {
            Ok(wav) => Some(wav),
            Err(e) => {
                tracing::warn!(audio = %audio.display(), error = %e, "wav conversion failed");
                None
            }
        };

        if let Some(wav) = wav.as_deref() {
            match self.recognize(wav, text).await {
                Ok(track) => return track,
                Err(e) => {
                    tracing::warn!(audio = %audio.display(), error = %e, "falling back to synthetic lip-sync");
                }
            }
        }

        let duration = match self.media.resolve_duration(audio, wav.as_deref(), text).await {
            Some(d) => d,
            None => {
                tracing::debug!(
                    fallback_secs = self.fallback_duration_secs,
                    "audio duration unknown, using fallback"
                );
                self.fallback_duration_secs
            }
        };
        if duration > synthetic::MAX_TRACK_SECS {
            tracing::warn!(
                audio = %audio.display(),
                duration,
                max_secs = synthetic::MAX_TRACK_SECS,
                "implausible audio duration, capping synthetic lip-sync"
            );
        }
        synthetic::generate(duration, &mut rand::thread_rng())
    }

    async fn prepare_wav(&self, audio: &Path, format: AudioFormat) -> Result<PathBuf, LipsyncError> {
        match format {
            AudioFormat::Wav => Ok(audio.to_path_buf()),
            AudioFormat::Mp3 => {
                let wav = audio.with_extension("wav");
                self.media.to_wav(audio, &wav).await?;
                Ok(wav)
            }
        }
    }

    /// Run the recognizer on a WAV file and validate its output, without fallback.
    pub async fn recognize(&self, wav: &Path, text: &str) -> Result<VisemeTrack, LipsyncError> {
        let recognizer = self.recognizer.as_ref().ok_or(LipsyncError::Unavailable)?;
        let started = std::time::Instant::now();
        let track = recognizer.recognize(wav, text).await?;
        track.validate()?;
        tracing::debug!(
            recognizer = recognizer.name(),
            cues = track.mouth_cues.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "lip-sync recognized"
        );
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRecognizer {
        track: VisemeTrack,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PhonemeRecognizer for FixedRecognizer {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn recognize(&self, _wav: &Path, _dialog: &str) -> Result<VisemeTrack, LipsyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.track.clone())
        }
    }

    fn cue(start: f64, end: f64, value: MouthShape) -> MouthCue {
        MouthCue { start, end, value }
    }

    fn wav_file(dir: &Path, seconds: f32) -> PathBuf {
        let path = dir.join("message_0.wav");
        std::fs::write(&path, crate::media::silent_wav_bytes(seconds, 8_000).unwrap()).unwrap();
        path
    }

    #[test]
    fn parses_rhubarb_document() {
        let json = r#"{
            "metadata": {"soundFile": "message_0.wav", "duration": 0.5},
            "mouthCues": [
                {"start": 0.00, "end": 0.10, "value": "X"},
                {"start": 0.10, "end": 0.30, "value": "B"},
                {"start": 0.30, "end": 0.50, "value": "H"}
            ]
        }"#;
        let track = VisemeTrack::from_json(json).unwrap();
        assert_eq!(track.mouth_cues.len(), 3);
        assert_eq!(track.mouth_cues[2].value, MouthShape::H);
        assert!(track.validate().is_ok());
        assert!((track.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn serializes_with_mouth_cues_key() {
        let track = VisemeTrack {
            mouth_cues: vec![cue(0.0, 0.1, MouthShape::X)],
        };
        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["mouthCues"][0]["value"], "X");
    }

    #[test]
    fn unknown_shape_is_invalid() {
        let json = r#"{"mouthCues":[{"start":0,"end":0.1,"value":"Z"}]}"#;
        assert!(matches!(
            VisemeTrack::from_json(json),
            Err(LipsyncError::InvalidOutput(_))
        ));
    }

    #[test]
    fn validation_rejects_short_and_overlapping_tracks() {
        let empty = VisemeTrack::default();
        assert!(matches!(empty.validate(), Err(LipsyncError::TooFewCues(0))));

        let overlapping = VisemeTrack {
            mouth_cues: vec![cue(0.0, 0.5, MouthShape::X), cue(0.2, 0.6, MouthShape::A)],
        };
        assert!(matches!(
            overlapping.validate(),
            Err(LipsyncError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn valid_recognizer_track_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let wav = wav_file(dir.path(), 1.0);
        let track = VisemeTrack {
            mouth_cues: vec![cue(0.0, 0.4, MouthShape::X), cue(0.4, 1.0, MouthShape::D)],
        };
        let recognizer = Arc::new(FixedRecognizer {
            track: track.clone(),
            calls: AtomicUsize::new(0),
        });
        let lipsync = LipSync::new(Some(recognizer.clone()), Arc::new(MediaTools::unavailable()), 3.0);

        let built = lipsync.build_track(&wav, AudioFormat::Wav, "hello").await;
        assert_eq!(built, track);
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_recognizer_track_falls_back_to_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let wav = wav_file(dir.path(), 1.5);
        let recognizer = Arc::new(FixedRecognizer {
            track: VisemeTrack::default(),
            calls: AtomicUsize::new(0),
        });
        let lipsync = LipSync::new(Some(recognizer.clone()), Arc::new(MediaTools::unavailable()), 3.0);

        let built = lipsync.build_track(&wav, AudioFormat::Wav, "hello").await;
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
        assert!(built.mouth_cues.len() >= 2);
        assert_eq!(built.mouth_cues[0], cue(0.0, 0.1, MouthShape::X));
        assert!((built.duration() - 1.5).abs() < 1e-6);
    }

    /// 16-bit mono WAV at 1 Hz whose data chunk claims 0xFFFFFF00 bytes.
    fn lying_wav_header() -> Vec<u8> {
        let mut bytes = Vec::with_capacity(244);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&236u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&1u32.to_le_bytes()); // sample rate
        bytes.extend_from_slice(&2u32.to_le_bytes()); // byte rate
        bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&0xFFFF_FF00u32.to_le_bytes());
        bytes.resize(244, 0);
        bytes
    }

    #[tokio::test]
    async fn oversized_wav_header_yields_bounded_track() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("message_0.wav");
        std::fs::write(&wav, lying_wav_header()).unwrap();
        let lipsync = LipSync::new(None, Arc::new(MediaTools::unavailable()), 3.0);

        let built = lipsync.build_track(&wav, AudioFormat::Wav, "hello").await;
        assert!(built.mouth_cues.len() >= 2);
        assert!(built.duration() <= synthetic::MAX_TRACK_SECS);
    }

    #[tokio::test]
    async fn mp3_without_ffmpeg_skips_recognizer() {
        let dir = tempfile::tempdir().unwrap();
        let mp3 = dir.path().join("message_0.mp3");
        std::fs::write(&mp3, b"ID3fake").unwrap();
        let recognizer = Arc::new(FixedRecognizer {
            track: VisemeTrack::default(),
            calls: AtomicUsize::new(0),
        });
        let lipsync = LipSync::new(Some(recognizer.clone()), Arc::new(MediaTools::unavailable()), 3.0);

        let built = lipsync.build_track(&mp3, AudioFormat::Mp3, "").await;
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
        assert!((built.duration() - 3.0).abs() < 1e-6);
    }
}
