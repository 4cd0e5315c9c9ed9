//! Tool discovery report served by `GET /debug-lipsync`.
//!
//! Covers what the lip-sync path depends on: ffmpeg/ffprobe, the rhubarb binary and its
//! pronunciation dictionary, the work directory, the speech chain, and a live recognizer
//! probe on a generated 1 s 440 Hz tone.

use std::path::PathBuf;

use serde::Serialize;

use crate::lipsync::RhubarbRecognizer;
use crate::media::{self, MediaTools};
use crate::pipeline::{Relay, RequestContext};

/// Sample rate of the probe tone.
pub const PROBE_SAMPLE_RATE: u32 = 16_000;

const PROBE_FREQUENCY_HZ: f32 = 440.0;
const PROBE_SECONDS: f32 = 1.0;
const PROBE_DIALOG: &str = "Testing one two three";

/// External tools located at startup.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInventory {
    /// ffmpeg binary.
    pub ffmpeg: Option<PathBuf>,
    /// ffprobe binary.
    pub ffprobe: Option<PathBuf>,
    /// rhubarb binary.
    pub rhubarb: Option<PathBuf>,
    /// Pronunciation dictionary passed to rhubarb.
    pub dictionary: Option<PathBuf>,
}

impl ToolInventory {
    /// Snapshot of what discovery found.
    pub fn from_discovery(media: &MediaTools, rhubarb: Option<&RhubarbRecognizer>) -> Self {
        Self {
            ffmpeg: media.ffmpeg().map(PathBuf::from),
            ffprobe: media.ffprobe().map(PathBuf::from),
            rhubarb: rhubarb.map(|r| r.binary().to_path_buf()),
            dictionary: rhubarb.and_then(|r| r.dictionary().map(PathBuf::from)),
        }
    }

    /// Log the inventory once at startup.
    pub fn log_summary(&self) {
        let show = |p: &Option<PathBuf>| {
            p.as_ref()
                .map_or_else(|| "not found".to_owned(), |p| p.display().to_string())
        };
        tracing::info!(
            ffmpeg = %show(&self.ffmpeg),
            ffprobe = %show(&self.ffprobe),
            rhubarb = %show(&self.rhubarb),
            dictionary = %show(&self.dictionary),
            "external tools"
        );
        if self.rhubarb.is_none() {
            tracing::warn!("rhubarb not found, lip-sync will be synthetic");
        }
        if self.ffmpeg.is_none() {
            tracing::warn!("ffmpeg not found, MP3 speech cannot be recognized");
        }
    }
}

/// Outcome of running the recognizer on the probe tone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The probe was not run.
    Skipped {
        /// Why.
        reason: String,
    },
    /// The recognizer produced a valid track.
    Passed {
        /// Number of cues.
        cues: usize,
        /// Track length in seconds.
        duration: f64,
    },
    /// The recognizer failed.
    Failed {
        /// Error message.
        error: String,
    },
}

/// Full report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    /// Crate version.
    pub version: String,
    /// Target OS.
    pub os: String,
    /// Target architecture.
    pub arch: String,
    /// Process working directory.
    pub current_dir: Option<PathBuf>,
    /// Located tools.
    pub tools: ToolInventory,
    /// Root of request artifacts.
    pub work_dir: PathBuf,
    /// Whether `work_dir` exists.
    pub work_dir_exists: bool,
    /// Speech providers in fallback order.
    pub speech_providers: Vec<String>,
    /// Requests answered with the silent clip so far.
    pub silence_fallbacks: u32,
    /// Recognizer probe result.
    pub probe: ProbeOutcome,
}

/// Build the report, running the recognizer probe when a recognizer is configured.
pub async fn run(relay: &Relay, tools: &ToolInventory) -> DiagnosticsReport {
    let work_dir = relay.work_dir().to_path_buf();
    let work_dir_exists = tokio::fs::metadata(&work_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    DiagnosticsReport {
        version: env!("CARGO_PKG_VERSION").to_owned(),
        os: std::env::consts::OS.to_owned(),
        arch: std::env::consts::ARCH.to_owned(),
        current_dir: std::env::current_dir().ok(),
        tools: tools.clone(),
        work_dir,
        work_dir_exists,
        speech_providers: relay.speech().provider_names(),
        silence_fallbacks: relay.speech().silence_count(),
        probe: probe(relay).await,
    }
}

async fn probe(relay: &Relay) -> ProbeOutcome {
    if !relay.lipsync().has_recognizer() {
        return ProbeOutcome::Skipped {
            reason: "no recognizer configured".to_owned(),
        };
    }

    let ctx = match RequestContext::create(relay.work_dir(), false).await {
        Ok(ctx) => ctx,
        Err(e) => {
            return ProbeOutcome::Failed {
                error: format!("cannot create probe directory: {e}"),
            };
        }
    };
    let outcome = run_probe(relay, &ctx).await;
    ctx.finish().await;
    outcome
}

async fn run_probe(relay: &Relay, ctx: &RequestContext) -> ProbeOutcome {
    let bytes = match media::tone_wav_bytes(PROBE_FREQUENCY_HZ, PROBE_SECONDS, PROBE_SAMPLE_RATE) {
        Ok(bytes) => bytes,
        Err(e) => return ProbeOutcome::Failed { error: e.to_string() },
    };
    let wav = ctx.dir().join("probe.wav");
    if let Err(e) = tokio::fs::write(&wav, bytes).await {
        return ProbeOutcome::Failed {
            error: format!("cannot write probe audio: {e}"),
        };
    }

    match relay.lipsync().recognize(&wav, PROBE_DIALOG).await {
        Ok(track) => ProbeOutcome::Passed {
            cues: track.mouth_cues.len(),
            duration: track.duration(),
        },
        Err(e) => {
            tracing::warn!(request_id = %ctx.id(), error = %e, "lip-sync probe failed");
            ProbeOutcome::Failed { error: e.to_string() }
        }
    }
}
