//! Audio conversion and inspection.
//!
//! [`MediaTools`] wraps the ffmpeg/ffprobe command-line tools located once at startup.
//! The WAV helpers work in-process with `hound` and need no external tools.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::config::MediaConfig;

/// Sample rate used for generated clips (matches the ffmpeg `anullsrc` invocation).
pub const GENERATED_SAMPLE_RATE: u32 = 24_000;

/// Speaking rate used to estimate speech length from text.
const WORDS_PER_MINUTE: f64 = 150.0;

/// Errors from audio tooling.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// The required tool was not found at startup.
    #[error("{0} is not available")]
    ToolMissing(&'static str),

    /// The tool could not be spawned.
    #[error("failed to run {tool}: {reason}")]
    Spawn {
        /// Tool name.
        tool: &'static str,
        /// Underlying I/O error.
        reason: String,
    },

    /// The tool exited unsuccessfully.
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        /// Tool name.
        tool: &'static str,
        /// Exit status text.
        status: String,
        /// Trimmed stderr output.
        stderr: String,
    },

    /// Tool output could not be interpreted.
    #[error("unexpected output: {0}")]
    Parse(String),

    /// WAV encode/decode error.
    #[error("wav error: {0}")]
    Wav(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Located ffmpeg / ffprobe executables.
#[derive(Debug, Clone, Default)]
pub struct MediaTools {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
}

impl MediaTools {
    /// Locate the tools from explicit config paths or `PATH`.
    pub fn discover(config: &MediaConfig) -> Self {
        Self {
            ffmpeg: crate::discovery::locate_binary("ffmpeg", config.ffmpeg.as_deref(), &[]),
            ffprobe: crate::discovery::locate_binary("ffprobe", config.ffprobe.as_deref(), &[]),
        }
    }

    /// Tools at known paths.
    pub fn new(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        Self { ffmpeg, ffprobe }
    }

    /// No external tools; every tool-backed operation fails with [`MediaError::ToolMissing`].
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Path of the located ffmpeg binary.
    pub fn ffmpeg(&self) -> Option<&Path> {
        self.ffmpeg.as_deref()
    }

    /// Path of the located ffprobe binary.
    pub fn ffprobe(&self) -> Option<&Path> {
        self.ffprobe.as_deref()
    }

    /// Convert any ffmpeg-readable file to WAV.
    pub async fn to_wav(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        let ffmpeg = self.ffmpeg.as_deref().ok_or(MediaError::ToolMissing("ffmpeg"))?;
        let started = std::time::Instant::now();
        let mut cmd = tokio::process::Command::new(ffmpeg);
        cmd.args(["-y", "-loglevel", "error", "-i"]).arg(input).arg(output);
        run("ffmpeg", cmd).await?;
        tracing::debug!(
            input = %input.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "converted audio to wav"
        );
        Ok(())
    }

    /// Render `seconds` of mono silence as MP3 and return the encoded bytes.
    pub async fn silence_mp3(&self, seconds: f32, output: &Path) -> Result<Vec<u8>, MediaError> {
        let ffmpeg = self.ffmpeg.as_deref().ok_or(MediaError::ToolMissing("ffmpeg"))?;
        let mut cmd = tokio::process::Command::new(ffmpeg);
        cmd.args(["-y", "-loglevel", "error", "-f", "lavfi", "-i"])
            .arg(format!("anullsrc=r={GENERATED_SAMPLE_RATE}:cl=mono"))
            .arg("-t")
            .arg(format!("{seconds}"))
            .args(["-q:a", "9", "-acodec", "libmp3lame"])
            .arg(output);
        run("ffmpeg", cmd).await?;
        Ok(tokio::fs::read(output).await?)
    }

    /// Container duration in seconds as reported by ffprobe.
    pub async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let ffprobe = self.ffprobe.as_deref().ok_or(MediaError::ToolMissing("ffprobe"))?;
        let mut cmd = tokio::process::Command::new(ffprobe);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path);
        let stdout = run("ffprobe", cmd).await?;
        parse_duration(&stdout)
    }

    /// Best-effort speech duration: WAV header, then ffprobe, then a word-count estimate.
    ///
    /// Returns `None` only when every source fails.
    pub async fn resolve_duration(&self, audio: &Path, wav: Option<&Path>, text: &str) -> Option<f64> {
        if let Some(wav) = wav {
            match wav_duration(wav) {
                Ok(d) if d > 0.0 => return Some(d),
                Ok(_) => {}
                Err(e) => tracing::debug!(path = %wav.display(), error = %e, "wav header unreadable"),
            }
        }
        match self.probe_duration(audio).await {
            Ok(d) if d > 0.0 => return Some(d),
            Ok(_) => {}
            Err(e) => tracing::debug!(path = %audio.display(), error = %e, "ffprobe duration failed"),
        }
        estimate_speech_secs(text)
    }
}

/// Run a tool to completion, returning stdout on success.
async fn run(
    tool: &'static str,
    mut cmd: tokio::process::Command,
) -> Result<String, MediaError> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| MediaError::Spawn {
            tool,
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(MediaError::Failed {
            tool,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse ffprobe's bare `duration` output.
pub fn parse_duration(output: &str) -> Result<f64, MediaError> {
    let trimmed = output.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| MediaError::Parse(format!("not a duration: {trimmed:?}")))?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(MediaError::Parse(format!("invalid duration: {value}")))
    }
}

/// Estimated speaking time for `text` at a conversational pace. `None` for text without words.
pub fn estimate_speech_secs(text: &str) -> Option<f64> {
    let words = text.split_whitespace().count();
    (words > 0).then(|| words as f64 * 60.0 / WORDS_PER_MINUTE)
}

/// Duration in seconds from a WAV header.
pub fn wav_duration(path: &Path) -> Result<f64, MediaError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| MediaError::Wav(format!("cannot open {}: {e}", path.display())))?;
    let sample_rate = reader.spec().sample_rate;
    if sample_rate == 0 {
        return Err(MediaError::Wav("zero sample rate".into()));
    }
    Ok(f64::from(reader.duration()) / f64::from(sample_rate))
}

/// Encode `seconds` of 16-bit mono silence as an in-memory WAV file.
pub fn silent_wav_bytes(seconds: f32, sample_rate: u32) -> Result<Vec<u8>, MediaError> {
    let frames = frame_count(seconds, sample_rate);
    encode_wav_mono(std::iter::repeat_n(0i16, frames), sample_rate)
}

/// Encode a sine tone as an in-memory 16-bit mono WAV file.
pub fn tone_wav_bytes(frequency: f32, seconds: f32, sample_rate: u32) -> Result<Vec<u8>, MediaError> {
    let frames = frame_count(seconds, sample_rate);
    let step = std::f32::consts::TAU * frequency / sample_rate as f32;
    let samples = (0..frames).map(|n| {
        let v = (n as f32 * step).sin() * 0.5;
        (v * i16::MAX as f32).round() as i16
    });
    encode_wav_mono(samples, sample_rate)
}

fn frame_count(seconds: f32, sample_rate: u32) -> usize {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    (seconds * sample_rate as f32).round() as usize
}

fn encode_wav_mono(
    samples: impl Iterator<Item = i16>,
    sample_rate: u32,
) -> Result<Vec<u8>, MediaError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| MediaError::Wav(format!("failed to create wav writer: {e}")))?;
        for s in samples {
            writer
                .write_sample(s)
                .map_err(|e| MediaError::Wav(format!("failed to write wav sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| MediaError::Wav(format!("failed to finalize wav: {e}")))?;
    }
    Ok(cursor.into_inner())
}
