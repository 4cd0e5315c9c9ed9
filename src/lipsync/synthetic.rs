//! Synthetic mouth cues for audio the recognizer could not handle.
//!
//! The track opens with a closed-mouth cue from 0.0 to 0.1 s, then fills the rest
//! of the clip with cues of random length in [0.1, 0.3] s and random shapes. The
//! final cue is clipped so the track ends exactly at the clip duration.

use rand::Rng;

use super::{MouthCue, MouthShape, VisemeTrack};

/// Length of the leading closed-mouth cue.
pub const LEADING_CUE_SECS: f64 = 0.1;

/// Shortest random cue.
pub const MIN_CUE_SECS: f64 = 0.1;

/// Longest random cue.
pub const MAX_CUE_SECS: f64 = 0.3;

/// Shorter (or non-finite) durations are raised to this so the track keeps its
/// leading cue plus at least one more.
pub const MIN_TRACK_SECS: f64 = 0.2;

/// Longer durations are cut to this. A corrupt WAV header can claim billions of seconds.
pub const MAX_TRACK_SECS: f64 = 600.0;

/// Generate a synthetic track covering `[0, duration]`, with `duration` clamped to
/// [`MIN_TRACK_SECS`, `MAX_TRACK_SECS`].
pub fn generate<R: Rng>(duration: f64, rng: &mut R) -> VisemeTrack {
    let duration = if duration.is_finite() {
        duration.clamp(MIN_TRACK_SECS, MAX_TRACK_SECS)
    } else {
        MIN_TRACK_SECS
    };

    let mut cues = Vec::with_capacity((duration / 0.2).ceil() as usize + 1);
    cues.push(MouthCue {
        start: 0.0,
        end: LEADING_CUE_SECS,
        value: MouthShape::X,
    });

    let mut t = LEADING_CUE_SECS;
    while t < duration {
        let length = rng.gen_range(MIN_CUE_SECS..=MAX_CUE_SECS);
        let end = round_ms(t + length).min(duration);
        let value = MouthShape::ALL[rng.gen_range(0..MouthShape::ALL.len())];
        cues.push(MouthCue { start: t, end, value });
        t = end;
    }

    VisemeTrack { mouth_cues: cues }
}

fn round_ms(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}
