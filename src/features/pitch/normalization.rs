//! Octave-invariant pitch normalization
//!
//! Maps every voiced frame to a continuous pitch class in [0, 12): the MIDI
//! note number modulo one octave. Pitch trackers often jump an octave, and a
//! singer may perform an octave away from the reference; folding both
//! contours into one octave makes scoring compare melodic shape instead of
//! register.
//!
//! # Example
//!
//! ```
//! use karaoke_scorer::features::pitch::normalization::pitch_class;
//!
//! // A4 and A5 share a pitch class (A = 9)
//! assert!((pitch_class(440.0) - 9.0).abs() < 1e-4);
//! assert!((pitch_class(880.0) - 9.0).abs() < 1e-4);
//! ```

use super::contour::{NormalizedContour, NormalizedFrame, NormalizedPitch, PitchContour, Voicing};
use super::smoothing::smooth_voiced_segments;
use crate::config::NormalizationConfig;

/// Semitones per octave
pub const OCTAVE: f32 = 12.0;

/// Largest possible circular distance between two pitch classes
pub const MAX_PITCH_CLASS_DISTANCE: f32 = OCTAVE / 2.0;

/// Continuous MIDI note number: `69 + 12·log2(f / 440)`
pub fn hz_to_midi(frequency_hz: f32) -> f32 {
    69.0 + OCTAVE * (frequency_hz / 440.0).log2()
}

/// Fold a MIDI note number into [0, 12)
pub fn fold_to_octave(midi: f32) -> f32 {
    let folded = midi.rem_euclid(OCTAVE);
    // rem_euclid can round up to exactly 12.0 for tiny negative inputs
    if folded >= OCTAVE {
        0.0
    } else {
        folded
    }
}

/// Pitch class of a frequency, in [0, 12)
pub fn pitch_class(frequency_hz: f32) -> f32 {
    fold_to_octave(hz_to_midi(frequency_hz))
}

/// Circular distance between two pitch classes: `min(|a-b|, 12-|a-b|)`
///
/// Result lies in [0, 6].
pub fn circular_distance(a: f32, b: f32) -> f32 {
    let diff = (a - b).abs() % OCTAVE;
    diff.min(OCTAVE - diff)
}

/// Normalize a contour with default settings (no smoothing)
pub fn normalize(contour: &PitchContour) -> NormalizedContour {
    normalize_with(contour, &NormalizationConfig::default())
}

/// Normalize a contour
///
/// Unvoiced frames pass through unchanged; frame count and timestamps are
/// preserved. With `config.smoothing`, MIDI values of each voiced segment
/// are smoothed before folding, so the filter never sees the wrap at 12.
pub fn normalize_with(contour: &PitchContour, config: &NormalizationConfig) -> NormalizedContour {
    let mut midi: Vec<Option<f32>> = contour
        .frames
        .iter()
        .map(|frame| frame.frequency_hz().map(hz_to_midi))
        .collect();

    if config.smoothing {
        smooth_voiced_segments(&mut midi);
    }

    let frames = contour
        .frames
        .iter()
        .zip(midi)
        .map(|(frame, midi)| {
            let pitch = match (frame.voicing, midi) {
                (Voicing::Voiced { frequency_hz }, Some(midi)) => NormalizedPitch::Voiced {
                    frequency_hz,
                    pitch_class: fold_to_octave(midi),
                },
                _ => NormalizedPitch::Unvoiced,
            };
            NormalizedFrame {
                time_sec: frame.time_sec,
                pitch,
                confidence: frame.confidence,
            }
        })
        .collect();

    let normalized = NormalizedContour {
        hop_sec: contour.hop_sec,
        frames,
    };
    log::debug!(
        "Normalized {} frames ({} voiced, smoothing={})",
        normalized.len(),
        normalized.voiced_count(),
        config.smoothing
    );
    normalized
}
