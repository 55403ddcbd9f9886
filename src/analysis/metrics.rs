//! Performance metrics over a warping path
//!
//! Three complementary measures, each in [0, 1]:
//!
//! 1. **Pitch accuracy**: mean of `1 - d / 6` over pairs where both frames
//!    are voiced, `d` being the circular pitch-class distance. 0.0 when no
//!    pair is voiced on both sides
//! 2. **Voiced overlap**: fraction of pairs whose voicing agrees (both voiced
//!    or both unvoiced)
//! 3. **Timing alignment**: `1 - mean(|i - j|) / (max(len_ref, len_perf) - 1)`,
//!    the path's mean distance from the identity diagonal relative to the
//!    largest possible distance
//!
//! A performance without a single voiced frame gets 0.0 pitch accuracy and
//! 0.0 timing alignment; its overlap is still computed.

use super::result::PerformanceMetrics;
use crate::features::alignment::AlignmentResult;
use crate::features::pitch::contour::NormalizedContour;
use crate::features::pitch::normalization::{circular_distance, MAX_PITCH_CLASS_DISTANCE};

/// Compute metrics for an aligned pair of contours
///
/// Path indices outside either contour are ignored.
pub fn compute_metrics(
    reference: &NormalizedContour,
    performance: &NormalizedContour,
    alignment: &AlignmentResult,
) -> PerformanceMetrics {
    let mut pitch_sum = 0.0f64;
    let mut both_voiced = 0usize;
    let mut agreeing = 0usize;
    let mut deviation_sum = 0.0f64;
    let mut pairs = 0usize;

    for &(i, j) in &alignment.path {
        let (Some(r), Some(p)) = (reference.frames.get(i), performance.frames.get(j)) else {
            continue;
        };
        pairs += 1;
        deviation_sum += i.abs_diff(j) as f64;

        if r.is_voiced() == p.is_voiced() {
            agreeing += 1;
        }
        if let (Some(a), Some(b)) = (r.pitch_class(), p.pitch_class()) {
            let d = circular_distance(a, b);
            pitch_sum += (1.0 - d / MAX_PITCH_CLASS_DISTANCE).clamp(0.0, 1.0) as f64;
            both_voiced += 1;
        }
    }

    let voiced_overlap = ratio(agreeing as f64, pairs as f64);

    if performance.voiced_count() == 0 {
        log::debug!("Performance has no voiced frames: pitch and timing are zero");
        return PerformanceMetrics {
            pitch_accuracy: 0.0,
            timing_alignment: 0.0,
            voiced_overlap,
        };
    }

    let pitch_accuracy = ratio(pitch_sum, both_voiced as f64);

    let max_deviation = reference.len().max(performance.len()).saturating_sub(1) as f64;
    let timing_alignment = if max_deviation == 0.0 {
        1.0
    } else if pairs == 0 {
        0.0
    } else {
        (1.0 - (deviation_sum / pairs as f64) / max_deviation).clamp(0.0, 1.0) as f32
    };

    log::debug!(
        "Metrics over {} pairs ({} both voiced): pitch={:.3}, timing={:.3}, overlap={:.3}",
        pairs,
        both_voiced,
        pitch_accuracy,
        timing_alignment,
        voiced_overlap
    );

    PerformanceMetrics {
        pitch_accuracy,
        timing_alignment,
        voiced_overlap,
    }
}

/// `numerator / denominator` clamped to [0, 1], 0 for an empty denominator
fn ratio(numerator: f64, denominator: f64) -> f32 {
    if denominator > 0.0 {
        (numerator / denominator).clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}
