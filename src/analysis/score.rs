//! Score synthesis
//!
//! Combines the three metrics into the single number shown to the player:
//!
//! ```text
//! raw   = w_pitch * pitch + w_timing * timing + w_overlap * overlap
//! final = round(100 * raw * max(overlap, floor))
//! ```
//!
//! The overlap multiplier keeps a short burst of perfectly pitched singing
//! from scoring well on a song that was mostly not sung.
//!
//! # Example
//!
//! ```
//! use karaoke_scorer::analysis::result::PerformanceMetrics;
//! use karaoke_scorer::analysis::score::synthesize;
//! use karaoke_scorer::config::ScoreWeights;
//!
//! let metrics = PerformanceMetrics {
//!     pitch_accuracy: 1.0,
//!     timing_alignment: 1.0,
//!     voiced_overlap: 1.0,
//! };
//! assert_eq!(synthesize(&metrics, &ScoreWeights::default()).final_score, 100);
//! ```

use super::result::{PerformanceMetrics, ScoreBreakdown};
use crate::config::ScoreWeights;

/// Weighted combination of the metrics, before the overlap multiplier
pub fn raw_score(metrics: &PerformanceMetrics, weights: &ScoreWeights) -> f32 {
    let raw = weights.pitch * metrics.pitch_accuracy
        + weights.timing * metrics.timing_alignment
        + weights.overlap * metrics.voiced_overlap;
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Produce the final score breakdown
pub fn synthesize(metrics: &PerformanceMetrics, weights: &ScoreWeights) -> ScoreBreakdown {
    let metrics = PerformanceMetrics {
        pitch_accuracy: unit(metrics.pitch_accuracy),
        timing_alignment: unit(metrics.timing_alignment),
        voiced_overlap: unit(metrics.voiced_overlap),
    };

    let raw = raw_score(&metrics, weights);
    let multiplier = metrics.voiced_overlap.max(weights.overlap_floor);
    let scaled = (100.0 * raw * multiplier).round();
    let final_score = if scaled.is_finite() {
        scaled.clamp(0.0, 100.0) as u8
    } else {
        0
    };

    log::debug!(
        "Score: raw={:.3}, overlap multiplier={:.3}, final={}",
        raw,
        multiplier,
        final_score
    );

    ScoreBreakdown::from_metrics(metrics, final_score)
}

/// Clamp to [0, 1], mapping NaN to 0
fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
