//! Scoring result types

use serde::{Deserialize, Serialize};

/// Quality measures of one aligned performance, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// How close the sung pitch classes are to the reference
    ///
    /// 1.0 = every voiced pair on pitch, 0.0 = every pair a tritone apart.
    pub pitch_accuracy: f32,

    /// How closely the warping path follows the time diagonal
    pub timing_alignment: f32,

    /// Fraction of aligned pairs whose voicing agrees
    pub voiced_overlap: f32,
}

/// Final scoring output
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Pitch accuracy (0.0-1.0)
    pub pitch_accuracy: f32,

    /// Timing alignment (0.0-1.0)
    pub timing_alignment: f32,

    /// Voiced overlap (0.0-1.0)
    pub voiced_overlap: f32,

    /// Overall score shown to the player (0-100)
    pub final_score: u8,
}

impl ScoreBreakdown {
    /// All-zero result used when no pitch data could be obtained
    pub fn zero() -> Self {
        Self::default()
    }

    /// Component metrics
    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            pitch_accuracy: self.pitch_accuracy,
            timing_alignment: self.timing_alignment,
            voiced_overlap: self.voiced_overlap,
        }
    }

    /// Breakdown carrying the given metrics and score
    pub fn from_metrics(metrics: PerformanceMetrics, final_score: u8) -> Self {
        Self {
            pitch_accuracy: metrics.pitch_accuracy,
            timing_alignment: metrics.timing_alignment,
            voiced_overlap: metrics.voiced_overlap,
            final_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        let zero = ScoreBreakdown::zero();
        assert_eq!(zero.final_score, 0);
        assert_eq!(zero.metrics(), PerformanceMetrics::default());
    }

    #[test]
    fn test_serializes_flat() {
        let breakdown = ScoreBreakdown::from_metrics(
            PerformanceMetrics {
                pitch_accuracy: 1.0,
                timing_alignment: 0.5,
                voiced_overlap: 0.25,
            },
            42,
        );
        let json = serde_json::to_value(breakdown).unwrap();
        assert_eq!(json["final_score"], 42);
        assert_eq!(json["timing_alignment"], 0.5);
        let back: ScoreBreakdown = serde_json::from_value(json).unwrap();
        assert_eq!(back, breakdown);
    }
}
