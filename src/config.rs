//! Configuration parameters for performance scoring
//!
//! Every tunable constant of the pipeline lives here: analysis frame sizes,
//! voicing thresholds, alignment penalties and score weights.

use crate::error::ScoringError;
use serde::{Deserialize, Serialize};

/// Reference sample rate the default frame and hop sizes are expressed at
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Tolerance when checking that score weights sum to one
const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

/// Pitch extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Analysis frame length in seconds (default: 2048 samples at 44.1 kHz)
    pub frame_sec: f64,

    /// Hop between frames in seconds (default: 256 samples at 44.1 kHz)
    pub hop_sec: f64,

    /// Lowest detectable fundamental in Hz (default: 65.4, C2)
    pub fmin_hz: f32,

    /// Highest detectable fundamental in Hz (default: 523.25, C5)
    pub fmax_hz: f32,

    /// Frames whose best candidate probability falls below this are unvoiced (default: 0.1)
    pub min_confidence: f32,

    /// Mean of the beta prior over YIN thresholds (default: 0.1)
    ///
    /// Any mean in (0, 1) is accepted. The prior is a beta distribution with
    /// alpha = 2 and beta chosen to match the mean; 0.1, 0.15 and 0.2 give
    /// the usual pYIN presets.
    pub threshold_prior_mean: f32,

    /// Probability mass given to the global CMNDF minimum when a threshold finds no trough (default: 0.01)
    pub absolute_min_probability: f32,

    /// Frames with RMS below this fraction of the mean frame RMS are unvoiced (default: 0.02)
    pub energy_gate_ratio: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            frame_sec: 2048.0 / DEFAULT_SAMPLE_RATE as f64,
            hop_sec: 256.0 / DEFAULT_SAMPLE_RATE as f64,
            fmin_hz: 65.4,
            fmax_hz: 523.25,
            min_confidence: 0.1,
            threshold_prior_mean: 0.1,
            absolute_min_probability: 0.01,
            energy_gate_ratio: 0.02,
        }
    }
}

impl ExtractionConfig {
    /// Frame length in samples at `sample_rate`
    pub fn frame_size(&self, sample_rate: u32) -> usize {
        (self.frame_sec * sample_rate as f64).round() as usize
    }

    /// Hop length in samples at `sample_rate`
    pub fn hop_size(&self, sample_rate: u32) -> usize {
        (self.hop_sec * sample_rate as f64).round() as usize
    }
}

/// Pitch normalization parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Smooth each voiced segment with a Savitzky-Golay filter before octave folding (default: false)
    pub smoothing: bool,
}

/// Sequence alignment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Distance charged when exactly one side of a pair is unvoiced (default: 6.0)
    ///
    /// 6.0 equals the largest circular pitch-class distance, so DTW never
    /// prefers pairing a note with silence over pairing it with a wrong note.
    pub unvoiced_penalty: f64,

    /// Band radius as a fraction of the longer contour (default: 0.2)
    pub window_fraction: f32,

    /// Lower bound on the band radius in frames (default: 16)
    pub min_window: usize,

    /// Cost matrices up to this many cells are computed in full (default: 4,000,000)
    pub full_matrix_limit: usize,

    /// Upper bound on band cells of one alignment (default: 32,000,000)
    ///
    /// One byte is kept per cell. Longer contours are decimated until the
    /// band fits, so a single alignment holds roughly this many bytes.
    pub max_band_cells: usize,

    /// Shift the performance by its cross-correlation offset before aligning (default: false)
    pub compensate_offset: bool,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            unvoiced_penalty: 6.0,
            window_fraction: 0.2,
            min_window: 16,
            full_matrix_limit: 4_000_000,
            max_band_cells: 32_000_000,
            compensate_offset: false,
        }
    }
}

/// Weights and floor of the final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Weight of pitch accuracy (default: 0.5)
    pub pitch: f32,

    /// Weight of timing alignment (default: 0.2)
    pub timing: f32,

    /// Weight of voiced overlap (default: 0.3)
    pub overlap: f32,

    /// Lower bound of the overlap penalty multiplier (default: 0.1)
    pub overlap_floor: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            pitch: 0.5,
            timing: 0.2,
            overlap: 0.3,
            overlap_floor: 0.1,
        }
    }
}

/// Complete scoring configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Pitch extraction
    pub extraction: ExtractionConfig,

    /// Pitch normalization
    pub normalization: NormalizationConfig,

    /// DTW alignment
    pub alignment: AlignmentConfig,

    /// Final score synthesis
    pub weights: ScoreWeights,
}

impl ScoringConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self, ScoringError> {
        let config: ScoringConfig = serde_json::from_str(json)
            .map_err(|e| ScoringError::InvalidConfig(format!("Malformed JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<(), ScoringError> {
        let ex = &self.extraction;
        if !(ex.frame_sec > 0.0) || !(ex.hop_sec > 0.0) {
            return Err(ScoringError::InvalidConfig(format!(
                "frame_sec and hop_sec must be > 0 (got {}, {})",
                ex.frame_sec, ex.hop_sec
            )));
        }
        if !(ex.fmin_hz > 0.0) || ex.fmin_hz >= ex.fmax_hz {
            return Err(ScoringError::InvalidConfig(format!(
                "Invalid frequency range: [{:.2}, {:.2}] Hz",
                ex.fmin_hz, ex.fmax_hz
            )));
        }
        if !(0.0..=1.0).contains(&ex.min_confidence) {
            return Err(ScoringError::InvalidConfig(format!(
                "min_confidence must be in [0, 1] (got {})",
                ex.min_confidence
            )));
        }
        if !(ex.threshold_prior_mean > 0.0 && ex.threshold_prior_mean < 1.0) {
            return Err(ScoringError::InvalidConfig(format!(
                "threshold_prior_mean must be in (0, 1) (got {})",
                ex.threshold_prior_mean
            )));
        }
        if ex.energy_gate_ratio < 0.0 || ex.absolute_min_probability < 0.0 {
            return Err(ScoringError::InvalidConfig(
                "energy_gate_ratio and absolute_min_probability must be >= 0".to_string(),
            ));
        }

        let al = &self.alignment;
        if !(al.unvoiced_penalty >= 0.0) {
            return Err(ScoringError::InvalidConfig(format!(
                "unvoiced_penalty must be >= 0 (got {})",
                al.unvoiced_penalty
            )));
        }
        if !(al.window_fraction > 0.0 && al.window_fraction <= 1.0) {
            return Err(ScoringError::InvalidConfig(format!(
                "window_fraction must be in (0, 1] (got {})",
                al.window_fraction
            )));
        }
        if al.max_band_cells == 0 {
            return Err(ScoringError::InvalidConfig(
                "max_band_cells must be > 0".to_string(),
            ));
        }

        let w = &self.weights;
        if w.pitch < 0.0 || w.timing < 0.0 || w.overlap < 0.0 {
            return Err(ScoringError::InvalidConfig(
                "Score weights must be non-negative".to_string(),
            ));
        }
        let sum = w.pitch + w.timing + w.overlap;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ScoringError::InvalidConfig(format!(
                "Score weights must sum to 1.0 (got {:.4})",
                sum
            )));
        }
        if !(0.0..=1.0).contains(&w.overlap_floor) {
            return Err(ScoringError::InvalidConfig(format!(
                "overlap_floor must be in [0, 1] (got {})",
                w.overlap_floor
            )));
        }

        Ok(())
    }
}
