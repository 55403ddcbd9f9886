//! # Karaoke Scorer
//!
//! A performance scoring engine for karaoke applications: compares a
//! player's recorded vocals against the reference vocal track of a song and
//! produces a 0-100 score with a per-metric breakdown.
//!
//! ## Features
//!
//! - **Pitch Tracking**: Probabilistic YIN over FFT-accelerated difference functions
//! - **Octave Invariance**: Pitch classes, so singing an octave up or down is not penalized
//! - **Alignment**: Pitch-class DTW tolerant of tempo drift and late entries
//! - **Reference Cache**: Each song's reference analyzed once, shared lock-free
//!
//! ## Quick Start
//!
//! ```no_run
//! use karaoke_scorer::{AudioSignal, ScoringConfig, ScoringEngine};
//!
//! // Mono f32 PCM from your decoder
//! let reference = AudioSignal::new(vec![], 44100)?;
//! let performance = AudioSignal::new(vec![], 44100)?;
//!
//! let engine = ScoringEngine::new(ScoringConfig::default())?;
//! let breakdown = engine.score("song-42", &reference, &performance)?;
//!
//! println!("Score: {} (pitch {:.2}, timing {:.2}, overlap {:.2})",
//!     breakdown.final_score,
//!     breakdown.pitch_accuracy,
//!     breakdown.timing_alignment,
//!     breakdown.voiced_overlap);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Reference → Pitch Extraction → Normalization → Cache ─┐
//!                                                       ├→ Alignment → Metrics → Score
//! Performance → Pitch Extraction → Normalization ───────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod io;
pub mod preprocessing;

// Re-export main types
pub use analysis::result::{PerformanceMetrics, ScoreBreakdown};
pub use cache::{
    AnalysisSettings, ContourStore, JsonFileStore, ReferenceCache, ReferenceCacheEntry,
};
pub use config::{AlignmentConfig, ExtractionConfig, NormalizationConfig, ScoreWeights, ScoringConfig};
pub use engine::{ScoreRequest, ScoringEngine};
pub use error::{AlignmentError, CacheBuildError, ExtractionError, ScoringError};
pub use features::alignment::AlignmentResult;
pub use features::pitch::contour::{NormalizedContour, PitchContour, PitchFrame, Voicing};
pub use io::fingerprint::Fingerprint;
pub use io::signal::AudioSignal;

/// Score one performance
///
/// Convenience entry point for one-off scoring. Builds a throwaway engine,
/// so the reference is analyzed on every call; services scoring many
/// performances should keep a [`ScoringEngine`] around instead.
///
/// # Arguments
///
/// * `song_id` - Identifier of the song the reference belongs to
/// * `reference` - Reference vocal track
/// * `performance` - Player recording
/// * `config` - Scoring configuration
///
/// # Errors
///
/// Returns `ScoringError` if the configuration is invalid or either signal
/// yields no pitch data.
///
/// # Example
///
/// ```no_run
/// use karaoke_scorer::{score_performance, AudioSignal, ScoringConfig};
///
/// let reference = AudioSignal::new(vec![0.0f32; 44100 * 30], 44100)?;
/// let performance = AudioSignal::new(vec![0.0f32; 44100 * 30], 44100)?;
/// let breakdown = score_performance("song-42", &reference, &performance, ScoringConfig::default())?;
/// # Ok::<(), karaoke_scorer::ScoringError>(())
/// ```
pub fn score_performance(
    song_id: &str,
    reference: &AudioSignal,
    performance: &AudioSignal,
    config: ScoringConfig,
) -> Result<ScoreBreakdown, ScoringError> {
    log::debug!(
        "Scoring '{}': reference {:.1}s, performance {:.1}s",
        song_id,
        reference.duration_sec(),
        performance.duration_sec()
    );
    ScoringEngine::new(config)?.score(song_id, reference, performance)
}
