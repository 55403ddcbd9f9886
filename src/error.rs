//! Error types for the scoring engine
//!
//! Every failure resolves to one of these values. Nothing here is fatal to the
//! host process: callers that cannot branch on errors use
//! [`ScoringEngine::score_or_zero`](crate::ScoringEngine::score_or_zero).

use std::fmt;

/// Errors produced while turning raw audio into a pitch contour
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// Signal holds fewer samples than a single analysis frame
    TooShort {
        /// Samples available
        samples: usize,
        /// Samples required for one frame
        frame_size: usize,
    },

    /// Every sample is zero
    Silent,

    /// Invalid signal or analysis parameters
    InvalidInput(String),
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionError::TooShort {
                samples,
                frame_size,
            } => write!(
                f,
                "Signal too short: {} samples, need at least {}",
                samples, frame_size
            ),
            ExtractionError::Silent => write!(f, "Signal is silent throughout"),
            ExtractionError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for ExtractionError {}

/// Which contour of an alignment was at fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContourSide {
    /// The reference vocal contour
    Reference,
    /// The player's contour
    Performance,
}

impl fmt::Display for ContourSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContourSide::Reference => write!(f, "reference"),
            ContourSide::Performance => write!(f, "performance"),
        }
    }
}

/// Errors produced by the sequence aligner
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentError {
    /// One of the contours has no frames
    EmptySequence {
        /// The empty side
        side: ContourSide,
    },

    /// The contours were analyzed with different frame hops
    HopMismatch {
        /// Hop of the reference contour in seconds
        reference_hop_sec: f64,
        /// Hop of the performance contour in seconds
        performance_hop_sec: f64,
    },
}

impl fmt::Display for AlignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentError::EmptySequence { side } => {
                write!(f, "Cannot align: {} contour is empty", side)
            }
            AlignmentError::HopMismatch {
                reference_hop_sec,
                performance_hop_sec,
            } => write!(
                f,
                "Cannot align: reference hop {:.6}s differs from performance hop {:.6}s",
                reference_hop_sec, performance_hop_sec
            ),
        }
    }
}

impl std::error::Error for AlignmentError {}

/// Why a reference cache build failed
#[derive(Debug, Clone, PartialEq)]
pub enum CacheBuildCause {
    /// Pitch extraction of the reference audio failed
    Extraction(ExtractionError),
    /// The building caller went away before publishing a result
    Abandoned,
}

/// Error delivered to every caller waiting on a failed reference build
///
/// Cloned once per waiter; the cache keeps nothing for the failed key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheBuildError {
    /// Song whose reference could not be built
    pub song_id: String,
    /// Fingerprint of the reference audio
    pub fingerprint: String,
    /// Underlying failure
    pub cause: CacheBuildCause,
}

impl fmt::Display for CacheBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            CacheBuildCause::Extraction(err) => write!(
                f,
                "Reference build failed for song '{}' ({}): {}",
                self.song_id, self.fingerprint, err
            ),
            CacheBuildCause::Abandoned => write!(
                f,
                "Reference build abandoned for song '{}' ({})",
                self.song_id, self.fingerprint
            ),
        }
    }
}

impl std::error::Error for CacheBuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            CacheBuildCause::Extraction(err) => Some(err),
            CacheBuildCause::Abandoned => None,
        }
    }
}

/// Top-level error returned by the scoring engine
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// Performance audio produced no pitch data
    Extraction(ExtractionError),

    /// Contours could not be aligned
    Alignment(AlignmentError),

    /// Reference analysis could not be built
    CacheBuild(CacheBuildError),

    /// Configuration rejected by [`ScoringConfig::validate`](crate::ScoringConfig::validate)
    InvalidConfig(String),
}

impl fmt::Display for ScoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringError::Extraction(err) => write!(f, "Extraction error: {}", err),
            ScoringError::Alignment(err) => write!(f, "Alignment error: {}", err),
            ScoringError::CacheBuild(err) => write!(f, "Cache build error: {}", err),
            ScoringError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ScoringError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScoringError::Extraction(err) => Some(err),
            ScoringError::Alignment(err) => Some(err),
            ScoringError::CacheBuild(err) => Some(err),
            ScoringError::InvalidConfig(_) => None,
        }
    }
}

impl From<ExtractionError> for ScoringError {
    fn from(err: ExtractionError) -> Self {
        ScoringError::Extraction(err)
    }
}

impl From<AlignmentError> for ScoringError {
    fn from(err: AlignmentError) -> Self {
        ScoringError::Alignment(err)
    }
}

impl From<CacheBuildError> for ScoringError {
    fn from(err: CacheBuildError) -> Self {
        ScoringError::CacheBuild(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_messages() {
        let err = ExtractionError::TooShort {
            samples: 10,
            frame_size: 2048,
        };
        assert_eq!(
            err.to_string(),
            "Signal too short: 10 samples, need at least 2048"
        );

        let err = AlignmentError::EmptySequence {
            side: ContourSide::Performance,
        };
        assert_eq!(err.to_string(), "Cannot align: performance contour is empty");
    }

    #[test]
    fn test_scoring_error_source_chain() {
        let build = CacheBuildError {
            song_id: "song".to_string(),
            fingerprint: "abc".to_string(),
            cause: CacheBuildCause::Extraction(ExtractionError::Silent),
        };
        let err: ScoringError = build.into();
        let source = err.source().expect("cache error has a source");
        assert!(source.to_string().contains("song 'song'"));
        assert!(source.source().is_some());
    }
}
