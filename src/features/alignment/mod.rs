//! Time-series alignment of pitch contours
//!
//! - Dynamic time warping over pitch classes (full or banded)
//! - Global offset estimation by cross-correlation

pub mod dtw;
pub mod offset;

use serde::{Deserialize, Serialize};

/// Warping path between a reference and a performance contour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// `(reference_index, performance_index)` pairs from `(0, 0)` to
    /// `(last_ref, last_perf)`, non-decreasing in both coordinates
    pub path: Vec<(usize, usize)>,

    /// Accumulated frame distance along the path
    pub cost: f64,
}

impl AlignmentResult {
    /// Number of aligned pairs
    pub fn len(&self) -> usize {
        self.path.len()
    }

    /// True if the path is empty (never the case for a successful alignment)
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Mean distance per aligned pair
    pub fn normalized_cost(&self) -> f64 {
        if self.path.is_empty() {
            0.0
        } else {
            self.cost / self.path.len() as f64
        }
    }
}
