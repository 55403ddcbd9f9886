//! Feature extraction modules
//!
//! This module contains the signal-to-sequence algorithms:
//! - Pitch tracking (probabilistic YIN) and octave folding
//! - Contour alignment (DTW + offset estimation)

pub mod alignment;
pub mod pitch;
