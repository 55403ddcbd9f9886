//! Pitch analysis
//!
//! - Contour types (tagged voicing, pitch classes)
//! - YIN difference function
//! - Probabilistic YIN extraction
//! - Octave-invariant normalization and optional smoothing

pub mod contour;
pub mod extractor;
pub mod normalization;
pub mod smoothing;
pub mod yin;
