//! Performance analysis and score synthesis
//!
//! Turns an alignment into numbers a player sees:
//! - Per-metric quality measures
//! - Weighted final score
//! - Result types

pub mod metrics;
pub mod result;
pub mod score;
