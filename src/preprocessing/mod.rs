//! Audio preprocessing modules
//!
//! Utilities that prepare raw PCM for pitch analysis:
//! - Channel mixing (interleaved to mono)
//! - Frame energy and the voicing energy gate

pub mod channel_mixer;
pub mod silence;
