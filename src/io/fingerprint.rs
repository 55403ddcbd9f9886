//! Reference audio fingerprints
//!
//! A fingerprint is the SHA-256 digest of the audio a reference analysis was
//! built from. A changed fingerprint means the cached analysis is stale.

use super::signal::AudioSignal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 digest of reference audio
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of encoded audio bytes (e.g. the contents of a WAV file)
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Fingerprint of decoded PCM
    ///
    /// Covers the sample rate and the little-endian bytes of every sample, so
    /// the same audio resampled or edited yields a different fingerprint.
    pub fn of_signal(signal: &AudioSignal) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(signal.sample_rate().to_le_bytes());
        for sample in signal.samples() {
            hasher.update(sample.to_le_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell entries apart in logs
        write!(f, "{}", &self.0[..self.0.len().min(12)])
    }
}
