//! Immutable mono audio signal

use crate::error::ExtractionError;
use crate::preprocessing::channel_mixer::downmix_interleaved;
use std::sync::Arc;

/// Mono PCM samples with their sample rate
///
/// Samples are shared, so cloning a signal never copies audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioSignal {
    /// Wrap mono samples, normally in [-1.0, 1.0]
    ///
    /// # Errors
    ///
    /// `ExtractionError::InvalidInput` when `sample_rate` is zero.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, ExtractionError> {
        if sample_rate == 0 {
            return Err(ExtractionError::InvalidInput(
                "Invalid sample rate: 0".to_string(),
            ));
        }
        Ok(Self {
            samples: samples.into(),
            sample_rate,
        })
    }

    /// Build a mono signal from interleaved multi-channel samples
    ///
    /// Channels are averaged. A trailing partial frame is dropped.
    pub fn from_interleaved(
        samples: &[f32],
        channels: usize,
        sample_rate: u32,
    ) -> Result<Self, ExtractionError> {
        let mono = downmix_interleaved(samples, channels)?;
        Self::new(mono, sample_rate)
    }

    /// Sample amplitudes
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the signal holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_sec(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// True if every sample is exactly zero
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sample_rate_rejected() {
        assert!(AudioSignal::new(vec![0.0; 10], 0).is_err());
    }

    #[test]
    fn test_duration() {
        let signal = AudioSignal::new(vec![0.0; 22050], 44100).unwrap();
        assert!((signal.duration_sec() - 0.5).abs() < 1e-12);
        assert!(signal.is_silent());
        assert_eq!(signal.len(), 22050);
    }

    #[test]
    fn test_from_interleaved_stereo() {
        let signal = AudioSignal::from_interleaved(&[1.0, 0.0, 0.5, 0.5, 0.25], 2, 8000).unwrap();
        assert_eq!(signal.samples(), &[0.5, 0.5]);
    }

    #[test]
    fn test_clone_shares_samples() {
        let signal = AudioSignal::new(vec![0.1; 100], 8000).unwrap();
        let copy = signal.clone();
        assert_eq!(signal.samples().as_ptr(), copy.samples().as_ptr());
    }
}
