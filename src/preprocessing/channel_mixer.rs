//! Channel mixing utilities (multi-channel to mono conversion)

use crate::error::ExtractionError;

/// Average interleaved channels down to mono
///
/// # Arguments
///
/// * `samples` - Interleaved samples (`L R L R ...` for stereo)
/// * `channels` - Channel count (must be > 0)
///
/// # Returns
///
/// Mono samples; a trailing partial frame is dropped
pub fn downmix_interleaved(samples: &[f32], channels: usize) -> Result<Vec<f32>, ExtractionError> {
    if channels == 0 {
        return Err(ExtractionError::InvalidInput(
            "Channel count must be > 0".to_string(),
        ));
    }

    if channels == 1 {
        return Ok(samples.to_vec());
    }

    log::debug!(
        "Downmixing {} interleaved samples from {} channels",
        samples.len(),
        channels
    );

    let scale = 1.0 / channels as f32;
    Ok(samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect())
}
