//! Probabilistic YIN pitch extraction
//!
//! Converts a mono signal into a [`PitchContour`]: one frame per hop, each
//! either voiced with a fundamental frequency or unvoiced.
//!
//! # Algorithm
//!
//! This is the first stage of pYIN (Mauch & Dixon, 2014):
//!
//! 1. Slide a frame of `frame_sec` over the signal in steps of `hop_sec`,
//!    zero-padding the final frame so the whole signal is covered
//! 2. Compute the CMNDF of each frame (see [`super::yin`])
//! 3. Instead of one fixed threshold, sweep 100 thresholds `s = 0.01..=1.00`
//!    weighted by a beta prior. Each threshold votes for the first CMNDF
//!    trough below it; a threshold with no trough gives a small vote to the
//!    global minimum
//! 4. The trough with the most probability mass is the frame's period
//!    candidate; its mass is the frame confidence
//! 5. Frames below `min_confidence`, or quieter than the energy gate, are
//!    unvoiced
//!
//! Frames are independent, so they are analyzed in parallel with rayon. The
//! output does not depend on the number of threads.
//!
//! # Reference
//!
//! Mauch, M., & Dixon, S. (2014). pYIN: A fundamental frequency estimator
//! using probabilistic threshold distributions. *Proc. ICASSP*, 659-663.
//!
//! # Example
//!
//! ```no_run
//! use karaoke_scorer::io::signal::AudioSignal;
//! use karaoke_scorer::features::pitch::extractor::extract;
//!
//! let samples = vec![0.0f32; 44100 * 5];
//! let signal = AudioSignal::new(samples, 44100)?;
//! let contour = extract(&signal, 256.0 / 44100.0, 2048.0 / 44100.0)?;
//! println!("{} frames, {} voiced", contour.len(), contour.voiced_count());
//! # Ok::<(), karaoke_scorer::ExtractionError>(())
//! ```

use super::contour::{PitchContour, PitchFrame, Voicing};
use super::yin::{parabolic_interpolation, YinPlan};
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::io::signal::AudioSignal;
use crate::preprocessing::silence::{frame_rms, EnergyGate};
use rayon::prelude::*;

/// Number of thresholds in the pYIN sweep
const NUM_THRESHOLDS: usize = 100;

/// Alpha parameter shared by the pYIN beta priors
const PRIOR_ALPHA: f64 = 2.0;

/// Extract a pitch contour with default detection parameters
///
/// # Arguments
///
/// * `signal` - Mono audio
/// * `hop_sec` - Step between frames in seconds
/// * `frame_sec` - Analysis frame length in seconds
///
/// # Errors
///
/// * `ExtractionError::TooShort` - fewer samples than one frame
/// * `ExtractionError::Silent` - every sample is zero
/// * `ExtractionError::InvalidInput` - bad parameters or non-finite samples
pub fn extract(
    signal: &AudioSignal,
    hop_sec: f64,
    frame_sec: f64,
) -> Result<PitchContour, ExtractionError> {
    let config = ExtractionConfig {
        hop_sec,
        frame_sec,
        ..ExtractionConfig::default()
    };
    extract_with(signal, &config)
}

/// Extract a pitch contour with explicit parameters
///
/// See [`extract`] for the error contract.
pub fn extract_with(
    signal: &AudioSignal,
    config: &ExtractionConfig,
) -> Result<PitchContour, ExtractionError> {
    let sample_rate = signal.sample_rate();
    let frame_size = config.frame_size(sample_rate);
    let hop_size = config.hop_size(sample_rate);

    if frame_size < 4 || hop_size == 0 {
        return Err(ExtractionError::InvalidInput(format!(
            "Frame/hop too small at {} Hz: frame={} hop={} samples",
            sample_rate, frame_size, hop_size
        )));
    }

    let samples = signal.samples();
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(ExtractionError::InvalidInput(
            "Signal contains non-finite samples".to_string(),
        ));
    }

    if samples.len() < frame_size {
        return Err(ExtractionError::TooShort {
            samples: samples.len(),
            frame_size,
        });
    }

    if signal.is_silent() {
        return Err(ExtractionError::Silent);
    }

    let plan = YinPlan::new(frame_size);
    let lags = LagRange::new(config, sample_rate, plan.window())?;
    let priors = threshold_priors(config.threshold_prior_mean);

    let num_frames = 1 + (samples.len() - frame_size + hop_size - 1) / hop_size;

    log::debug!(
        "Extracting pitch: {} samples at {} Hz, frame={}, hop={}, {} frames, lags [{}, {}]",
        samples.len(),
        sample_rate,
        frame_size,
        hop_size,
        num_frames,
        lags.min,
        lags.max
    );

    let estimates: Vec<FrameEstimate> = (0..num_frames)
        .into_par_iter()
        .map_init(
            || (plan.scratch(), vec![0.0f32; frame_size]),
            |state, index| {
                let (scratch, frame) = state;
                let start = index * hop_size;
                let end = (start + frame_size).min(samples.len());
                frame[..end - start].copy_from_slice(&samples[start..end]);
                frame[end - start..].fill(0.0);

                let rms = frame_rms(frame);
                if rms == 0.0 {
                    return FrameEstimate::silent();
                }

                let cmndf = plan.cmndf(frame, scratch);
                let mut estimate =
                    estimate_frame(&cmndf, &lags, &priors, config.absolute_min_probability);
                estimate.rms = rms;
                estimate
            },
        )
        .collect();

    let rms: Vec<f32> = estimates.iter().map(|e| e.rms).collect();
    let gate = EnergyGate {
        ratio: config.energy_gate_ratio,
    }
    .open_frames(&rms);

    let hop_sec = hop_size as f64 / sample_rate as f64;
    let frames: Vec<PitchFrame> = estimates
        .iter()
        .zip(gate.iter())
        .enumerate()
        .map(|(index, (estimate, &open))| {
            let voicing = match estimate.lag {
                Some(lag) if open && estimate.probability >= config.min_confidence => {
                    Voicing::Voiced {
                        frequency_hz: sample_rate as f32 / lag,
                    }
                }
                _ => Voicing::Unvoiced,
            };
            PitchFrame {
                time_sec: index as f64 * hop_sec,
                voicing,
                confidence: estimate.probability.clamp(0.0, 1.0),
            }
        })
        .collect();

    let contour = PitchContour { hop_sec, frames };
    log::debug!(
        "Pitch extraction done: {}/{} frames voiced",
        contour.voiced_count(),
        contour.len()
    );

    Ok(contour)
}

/// Searchable lag range in samples
#[derive(Debug, Clone, Copy)]
struct LagRange {
    min: usize,
    max: usize,
}

impl LagRange {
    fn new(
        config: &ExtractionConfig,
        sample_rate: u32,
        window: usize,
    ) -> Result<Self, ExtractionError> {
        if !(config.fmin_hz > 0.0) || config.fmin_hz >= config.fmax_hz {
            return Err(ExtractionError::InvalidInput(format!(
                "Invalid frequency range: [{:.2}, {:.2}] Hz",
                config.fmin_hz, config.fmax_hz
            )));
        }

        let sr = sample_rate as f32;
        let min = ((sr / config.fmax_hz).floor() as usize).max(2);
        // Interpolation looks one lag past the maximum
        let max = ((sr / config.fmin_hz).ceil() as usize).min(window.saturating_sub(2));

        if min >= max {
            return Err(ExtractionError::InvalidInput(format!(
                "Frame too short for [{:.2}, {:.2}] Hz at {} Hz (lags {}..{})",
                config.fmin_hz, config.fmax_hz, sample_rate, min, max
            )));
        }

        Ok(Self { min, max })
    }
}

/// Raw per-frame result before gating
#[derive(Debug, Clone, Copy)]
struct FrameEstimate {
    /// Refined period in samples, if any trough was found
    lag: Option<f32>,
    /// Probability mass of the chosen trough
    probability: f32,
    /// Frame RMS
    rms: f32,
}

impl FrameEstimate {
    fn silent() -> Self {
        Self {
            lag: None,
            probability: 0.0,
            rms: 0.0,
        }
    }
}

/// Prior probability of each threshold `s_i = (i + 1) / 100`
///
/// Discretized beta distribution with `alpha = 2` and `beta` chosen so the
/// mean equals `mean` (0.1 gives the pYIN default beta = 18).
fn threshold_priors(mean: f32) -> Vec<f32> {
    let mean = (mean as f64).clamp(1e-3, 1.0 - 1e-3);
    let beta = PRIOR_ALPHA * (1.0 - mean) / mean;

    let densities: Vec<f64> = (1..=NUM_THRESHOLDS)
        .map(|i| {
            let s = i as f64 / NUM_THRESHOLDS as f64;
            s.powf(PRIOR_ALPHA - 1.0) * (1.0 - s).powf(beta - 1.0)
        })
        .collect();
    let total: f64 = densities.iter().sum();

    densities.iter().map(|&d| (d / total) as f32).collect()
}

/// Distribute threshold votes over CMNDF troughs and keep the heaviest
fn estimate_frame(
    cmndf: &[f32],
    lags: &LagRange,
    priors: &[f32],
    absolute_min_probability: f32,
) -> FrameEstimate {
    // Troughs in lag order: where a descent from the left bottoms out
    let mut troughs: Vec<usize> = Vec::new();
    for tau in lags.min..=lags.max {
        let falling = tau == lags.min || cmndf[tau] < cmndf[tau - 1];
        let bottom = tau == lags.max || cmndf[tau] <= cmndf[tau + 1];
        if falling && bottom {
            troughs.push(tau);
        }
    }

    if troughs.is_empty() {
        return FrameEstimate::silent();
    }

    let global_min = troughs
        .iter()
        .copied()
        .min_by(|&a, &b| {
            cmndf[a]
                .partial_cmp(&cmndf[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(troughs[0]);

    let mut mass = vec![0.0f32; troughs.len()];
    for (i, &prior) in priors.iter().enumerate() {
        let threshold = (i + 1) as f32 / NUM_THRESHOLDS as f32;
        match troughs.iter().position(|&tau| cmndf[tau] < threshold) {
            Some(slot) => mass[slot] += prior,
            None => {
                if let Some(slot) = troughs.iter().position(|&tau| tau == global_min) {
                    mass[slot] += prior * absolute_min_probability;
                }
            }
        }
    }

    // Ties go to the shorter lag (higher frequency wins octave ambiguity)
    let mut best = 0;
    for slot in 1..mass.len() {
        if mass[slot] > mass[best] {
            best = slot;
        }
    }

    if mass[best] <= 0.0 {
        return FrameEstimate::silent();
    }

    FrameEstimate {
        lag: Some(parabolic_interpolation(cmndf, troughs[best])),
        probability: mass[best].min(1.0),
        rms: 0.0,
    }
}
