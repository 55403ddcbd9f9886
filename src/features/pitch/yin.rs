//! YIN difference function
//!
//! Computes the cumulative mean normalized difference function (CMNDF) of a
//! frame, the periodicity measure both YIN and pYIN threshold against.
//!
//! # Algorithm
//!
//! For a frame `x` of length `N` and integration window `W = N / 2`:
//!
//! 1. Difference: `d(τ) = Σ_{j<W} (x[j] - x[j+τ])²`
//!    expanded as `E(0) + E(τ) - 2·r(τ)`, where `r` is the cross-correlation
//!    of the first `W` samples against the frame, computed with FFT
//!    acceleration: `r = IFFT(FFT(x) · conj(FFT(x[..W])))`
//! 2. Normalization: `d'(0) = 1`, `d'(τ) = d(τ) · τ / Σ_{k=1..τ} d(k)`
//!
//! # Reference
//!
//! de Cheveigné, A., & Kawahara, H. (2002). YIN, a fundamental frequency
//! estimator for speech and music. *JASA*, 111(4), 1917-1930.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

const EPSILON: f32 = 1e-10;

/// FFT plans shared by every frame of one extraction
///
/// Plans are immutable and thread-safe; per-thread buffers live in
/// [`YinScratch`].
#[derive(Clone)]
pub struct YinPlan {
    frame_size: usize,
    window: usize,
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for YinPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YinPlan")
            .field("frame_size", &self.frame_size)
            .field("window", &self.window)
            .field("fft_size", &self.fft_size)
            .finish()
    }
}

/// Per-thread working buffers
#[derive(Debug)]
pub struct YinScratch {
    frame_spectrum: Vec<Complex<f32>>,
    window_spectrum: Vec<Complex<f32>>,
    energy_prefix: Vec<f32>,
    difference: Vec<f32>,
}

impl YinPlan {
    /// Plan for frames of `frame_size` samples
    pub fn new(frame_size: usize) -> Self {
        let window = frame_size / 2;
        // Linear (not circular) correlation needs N + W - 1 points
        let fft_size = (frame_size + window).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let ifft = planner.plan_fft_inverse(fft_size);
        Self {
            frame_size,
            window,
            fft_size,
            fft,
            ifft,
        }
    }

    /// Integration window `W`; valid lags are `0..W`
    pub fn window(&self) -> usize {
        self.window
    }

    /// Frame length this plan was built for
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Fresh buffers sized for this plan
    pub fn scratch(&self) -> YinScratch {
        YinScratch {
            frame_spectrum: vec![Complex::new(0.0, 0.0); self.fft_size],
            window_spectrum: vec![Complex::new(0.0, 0.0); self.fft_size],
            energy_prefix: vec![0.0; self.frame_size + 1],
            difference: vec![0.0; self.window],
        }
    }

    /// Cumulative mean normalized difference of one frame
    ///
    /// `frame.len()` must equal the plan's frame size. Returns `W` values,
    /// index = lag in samples.
    pub fn cmndf(&self, frame: &[f32], scratch: &mut YinScratch) -> Vec<f32> {
        debug_assert_eq!(frame.len(), self.frame_size);
        self.difference(frame, scratch);

        let mut cmndf = vec![1.0f32; self.window];
        let mut running_sum = 0.0f32;
        for tau in 1..self.window {
            running_sum += scratch.difference[tau];
            cmndf[tau] = if running_sum > EPSILON {
                scratch.difference[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
        cmndf
    }

    fn difference(&self, frame: &[f32], scratch: &mut YinScratch) {
        let zero = Complex::new(0.0, 0.0);

        for (i, slot) in scratch.frame_spectrum.iter_mut().enumerate() {
            *slot = frame.get(i).map_or(zero, |&x| Complex::new(x, 0.0));
        }
        for (i, slot) in scratch.window_spectrum.iter_mut().enumerate() {
            *slot = if i < self.window {
                Complex::new(frame[i], 0.0)
            } else {
                zero
            };
        }

        self.fft.process(&mut scratch.frame_spectrum);
        self.fft.process(&mut scratch.window_spectrum);

        for (a, b) in scratch
            .frame_spectrum
            .iter_mut()
            .zip(scratch.window_spectrum.iter())
        {
            *a *= b.conj();
        }
        self.ifft.process(&mut scratch.frame_spectrum);
        let scale = 1.0 / self.fft_size as f32;

        scratch.energy_prefix[0] = 0.0;
        for (i, &x) in frame.iter().enumerate() {
            scratch.energy_prefix[i + 1] = scratch.energy_prefix[i] + x * x;
        }
        let energy_at = |tau: usize, prefix: &[f32]| prefix[tau + self.window] - prefix[tau];
        let energy_0 = energy_at(0, &scratch.energy_prefix);

        for tau in 0..self.window {
            let correlation = scratch.frame_spectrum[tau].re * scale;
            let d = energy_0 + energy_at(tau, &scratch.energy_prefix) - 2.0 * correlation;
            // Rounding in the FFT can push tiny values below zero
            scratch.difference[tau] = d.max(0.0);
        }
    }
}

/// Refine a lag to sub-sample precision with parabolic interpolation
///
/// Falls back to the integer lag at the edges or on a flat neighbourhood.
pub fn parabolic_interpolation(values: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= values.len() {
        return tau as f32;
    }
    let (left, center, right) = (values[tau - 1], values[tau], values[tau + 1]);
    let denominator = left - 2.0 * center + right;
    if denominator.abs() < EPSILON {
        return tau as f32;
    }
    let shift = 0.5 * (left - right) / denominator;
    tau as f32 + shift.clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    fn direct_difference(frame: &[f32], window: usize) -> Vec<f32> {
        (0..window)
            .map(|tau| {
                (0..window)
                    .map(|j| {
                        let diff = frame[j] - frame[j + tau];
                        diff * diff
                    })
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_fft_difference_matches_direct() {
        let frame = sine(441.0, 44100.0, 256);
        let plan = YinPlan::new(256);
        let mut scratch = plan.scratch();
        plan.difference(&frame, &mut scratch);

        let expected = direct_difference(&frame, 128);
        for (tau, (&got, &want)) in scratch.difference.iter().zip(expected.iter()).enumerate() {
            assert!(
                (got - want).abs() < 1e-2,
                "lag {}: fft {} vs direct {}",
                tau,
                got,
                want
            );
        }
    }

    #[test]
    fn test_cmndf_dips_at_period() {
        // 441 Hz at 44.1 kHz has a period of exactly 100 samples
        let frame = sine(441.0, 44100.0, 2048);
        let plan = YinPlan::new(2048);
        let mut scratch = plan.scratch();
        let cmndf = plan.cmndf(&frame, &mut scratch);

        assert_eq!(cmndf.len(), 1024);
        assert_eq!(cmndf[0], 1.0);
        assert!(cmndf[100] < 0.01, "cmndf at period = {}", cmndf[100]);
        assert!(cmndf[50] > 0.5);
    }

    #[test]
    fn test_parabolic_interpolation() {
        let values = vec![1.0, 0.5, 0.0, 0.5, 1.0];
        assert!((parabolic_interpolation(&values, 2) - 2.0).abs() < 1e-6);

        let skewed = vec![1.0, 0.2, 0.0, 0.6, 1.0];
        let refined = parabolic_interpolation(&skewed, 2);
        assert!(refined < 2.0 && refined > 1.5);

        assert_eq!(parabolic_interpolation(&values, 0), 0.0);
    }
}
