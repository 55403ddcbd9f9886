//! Global offset between reference and performance
//!
//! A singer who comes in late shifts every note by the same amount. The
//! offset is the lag maximizing the cross-correlation of the two pitch
//! curves, where a voiced frame contributes `60 + pitch_class` and an
//! unvoiced frame zero. Shifting the performance by that lag before DTW
//! keeps the warping band centered on the actual singing.

use crate::features::pitch::contour::{NormalizedContour, NormalizedFrame, NormalizedPitch};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Curve value of a voiced frame before its pitch class is added
const VOICED_BASE: f32 = 60.0;

/// Lag (in frames) that best lines the performance up with the reference
///
/// Positive means the performance should move later, negative earlier.
/// Returns 0 when either contour has no voiced frame. Ties go to the lag of
/// smaller magnitude.
pub fn estimate_offset(reference: &NormalizedContour, performance: &NormalizedContour) -> isize {
    if reference.voiced_count() == 0 || performance.voiced_count() == 0 {
        return 0;
    }

    let ref_curve = curve(reference);
    let perf_curve = curve(performance);
    let n = (ref_curve.len() + perf_curve.len()).next_power_of_two();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut ref_spectrum = padded(&ref_curve, n);
    let mut perf_spectrum = padded(&perf_curve, n);
    fft.process(&mut ref_spectrum);
    fft.process(&mut perf_spectrum);

    // cc[k] = sum_t ref[t + k] * perf[t]
    for (r, p) in ref_spectrum.iter_mut().zip(perf_spectrum.iter()) {
        *r *= p.conj();
    }
    ifft.process(&mut ref_spectrum);

    let min_lag = -(perf_curve.len() as isize - 1);
    let max_lag = ref_curve.len() as isize - 1;

    let mut best_lag = 0isize;
    let mut best_value = f32::NEG_INFINITY;
    for lag in min_lag..=max_lag {
        let index = if lag >= 0 {
            lag as usize
        } else {
            (n as isize + lag) as usize
        };
        let value = ref_spectrum[index].re;
        let better = value > best_value
            || (value == best_value && lag.unsigned_abs() < best_lag.unsigned_abs());
        if better {
            best_value = value;
            best_lag = lag;
        }
    }

    log::debug!(
        "Estimated performance offset: {} frames ({:.3}s)",
        best_lag,
        best_lag as f64 * performance.hop_sec
    );
    best_lag
}

/// Shift a contour by `offset` frames, keeping its length
///
/// Frames shifted in from outside the contour are unvoiced with zero
/// confidence. Timestamps are recomputed from the hop.
pub fn shift_contour(contour: &NormalizedContour, offset: isize) -> NormalizedContour {
    let len = contour.frames.len() as isize;
    let frames = (0..len)
        .map(|t| {
            let source = t - offset;
            let time_sec = t as f64 * contour.hop_sec;
            if (0..len).contains(&source) {
                NormalizedFrame {
                    time_sec,
                    ..contour.frames[source as usize]
                }
            } else {
                NormalizedFrame {
                    time_sec,
                    pitch: NormalizedPitch::Unvoiced,
                    confidence: 0.0,
                }
            }
        })
        .collect();

    NormalizedContour {
        hop_sec: contour.hop_sec,
        frames,
    }
}

fn curve(contour: &NormalizedContour) -> Vec<f32> {
    contour
        .frames
        .iter()
        .map(|f| f.pitch_class().map_or(0.0, |pc| VOICED_BASE + pc))
        .collect()
}

fn padded(values: &[f32], n: usize) -> Vec<Complex<f32>> {
    let mut buffer = vec![Complex::new(0.0, 0.0); n];
    for (slot, &v) in buffer.iter_mut().zip(values.iter()) {
        *slot = Complex::new(v, 0.0);
    }
    buffer
}
