//! Pitch curve smoothing
//!
//! Savitzky-Golay filtering (window 5, quadratic) of MIDI values inside each
//! voiced segment. The window is `min(5, len - 2)` rounded down to odd, so
//! segments of 5 or 6 frames get a 3-frame quadratic fit, which returns them
//! unchanged; only segments of 7 frames or more are filtered. The two frames
//! at each segment edge take the value of a quadratic fitted to the five
//! frames at that edge.

/// Savitzky-Golay coefficients for window 5, polynomial order 2
const SAVGOL_5_2: [f32; 5] = [-3.0, 12.0, 17.0, 12.0, -3.0];

/// Quadratic fit over the first five frames, evaluated at frames 0 and 1
const EDGE_FIT_5_2: [[f32; 5]; 2] = [
    [31.0, 9.0, -3.0, -5.0, 3.0],
    [9.0, 13.0, 12.0, 6.0, -5.0],
];

const SAVGOL_5_2_NORM: f32 = 35.0;
const WINDOW: usize = 5;

/// Shortest segment the 5-frame window applies to
const MIN_SEGMENT: usize = WINDOW + 2;

/// Smooth each run of `Some` values in place
pub fn smooth_voiced_segments(values: &mut [Option<f32>]) {
    let mut start = 0;
    while start < values.len() {
        if values[start].is_none() {
            start += 1;
            continue;
        }
        let mut end = start;
        while end < values.len() && values[end].is_some() {
            end += 1;
        }

        let segment: Vec<f32> = values[start..end].iter().flatten().copied().collect();
        if segment.len() >= MIN_SEGMENT {
            let smoothed = savgol_5_2(&segment);
            for (slot, value) in values[start..end].iter_mut().zip(smoothed) {
                *slot = Some(value);
            }
        }
        start = end;
    }
}

fn weighted(coefficients: &[f32; 5], values: impl Iterator<Item = f32>) -> f32 {
    coefficients.iter().zip(values).map(|(c, v)| c * v).sum::<f32>() / SAVGOL_5_2_NORM
}

fn savgol_5_2(segment: &[f32]) -> Vec<f32> {
    let half = WINDOW / 2;
    let n = segment.len();
    let mut out = segment.to_vec();
    for i in half..n - half {
        out[i] = weighted(&SAVGOL_5_2, segment[i - half..=i + half].iter().copied());
    }

    // Edges: the right one is the left one mirrored
    for (k, coefficients) in EDGE_FIT_5_2.iter().enumerate() {
        out[k] = weighted(coefficients, segment[..WINDOW].iter().copied());
        out[n - 1 - k] = weighted(coefficients, segment[n - WINDOW..].iter().rev().copied());
    }
    out
}
