//! Dynamic time warping over pitch-class contours
//!
//! Finds the minimum-cost monotonic alignment between a reference contour
//! and a performance contour of possibly different length and tempo.
//!
//! # Algorithm
//!
//! 1. Frame distance: circular pitch-class distance when both frames are
//!    voiced, a fixed penalty when exactly one is, zero when neither is
//! 2. Accumulated cost:
//!    `D[i,j] = dist(i,j) + min(D[i-1,j], D[i,j-1], D[i-1,j-1])`,
//!    `D[0,0] = dist(0,0)`, borders accumulate along the edge
//! 3. Backtrack from `(last_ref, last_perf)` to `(0, 0)`. Ties prefer the
//!    diagonal predecessor, then vertical (reference advances alone), then
//!    horizontal, so identical inputs always give identical paths
//!
//! Rows are reference frames, columns performance frames. Small problems
//! use the full matrix. Large ones restrict each row to a Sakoe-Chiba band
//! around the length-scaled diagonal whose radius grows with the contour
//! length, wide enough for a singer who starts late or drifts.
//!
//! Only two rows of accumulated cost are kept; each band cell stores a
//! one-byte backpointer. Song-length contours whose band would still exceed
//! `max_band_cells` are decimated, aligned coarsely and the path is
//! expanded back to every frame (see [`DtwPlan`]).
//!
//! # Reference
//!
//! Sakoe, H., & Chiba, S. (1978). Dynamic programming algorithm optimization
//! for spoken word recognition. *IEEE Trans. ASSP*, 26(1), 43-49.
//!
//! # Example
//!
//! ```
//! use karaoke_scorer::features::pitch::contour::{PitchContour, Voicing};
//! use karaoke_scorer::features::pitch::normalization::normalize;
//! use karaoke_scorer::features::alignment::dtw::align;
//!
//! let notes = [261.63f32, 329.63, 392.0].map(|f| Voicing::Voiced { frequency_hz: f });
//! let reference = normalize(&PitchContour::from_voicing(0.01, notes));
//! let performance = reference.clone();
//!
//! let alignment = align(&reference, &performance)?;
//! assert_eq!(alignment.path, vec![(0, 0), (1, 1), (2, 2)]);
//! # Ok::<(), karaoke_scorer::AlignmentError>(())
//! ```

use super::AlignmentResult;
use crate::config::AlignmentConfig;
use crate::error::{AlignmentError, ContourSide};
use crate::features::pitch::contour::NormalizedContour;
use crate::features::pitch::normalization::circular_distance;

/// Distance between two frames given their pitch classes
///
/// `None` marks an unvoiced frame.
pub fn frame_distance(a: Option<f32>, b: Option<f32>, unvoiced_penalty: f64) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => circular_distance(a, b) as f64,
        (None, None) => 0.0,
        _ => unvoiced_penalty,
    }
}

/// Align two contours with default parameters
///
/// # Errors
///
/// `AlignmentError::EmptySequence` if either contour has no frames.
pub fn align(
    reference: &NormalizedContour,
    performance: &NormalizedContour,
) -> Result<AlignmentResult, AlignmentError> {
    align_with(reference, performance, &AlignmentConfig::default())
}

/// Align two contours
///
/// See [`align`] for the error contract.
pub fn align_with(
    reference: &NormalizedContour,
    performance: &NormalizedContour,
    config: &AlignmentConfig,
) -> Result<AlignmentResult, AlignmentError> {
    if reference.is_empty() {
        return Err(AlignmentError::EmptySequence {
            side: ContourSide::Reference,
        });
    }
    if performance.is_empty() {
        return Err(AlignmentError::EmptySequence {
            side: ContourSide::Performance,
        });
    }

    let ref_classes = reference.pitch_classes();
    let perf_classes = performance.pitch_classes();
    let (rows, cols) = (ref_classes.len(), perf_classes.len());
    let plan = DtwPlan::new(rows, cols, config);
    let penalty = config.unvoiced_penalty;

    let (path, cost) = if plan.stride == 1 {
        log::debug!(
            "DTW: {} x {} frames, {} cells ({})",
            rows,
            cols,
            plan.cell_count(),
            if plan.band.is_full(cols) { "full" } else { "banded" }
        );
        warp(&ref_classes, &perf_classes, &plan.band, penalty)
    } else {
        log::debug!(
            "DTW: {} x {} frames decimated by {}, {} cells",
            rows,
            cols,
            plan.stride,
            plan.cell_count()
        );
        let coarse_ref: Vec<Option<f32>> = ref_classes.iter().step_by(plan.stride).copied().collect();
        let coarse_perf: Vec<Option<f32>> =
            perf_classes.iter().step_by(plan.stride).copied().collect();
        let (coarse, _) = warp(&coarse_ref, &coarse_perf, &plan.band, penalty);
        let path = expand_path(&coarse, plan.stride, rows, cols);
        let cost: f64 = path
            .iter()
            .map(|&(i, j)| frame_distance(ref_classes[i], perf_classes[j], penalty))
            .sum();
        (path, cost)
    };

    log::debug!("DTW path: {} pairs, cost {:.3}", path.len(), cost);

    Ok(AlignmentResult { path, cost })
}

/// Backpointer bytes held per band cell
const STEP_BYTES: usize = std::mem::size_of::<u8>();

const START: u8 = 0;
const DIAGONAL: u8 = 1;
const VERTICAL: u8 = 2;
const HORIZONTAL: u8 = 3;

/// How an alignment of a given size is carried out
///
/// Memory is one backpointer byte per band cell plus two rolling cost rows.
/// When the band would exceed `max_band_cells`, both contours are decimated
/// by `stride` and the coarse path is expanded back to full resolution.
#[derive(Debug, Clone)]
pub struct DtwPlan {
    /// Every `stride`-th frame of each contour takes part in the search
    pub stride: usize,
    band: Band,
}

impl DtwPlan {
    /// Plan an alignment of `rows` reference frames against `cols` performance frames
    pub fn new(rows: usize, cols: usize, config: &AlignmentConfig) -> Self {
        let band = Band::for_lengths(rows, cols, config);
        let cells = band.cell_count();
        if cells <= config.max_band_cells {
            return Self { stride: 1, band };
        }

        // Band cells shrink roughly with the square of the stride
        let longer = rows.max(cols);
        let mut stride = ((cells as f64 / config.max_band_cells as f64).sqrt().ceil() as usize).max(2);
        loop {
            let band = Band::for_lengths(
                decimated_len(rows, stride),
                decimated_len(cols, stride),
                config,
            );
            if band.cell_count() <= config.max_band_cells || stride >= longer {
                return Self { stride, band };
            }
            stride += 1;
        }
    }

    /// Band cells searched
    pub fn cell_count(&self) -> usize {
        self.band.cell_count()
    }

    /// Working memory of the search in bytes: backpointers, cost rows and band bounds
    pub fn memory_bytes(&self) -> usize {
        let rows = self.band.lo.len();
        let widest = self
            .band
            .lo
            .iter()
            .zip(self.band.hi.iter())
            .map(|(&lo, &hi)| hi - lo + 1)
            .max()
            .unwrap_or(0);
        self.cell_count() * STEP_BYTES
            + 2 * widest * std::mem::size_of::<f64>()
            + 3 * rows * std::mem::size_of::<usize>()
    }
}

fn decimated_len(len: usize, stride: usize) -> usize {
    (len + stride - 1) / stride
}

/// Inclusive column range `[lo, hi]` of every row
#[derive(Debug, Clone)]
struct Band {
    lo: Vec<usize>,
    hi: Vec<usize>,
}

impl Band {
    fn for_lengths(rows: usize, cols: usize, config: &AlignmentConfig) -> Self {
        let cells = rows.saturating_mul(cols);
        if rows < 2 || cols < 2 || cells <= config.full_matrix_limit {
            return Self::full(rows, cols);
        }

        let slope = (cols - 1) as f64 / (rows - 1) as f64;
        let longer = rows.max(cols) as f64;
        // Consecutive rows must overlap, hence slope + 1
        let radius = (config.window_fraction as f64 * longer)
            .max(slope + 1.0)
            .max(config.min_window as f64);

        let mut lo = Vec::with_capacity(rows);
        let mut hi = Vec::with_capacity(rows);
        for i in 0..rows {
            let center = i as f64 * slope;
            lo.push((center - radius).floor().max(0.0) as usize);
            hi.push(((center + radius).ceil() as usize).min(cols - 1));
        }
        Self { lo, hi }
    }

    fn full(rows: usize, cols: usize) -> Self {
        Self {
            lo: vec![0; rows],
            hi: vec![cols - 1; rows],
        }
    }

    fn cell_count(&self) -> usize {
        self.lo
            .iter()
            .zip(self.hi.iter())
            .map(|(&lo, &hi)| hi - lo + 1)
            .sum()
    }

    fn is_full(&self, cols: usize) -> bool {
        self.lo.iter().all(|&lo| lo == 0) && self.hi.iter().all(|&hi| hi == cols - 1)
    }

    /// Accumulated cost of `(i, j)` from a stored row, infinite outside the band
    fn cost_in_row(&self, row: &[f64], i: usize, j: usize) -> f64 {
        let (lo, hi) = (self.lo[i], self.hi[i]);
        if j < lo || j > hi {
            return f64::INFINITY;
        }
        row[j - lo]
    }
}

/// Fill the band keeping two cost rows, then follow the backpointers
///
/// The predecessor of each cell is fixed while filling, with the same
/// preference as the backtrack: diagonal, then vertical, then horizontal.
fn warp(
    reference: &[Option<f32>],
    performance: &[Option<f32>],
    band: &Band,
    unvoiced_penalty: f64,
) -> (Vec<(usize, usize)>, f64) {
    let rows = reference.len();
    let mut offsets = Vec::with_capacity(rows);
    let mut steps: Vec<u8> = Vec::with_capacity(band.cell_count());
    let mut previous: Vec<f64> = Vec::new();
    let mut current: Vec<f64> = Vec::new();

    for (i, &ref_class) in reference.iter().enumerate() {
        let (lo, hi) = (band.lo[i], band.hi[i]);
        offsets.push(steps.len());
        current.clear();

        for j in lo..=hi {
            let distance = frame_distance(ref_class, performance[j], unvoiced_penalty);
            let (best_previous, step) = if i == 0 && j == 0 {
                (0.0, START)
            } else if i == 0 {
                (current[j - lo - 1], HORIZONTAL)
            } else if j == 0 {
                (band.cost_in_row(&previous, i - 1, j), VERTICAL)
            } else {
                let diagonal = band.cost_in_row(&previous, i - 1, j - 1);
                let vertical = band.cost_in_row(&previous, i - 1, j);
                let horizontal = if j > lo { current[j - lo - 1] } else { f64::INFINITY };
                if diagonal <= vertical && diagonal <= horizontal {
                    (diagonal, DIAGONAL)
                } else if vertical <= horizontal {
                    (vertical, VERTICAL)
                } else {
                    (horizontal, HORIZONTAL)
                }
            };
            current.push(distance + best_previous);
            steps.push(step);
        }

        std::mem::swap(&mut previous, &mut current);
    }

    let mut i = rows - 1;
    let mut j = band.hi[i];
    let cost = previous[j - band.lo[i]];

    let mut path = Vec::with_capacity(i + j + 1);
    path.push((i, j));
    loop {
        match steps[offsets[i] + j - band.lo[i]] {
            DIAGONAL => {
                i -= 1;
                j -= 1;
            }
            VERTICAL => i -= 1,
            HORIZONTAL => j -= 1,
            _ => break,
        }
        path.push((i, j));
    }

    path.reverse();
    (path, cost)
}

/// Map a path over decimated frames back to unit steps over every frame
///
/// Each coarse point `(a, b)` lands on `(a * stride, b * stride)`; the gaps
/// are bridged diagonally first, and the path is extended to the last cell.
fn expand_path(
    coarse: &[(usize, usize)],
    stride: usize,
    rows: usize,
    cols: usize,
) -> Vec<(usize, usize)> {
    let mut path = Vec::with_capacity(rows + cols);
    let (mut i, mut j) = (0, 0);
    path.push((i, j));

    let anchors = coarse
        .iter()
        .skip(1)
        .map(|&(a, b)| (a * stride, b * stride))
        .chain(std::iter::once((rows - 1, cols - 1)));
    for (target_i, target_j) in anchors {
        while i < target_i || j < target_j {
            if i < target_i {
                i += 1;
            }
            if j < target_j {
                j += 1;
            }
            path.push((i, j));
        }
    }
    path
}
