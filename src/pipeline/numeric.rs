//! Numeric building blocks for Raman spectra.
//!
//! Range subsetting on the wavenumber axis, asymmetric least-squares (ALS)
//! baseline estimation, signal-to-noise, summary statistics and the
//! colour-bucket index used by heatmap rendering.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("No samples in wavenumber range [{low}, {high})")]
    EmptyRange { low: f64, high: f64 },
    #[error("Baseline system is singular at row {index}")]
    SingularSystem { index: usize },
    #[error("Length mismatch: {wavenumbers} wavenumbers but {intensities} intensities")]
    LengthMismatch { wavenumbers: usize, intensities: usize },
}

// =========================================================================
//  Subsetting
// =========================================================================

/// Index range of the samples whose wavenumber lies in `[low, high)`.
///
/// A `low` below the axis minimum starts at index 0 and a `high` above the
/// axis maximum runs through the last sample. Otherwise the first index at or
/// above each bound is used. The axis must be ascending.
pub fn subset_range(wavenumbers: &[f64], low: f64, high: f64) -> Result<Range<usize>, NumericError> {
    let n = wavenumbers.len();
    if n == 0 {
        return Err(NumericError::EmptyRange { low, high });
    }

    let min = wavenumbers.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = wavenumbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let first_at_or_above = |bound: f64| wavenumbers.iter().position(|&w| w >= bound).unwrap_or(n);

    let start = if low < min { 0 } else { first_at_or_above(low) };
    let end = if high > max { n } else { first_at_or_above(high) };

    if start >= end {
        return Err(NumericError::EmptyRange { low, high });
    }
    Ok(start..end)
}

/// Slice both arrays down to the samples in `[low, high)`.
pub fn subset<'a>(
    wavenumbers: &'a [f64],
    intensities: &'a [f64],
    low: f64,
    high: f64,
) -> Result<(&'a [f64], &'a [f64]), NumericError> {
    if wavenumbers.len() != intensities.len() {
        return Err(NumericError::LengthMismatch {
            wavenumbers: wavenumbers.len(),
            intensities: intensities.len(),
        });
    }
    let range = subset_range(wavenumbers, low, high)?;
    Ok((&wavenumbers[range.clone()], &intensities[range]))
}

// =========================================================================
//  Baseline (asymmetric least squares)
// =========================================================================

/// Parameters of the ALS baseline estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineParams {
    /// Second-derivative penalty (lambda); larger is smoother
    pub smoothness: f64,
    /// Weight given to points above the current estimate (p)
    pub asymmetry: f64,
    /// Fixed number of re-weighting passes
    pub iterations: usize,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            smoothness: 10_000.0,
            asymmetry: 0.001,
            iterations: 10,
        }
    }
}

/// Symmetric pentadiagonal matrix stored by band.
#[derive(Debug, Clone)]
struct PentaBands {
    diag: Vec<f64>,
    /// A[i][i+1]
    off1: Vec<f64>,
    /// A[i][i+2]
    off2: Vec<f64>,
}

/// `lambda * D * D^T` for the second-difference operator `D` (n x n-2).
fn second_difference_penalty(n: usize, lambda: f64) -> PentaBands {
    const COEFFS: [f64; 3] = [1.0, -2.0, 1.0];

    let mut bands = PentaBands {
        diag: vec![0.0; n],
        off1: vec![0.0; n - 1],
        off2: vec![0.0; n - 2],
    };

    // Column j of D touches rows j, j+1, j+2
    for j in 0..n - 2 {
        for a in 0..3 {
            bands.diag[j + a] += lambda * COEFFS[a] * COEFFS[a];
            if a + 1 < 3 {
                bands.off1[j + a] += lambda * COEFFS[a] * COEFFS[a + 1];
            }
            if a + 2 < 3 {
                bands.off2[j + a] += lambda * COEFFS[a] * COEFFS[a + 2];
            }
        }
    }
    bands
}

/// Solve `A x = rhs` for symmetric pentadiagonal `A` by banded LDL^T.
fn solve_pentadiagonal(a: &PentaBands, rhs: &[f64]) -> Result<Vec<f64>, NumericError> {
    let n = a.diag.len();
    let mut d = vec![0.0; n];
    let mut l1 = vec![0.0; n]; // L[i][i-1]
    let mut l2 = vec![0.0; n]; // L[i][i-2]

    for i in 0..n {
        let mut di = a.diag[i];
        if i >= 2 {
            l2[i] = a.off2[i - 2] / d[i - 2];
            di -= l2[i] * l2[i] * d[i - 2];
        }
        if i >= 1 {
            let mut off = a.off1[i - 1];
            if i >= 2 {
                off -= l2[i] * l1[i - 1] * d[i - 2];
            }
            l1[i] = off / d[i - 1];
            di -= l1[i] * l1[i] * d[i - 1];
        }
        if !di.is_finite() || di.abs() <= 1e-12 * a.diag[i].abs().max(1.0) {
            return Err(NumericError::SingularSystem { index: i });
        }
        d[i] = di;
    }

    // Forward substitution (unit lower triangular)
    let mut x = rhs.to_vec();
    for i in 0..n {
        if i >= 1 {
            x[i] -= l1[i] * x[i - 1];
        }
        if i >= 2 {
            x[i] -= l2[i] * x[i - 2];
        }
    }
    for i in 0..n {
        x[i] /= d[i];
    }
    // Back substitution with L^T
    for i in (0..n).rev() {
        if i + 1 < n {
            x[i] -= l1[i + 1] * x[i + 1];
        }
        if i + 2 < n {
            x[i] -= l2[i + 2] * x[i + 2];
        }
    }
    Ok(x)
}

/// Estimate the baseline of `intensities` by asymmetric least squares.
///
/// Each pass solves `(W + lambda D D^T) z = W y` and re-derives the weights
/// from the new `z`: `p` where `y > z`, `1 - p` where `y < z`, and 0 where
/// they are equal. Runs exactly `iterations` passes (at least one).
/// Inputs shorter than three samples have no curvature to penalise and are
/// returned unchanged.
pub fn baseline_als(intensities: &[f64], params: &BaselineParams) -> Result<Vec<f64>, NumericError> {
    let n = intensities.len();
    if n < 3 {
        return Ok(intensities.to_vec());
    }

    let penalty = second_difference_penalty(n, params.smoothness);
    let p = params.asymmetry;
    let mut weights = vec![1.0; n];
    let mut z = Vec::new();

    for _ in 0..params.iterations.max(1) {
        let mut system = penalty.clone();
        for (d, w) in system.diag.iter_mut().zip(&weights) {
            *d += w;
        }
        let rhs: Vec<f64> = weights.iter().zip(intensities).map(|(w, y)| w * y).collect();
        z = solve_pentadiagonal(&system, &rhs)?;

        for ((w, &y), &zi) in weights.iter_mut().zip(intensities).zip(&z) {
            *w = if y > zi {
                p
            } else if y < zi {
                1.0 - p
            } else {
                0.0
            };
        }
    }
    Ok(z)
}

// =========================================================================
//  Statistics
// =========================================================================

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by N)
pub fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Max intensity over the whole spectrum divided by the standard deviation
/// of the flat reference window `[low, high)`.
///
/// A window with zero spread has no measurable noise; the ratio is then
/// `f64::INFINITY` so the spectrum always passes an SNR filter.
pub fn signal_noise_ratio(
    wavenumbers: &[f64],
    intensities: &[f64],
    low: f64,
    high: f64,
) -> Result<f64, NumericError> {
    let (_, window) = subset(wavenumbers, intensities, low, high)?;
    let signal = intensities.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let noise = std_dev(window);
    if noise <= f64::EPSILON * signal.abs().max(1.0) {
        return Ok(f64::INFINITY);
    }
    Ok(signal / noise)
}

/// Mean, population stdev, max and min, each rounded to 3 decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub stdev: f64,
    pub max: f64,
    pub min: f64,
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `None` for an empty slice.
pub fn summary_stats(values: &[f64]) -> Option<SummaryStats> {
    if values.is_empty() {
        return None;
    }
    Some(SummaryStats {
        mean: round_to(mean(values), 3),
        stdev: round_to(std_dev(values), 3),
        max: round_to(values.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 3),
        min: round_to(values.iter().cloned().fold(f64::INFINITY, f64::min), 3),
    })
}

// =========================================================================
//  Scale index
// =========================================================================

/// Colour bucket of `value` on an evenly spaced scale starting at `scale_min`.
///
/// Computes `floor((value - scale_min) / step) - 1`, clamped to 0 below and to
/// `max_index` above when given. The `- 1` shift is part of the rendering
/// contract. Callers indexing into a colour table must pass
/// `Some(len - 1)`. A non-positive step (degenerate scale) or a NaN value
/// lands in bucket 0.
pub fn scale_index(value: f64, scale_min: f64, step: f64, max_index: Option<usize>) -> usize {
    let position = (value - scale_min) / step;
    let index = if !(step > 0.0) || position.is_nan() {
        0
    } else {
        let shifted = position.floor() - 1.0;
        if shifted <= 0.0 {
            0
        } else {
            shifted as usize
        }
    };
    match max_index {
        Some(max) => index.min(max),
        None => index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(start: f64, end: f64, step: f64) -> Vec<f64> {
        let n = ((end - start) / step).round() as usize + 1;
        (0..n).map(|i| start + i as f64 * step).collect()
    }

    #[test]
    fn test_subset_bounds_outside_axis_returns_everything() {
        let w = axis(1000.0, 2000.0, 10.0);
        let y: Vec<f64> = w.iter().map(|v| v * 0.5).collect();
        let (ws, ys) = subset(&w, &y, 500.0, 2500.0).unwrap();
        assert_eq!(ws.len(), w.len());
        assert_eq!(ys.len(), y.len());
        assert_eq!(ws[0], 1000.0);
        assert_eq!(*ws.last().unwrap(), 2000.0);
    }

    #[test]
    fn test_subset_is_half_open() {
        let w = axis(1000.0, 2000.0, 10.0);
        let y = vec![1.0; w.len()];
        let (ws, _) = subset(&w, &y, 1200.0, 1300.0).unwrap();
        assert_eq!(ws.first(), Some(&1200.0));
        assert_eq!(ws.last(), Some(&1290.0));

        // Bounds between samples snap to the first sample at or above them
        let (ws, _) = subset(&w, &y, 1195.0, 1305.0).unwrap();
        assert_eq!(ws.first(), Some(&1200.0));
        assert_eq!(ws.last(), Some(&1300.0));
    }

    #[test]
    fn test_subset_empty_range_errors() {
        let w = axis(1000.0, 2000.0, 10.0);
        let y = vec![0.0; w.len()];
        assert!(matches!(
            subset(&w, &y, 1201.0, 1205.0),
            Err(NumericError::EmptyRange { .. })
        ));
        assert!(subset(&w, &y, 2100.0, 2200.0).is_err());
        assert!(subset(&[], &[], 0.0, 1.0).is_err());
    }

    #[test]
    fn test_penalty_matches_dense_product() {
        let n = 7;
        let lambda = 3.0;
        let bands = second_difference_penalty(n, lambda);

        // Dense D (n x n-2) with [1, -2, 1] down each column
        let mut d = vec![vec![0.0; n - 2]; n];
        for j in 0..n - 2 {
            d[j][j] = 1.0;
            d[j + 1][j] = -2.0;
            d[j + 2][j] = 1.0;
        }
        for a in 0..n {
            for b in 0..n {
                let dense: f64 = (0..n - 2).map(|j| d[a][j] * d[b][j]).sum::<f64>() * lambda;
                let banded = match b as i64 - a as i64 {
                    0 => bands.diag[a],
                    1 => bands.off1[a],
                    -1 => bands.off1[b],
                    2 => bands.off2[a],
                    -2 => bands.off2[b],
                    _ => 0.0,
                };
                assert!((dense - banded).abs() < 1e-12, "mismatch at ({}, {})", a, b);
            }
        }
    }

    #[test]
    fn test_pentadiagonal_solve() {
        let n = 6;
        let mut a = second_difference_penalty(n, 2.0);
        for d in a.diag.iter_mut() {
            *d += 1.0;
        }
        let expected: Vec<f64> = (0..n).map(|i| (i as f64) * 0.7 - 1.0).collect();

        // rhs = A * expected
        let rhs: Vec<f64> = (0..n)
            .map(|i| {
                let mut v = a.diag[i] * expected[i];
                if i + 1 < n {
                    v += a.off1[i] * expected[i + 1];
                }
                if i >= 1 {
                    v += a.off1[i - 1] * expected[i - 1];
                }
                if i + 2 < n {
                    v += a.off2[i] * expected[i + 2];
                }
                if i >= 2 {
                    v += a.off2[i - 2] * expected[i - 2];
                }
                v
            })
            .collect();

        let x = solve_pentadiagonal(&a, &rhs).unwrap();
        for (got, want) in x.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_baseline_tracks_linear_background() {
        let w = axis(1000.0, 2000.0, 5.0);
        let background: Vec<f64> = w.iter().map(|x| 100.0 + 0.05 * (x - 1000.0)).collect();
        let mut y = background.clone();
        // Narrow peak on top of the ramp
        for (i, x) in w.iter().enumerate() {
            let d = x - 1500.0;
            y[i] += 500.0 * 25.0 / (d * d + 25.0);
        }
        let z = baseline_als(&y, &BaselineParams::default()).unwrap();
        assert_eq!(z.len(), y.len());

        // Far from the peak the baseline follows the ramp
        for i in [0usize, 20, 180, 200] {
            assert!((z[i] - background[i]).abs() < 5.0, "i={} z={} bg={}", i, z[i], background[i]);
        }
        // The peak stays above the baseline
        let peak = w.iter().position(|&x| x == 1500.0).unwrap();
        assert!(y[peak] - z[peak] > 400.0);
    }

    #[test]
    fn test_baseline_is_deterministic() {
        let y: Vec<f64> = (0..50).map(|i| ((i as f64) * 0.3).sin() * 10.0 + i as f64).collect();
        let a = baseline_als(&y, &BaselineParams::default()).unwrap();
        let b = baseline_als(&y, &BaselineParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_baseline_short_input_passthrough() {
        assert_eq!(baseline_als(&[1.0, 2.0], &BaselineParams::default()).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_signal_noise_ratio() {
        let w = axis(1000.0, 1100.0, 10.0);
        let y = vec![0.0, 1.0, -1.0, 1.0, -1.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        // Window [1000, 1050) -> [0, 1, -1, 1, -1]: mean 0, population var 0.8
        let snr = signal_noise_ratio(&w, &y, 1000.0, 1050.0).unwrap();
        assert!((snr - 50.0 / 0.8f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_signal_noise_ratio_flat_window_is_infinite() {
        let w = axis(1000.0, 1100.0, 10.0);
        let mut y = vec![2.0; w.len()];
        y[8] = 40.0;
        let snr = signal_noise_ratio(&w, &y, 1000.0, 1050.0).unwrap();
        assert!(snr.is_infinite());
    }

    #[test]
    fn test_summary_stats() {
        let s = summary_stats(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(s.mean, 2.5);
        assert_eq!(s.stdev, 1.118);
        assert_eq!(s.max, 4.0);
        assert_eq!(s.min, 1.0);
        assert!(summary_stats(&[]).is_none());
    }

    #[test]
    fn test_scale_index_bottom_of_scale_is_zero() {
        for delta in [0.1, 1.0, 7.5] {
            assert_eq!(scale_index(3.0, 3.0, delta, None), 0);
        }
    }

    #[test]
    fn test_scale_index_off_by_one_shift() {
        // floor(2.5) - 1 = 1
        assert_eq!(scale_index(2.5, 0.0, 1.0, None), 1);
        // floor(5.0) - 1 = 4
        assert_eq!(scale_index(5.0, 0.0, 1.0, Some(9)), 4);
    }

    #[test]
    fn test_scale_index_clamps() {
        assert_eq!(scale_index(-100.0, 0.0, 1.0, Some(9)), 0);
        assert_eq!(scale_index(100.0, 0.0, 1.0, Some(9)), 9);
        assert_eq!(scale_index(100.0, 0.0, 1.0, None), 99);
        assert_eq!(scale_index(f64::INFINITY, 0.0, 1.0, Some(4)), 4);
    }

    #[test]
    fn test_scale_index_degenerate_step() {
        assert_eq!(scale_index(5.0, 5.0, 0.0, Some(9)), 0);
        assert_eq!(scale_index(f64::NAN, 0.0, 1.0, Some(9)), 0);
    }
}
