// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Template-matching bin-shift estimation.
//!
//! Each profile is cross-correlated against the template over all circular
//! lags, and a parabola is fitted to a small window of lags around the
//! correlation peak. The parabola's apex gives the sub-bin phase shift of
//! the profile relative to the template; the 1-sigma shift uncertainty
//! follows from the local curvature of the correlation function and the
//! profile's off-pulse noise. The fit is numerically fragile by nature, so
//! every failure mode is a typed error for the caller to branch on rather
//! than a panic.

mod error;

pub use error::FitError;

use ndarray::prelude::*;

/// The number of correlation lags the parabola is fitted over, centred on
/// the peak lag. Must be odd.
pub const NUM_FIT_LAGS: usize = 5;

/// A successful template-matching fit for one profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftFit {
    /// The estimated shift of the profile relative to the template
    /// \[phase bins\], wrapped into (-n_bin/2, n_bin/2].
    pub shift: f64,

    /// The 1-sigma uncertainty on the shift \[phase bins\].
    pub error: f64,
}

/// Estimates the bin shift of `profile` relative to `template` and its
/// uncertainty. `off_rms` is the profile's off-pulse RMS, used to scale the
/// shift uncertainty.
pub fn estimate_shift(
    template: ArrayView1<f64>,
    profile: ArrayView1<f64>,
    off_rms: f64,
) -> Result<ShiftFit, FitError> {
    let n_bin = template.len();
    if profile.len() != n_bin {
        return Err(FitError::LengthMismatch {
            template: n_bin,
            profile: profile.len(),
        });
    }
    if n_bin < NUM_FIT_LAGS {
        return Err(FitError::TooFewBins(n_bin));
    }

    // Mean-subtract both series so constant baselines don't bias the
    // correlation.
    let t_mean = template.sum() / n_bin as f64;
    let p_mean = profile.sum() / n_bin as f64;
    let t: Vec<f64> = template.iter().map(|&v| v - t_mean).collect();
    let p: Vec<f64> = profile.iter().map(|&v| v - p_mean).collect();

    // Circular cross-correlation; a profile delayed by s bins peaks at lag s.
    let mut ccf = vec![0.0; n_bin];
    for (lag, c) in ccf.iter_mut().enumerate() {
        *c = t
            .iter()
            .enumerate()
            .map(|(j, &tj)| tj * p[(j + lag) % n_bin])
            .sum();
    }
    if ccf.iter().any(|c| !c.is_finite()) {
        return Err(FitError::NotFinite);
    }

    let (peak_lag, peak) = ccf
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        });
    let trough = ccf.iter().fold(f64::INFINITY, |a, &v| a.min(v));
    if peak == trough {
        return Err(FitError::FlatCorrelation);
    }

    // Least-squares parabola y = c0 + c1 x + c2 x^2 over the window of lags
    // around the peak, x in {-half .. half}. The symmetric window makes the
    // normal equations diagonal.
    let half = (NUM_FIT_LAGS / 2) as isize;
    let (mut sum_y, mut sum_xy, mut sum_x2y) = (0.0, 0.0, 0.0);
    let (mut sum_x2, mut sum_x4) = (0.0, 0.0);
    for offset in -half..=half {
        let x = offset as f64;
        let y = ccf[(peak_lag as isize + offset).rem_euclid(n_bin as isize) as usize];
        sum_y += y;
        sum_xy += x * y;
        sum_x2y += x * x * y;
        sum_x2 += x * x;
        sum_x4 += x * x * x * x;
    }
    let m = NUM_FIT_LAGS as f64;
    let c2 = (m * sum_x2y - sum_x2 * sum_y) / (m * sum_x4 - sum_x2 * sum_x2);
    let c1 = sum_xy / sum_x2;
    if !(c2 < 0.0) {
        return Err(FitError::NoCurvature);
    }

    let apex = -c1 / (2.0 * c2);
    if apex.abs() > half as f64 {
        return Err(FitError::ApexOutsideWindow(apex));
    }

    // Wrap the shift into (-n_bin/2, n_bin/2].
    let mut shift = peak_lag as f64 + apex;
    let n = n_bin as f64;
    while shift > n / 2.0 {
        shift -= n;
    }
    while shift <= -n / 2.0 {
        shift += n;
    }

    // var(shift) = var(C') / C''^2 evaluated at the apex, with the
    // correlation-slope variance taken from the off-pulse noise and the
    // template's discrete derivative.
    let t_deriv_sq: f64 = (0..n_bin)
        .map(|j| {
            let d = t[(j + 1) % n_bin] - t[j];
            d * d
        })
        .sum();
    let error = off_rms * t_deriv_sq.sqrt() / (2.0 * c2).abs();

    Ok(ShiftFit { shift, error })
}

/// Builds the parallel bin-shift and shift-uncertainty grids for every
/// (sub-integration, channel) cell of a data cube.
///
/// All-zero profiles get NaN in both grids without invoking the estimator.
/// Cells whose fit fails outright are also NaN, and are reported in the
/// returned list so the caller can zero their weights: a fit that cannot
/// converge is itself evidence of a corrupted profile.
pub fn build_shift_matrices(
    data: ArrayView3<f64>,
    template: ArrayView1<f64>,
    rms_matrix: ArrayView2<f64>,
) -> (Array2<f64>, Array2<f64>, Vec<(usize, usize)>) {
    let (n_subint, n_chan, _) = data.dim();
    let mut shifts = Array2::from_elem((n_subint, n_chan), f64::NAN);
    let mut errors = Array2::from_elem((n_subint, n_chan), f64::NAN);
    let mut failed = Array2::from_elem((n_subint, n_chan), false);

    ndarray::Zip::from(&mut shifts)
        .and(&mut errors)
        .and(&mut failed)
        .and(data.lanes(Axis(2)))
        .and(rms_matrix)
        .par_for_each(|shift, error, failed, profile, &rms| {
            if profile.iter().all(|&amp| amp == 0.0) {
                return;
            }
            match estimate_shift(template, profile, rms) {
                Ok(fit) => {
                    *shift = fit.shift;
                    *error = fit.error;
                }
                Err(_) => *failed = true,
            }
        });

    let failures = failed
        .indexed_iter()
        .filter(|(_, &f)| f)
        .map(|(idx, _)| idx)
        .collect();
    (shifts, errors, failures)
}
