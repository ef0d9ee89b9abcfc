// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Numeric primitives for profile statistics: off-pulse masking, robust
//! outlier criteria and NaN-excluding summary statistics.
//!
//! All of the functions here treat NaN entries as "missing": they are
//! excluded from means, standard deviations and medians, and a NaN value can
//! never satisfy an outlier criterion.

#[cfg(test)]
mod tests;

use std::cmp::Ordering;

use itertools::Itertools;
use ndarray::prelude::*;

/// The default fraction of phase bins assumed to be off-pulse when deriving
/// a mask from a profile.
pub const DEFAULT_DUTY: f64 = 0.55;

/// The default Chauvenet deviation threshold, in units of standard deviation.
pub const CHAUVENET_THRESHOLD: f64 = 3.0;

/// The default double-MAD modified-z-score threshold.
pub const DOUBLE_MAD_THRESHOLD: f64 = 3.5;

/// The root mean square of the supplied samples. An empty slice yields NaN,
/// never a panic; an all-zero cell must poison downstream statistics rather
/// than look perfectly quiet.
pub fn root_mean_square(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// The mean of the finite entries. NaN if there are none.
pub fn nan_mean<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0_usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// The population standard deviation of the finite entries. NaN if there are
/// none.
pub fn nan_std<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64> + Clone,
{
    let mean = nan_mean(values.clone());
    if mean.is_nan() {
        return f64::NAN;
    }
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0_usize), |(s, c), &v| (s + (v - mean).powi(2), c + 1));
    (sum / count as f64).sqrt()
}

/// The median of the finite entries. NaN if there are none.
pub fn nan_median<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let sorted: Vec<f64> = values
        .into_iter()
        .copied()
        .filter(|v| v.is_finite())
        .sorted_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .collect();
    match sorted.len() {
        0 => f64::NAN,
        n if n % 2 == 1 => sorted[n / 2],
        n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Chauvenet's criterion, element-wise over a grid: true where the value
/// deviates from the mean by more than `threshold` standard deviations. NaN
/// entries always compare false and so are never flagged.
pub fn chauvenet(grid: ArrayView2<f64>, mean: f64, stddev: f64, threshold: f64) -> Array2<bool> {
    grid.mapv(|x| (x - mean).abs() > threshold * stddev)
}

/// The double median-absolute-deviation criterion over a 1-D vector.
///
/// Separate MADs are computed for the values at or below the overall median
/// ("left") and at or above it ("right"); each element is scored against the
/// MAD for its side with the usual 0.6745 modified-z-score factor. Elements
/// equal to the median score 0 and NaN elements are excluded throughout, so
/// neither can be flagged.
pub fn double_mad(vector: &[f64], threshold: f64) -> Vec<bool> {
    let m = nan_median(vector);
    if m.is_nan() {
        return vec![false; vector.len()];
    }

    let abs_dev: Vec<f64> = vector.iter().map(|&x| (x - m).abs()).collect();
    let left_mad = nan_median(
        vector
            .iter()
            .zip(abs_dev.iter())
            .filter(|(&x, _)| x <= m)
            .map(|(_, d)| d),
    );
    let right_mad = nan_median(
        vector
            .iter()
            .zip(abs_dev.iter())
            .filter(|(&x, _)| x >= m)
            .map(|(_, d)| d),
    );

    vector
        .iter()
        .zip(abs_dev)
        .map(|(&x, dev)| {
            if !x.is_finite() || x == m {
                return false;
            }
            let mad = if x > m { right_mad } else { left_mad };
            let mzs = 0.6745 * dev / mad;
            mzs > threshold
        })
        .collect()
}

/// Derives an on/off-pulse mask from a profile: 1 marks an on-pulse bin, 0
/// an off-pulse (baseline) bin.
///
/// The lowest `duty` fraction of the sorted amplitudes estimates the
/// baseline level and RMS; a bin is then marked on-pulse when more than
/// `n_check / 2 - 1` bins in its nearest-neighbour window sit more than
/// `thresh_factor` baseline-RMS above the baseline level. The window wraps
/// around both ends of the profile, since phase is circular.
pub fn bin_mask(profile: ArrayView1<f64>, duty: f64, thresh_factor: f64) -> Array1<u8> {
    let n_bin = profile.len();
    if n_bin == 0 {
        return Array1::zeros(0);
    }
    let sorted: Vec<f64> = profile
        .iter()
        .copied()
        .sorted_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .collect();
    let i_mid = ((0.5 * duty * n_bin as f64 + 0.5).floor() as usize).max(1);
    let prof_mid = sorted[i_mid - 1];
    let rms = root_mean_square(&sorted[0..i_mid]);

    // Number of nearest neighbours (each side) to poll for each bin.
    let n_check = (n_bin / 128).max(2);
    let n_test = n_check / 2 - 1;

    let big: Vec<bool> = profile
        .iter()
        .map(|&amp| (amp - prof_mid) > thresh_factor * rms)
        .collect();

    let mut mask = Array1::zeros(n_bin);
    for i_bin in 0..n_bin {
        let over_threshold = (-(n_check as isize)..=n_check as isize)
            .map(|offset| (i_bin as isize + offset).rem_euclid(n_bin as isize) as usize)
            .filter(|&i| big[i])
            .count();
        if over_threshold > n_test {
            mask[i_bin] = 1;
        }
    }
    mask
}

/// [`bin_mask`] with the duty cycle and threshold factor used for template
/// profiles.
pub fn bin_mask_from_template(template: ArrayView1<f64>) -> Array1<u8> {
    bin_mask(template, DEFAULT_DUTY, 2.0)
}

/// The mean and RMS of the off-pulse (baseline) region of a profile, as
/// determined by [`bin_mask`].
pub fn baseline(profile: ArrayView1<f64>, duty: f64) -> (f64, f64) {
    let mask = bin_mask(profile, duty, 2.0);
    let off_pulse: Vec<f64> = profile
        .iter()
        .zip(mask.iter())
        .filter(|(_, &m)| m == 0)
        .map(|(&amp, _)| amp)
        .collect();
    (nan_mean(&off_pulse), root_mean_square(&off_pulse))
}
