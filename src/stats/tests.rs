// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;

#[test]
fn test_root_mean_square() {
    assert_abs_diff_eq!(root_mean_square(&[3.0, 4.0, 3.0, 4.0]), 3.5355339059327378);
    assert_abs_diff_eq!(root_mean_square(&[2.0]), 2.0);
    assert_abs_diff_eq!(root_mean_square(&[-2.0, 2.0]), 2.0);
    // An empty slice must quietly produce NaN, not panic.
    assert!(root_mean_square(&[]).is_nan());
}

#[test]
fn test_nan_statistics_exclude_nan() {
    let values = [1.0, 2.0, 3.0, f64::NAN, 4.0];
    assert_abs_diff_eq!(nan_mean(&values), 2.5);
    assert_abs_diff_eq!(nan_std(&values), 1.118033988749895);
    assert_abs_diff_eq!(nan_median(&values), 2.5);

    let all_nan = [f64::NAN, f64::NAN];
    assert!(nan_mean(&all_nan).is_nan());
    assert!(nan_std(&all_nan).is_nan());
    assert!(nan_median(&all_nan).is_nan());
}

#[test]
fn test_chauvenet_flags_outliers() {
    let grid = array![[1.0, 1.1], [0.9, 50.0]];
    let mean = nan_mean(grid.iter());
    let stddev = nan_std(grid.iter());
    // With only 4 values the outlier dominates the spread, so nothing
    // crosses 3 sigma; a tighter threshold isolates it.
    let flagged = chauvenet(grid.view(), mean, stddev, CHAUVENET_THRESHOLD);
    assert!(flagged.iter().all(|&f| !f));
    let flagged = chauvenet(grid.view(), mean, stddev, 1.0);
    assert!(flagged[[1, 1]]);
    assert!(!flagged[[0, 0]]);
    assert!(!flagged[[0, 1]]);
    assert!(!flagged[[1, 0]]);
}

#[test]
fn test_chauvenet_nan_never_flagged() {
    let grid = array![[f64::NAN, 1.0], [1.0, 100.0]];
    // A mean and stddev heavily skewed by the outlier; the NaN cell must
    // still compare false.
    let flagged = chauvenet(grid.view(), 1.0, 0.1, CHAUVENET_THRESHOLD);
    assert!(!flagged[[0, 0]]);
    assert!(flagged[[1, 1]]);
}

#[test]
fn test_chauvenet_monotonic_in_threshold() {
    let grid = array![[1.0, 2.0, 3.0], [4.0, 8.0, 20.0]];
    let mean = nan_mean(grid.iter());
    let stddev = nan_std(grid.iter());
    let loose = chauvenet(grid.view(), mean, stddev, 0.5);
    let tight = chauvenet(grid.view(), mean, stddev, 2.0);
    // Everything flagged at the larger threshold is flagged at the smaller.
    for (t, l) in tight.iter().zip(loose.iter()) {
        if *t {
            assert!(*l);
        }
    }
}

#[test]
fn test_double_mad_flags_asymmetric_outlier() {
    // Spread the clean values so neither side's MAD collapses to zero.
    let mut values: Vec<f64> = (0..15).map(|k| 1.0 + 0.01 * k as f64).collect();
    values.push(30.0);
    let flagged = double_mad(&values, DOUBLE_MAD_THRESHOLD);
    assert_eq!(flagged.iter().filter(|&&f| f).count(), 1);
    assert!(flagged[values.len() - 1]);
}

#[test]
fn test_double_mad_median_element_never_flagged() {
    // Zero MAD on one side makes the modified z-score infinite for every
    // element off the median, but elements equal to the median must score 0.
    let values = [5.0, 5.0, 5.0, 5.0, 100.0];
    let flagged = double_mad(&values, DOUBLE_MAD_THRESHOLD);
    assert!(!flagged[0]);
    assert!(!flagged[1]);
    assert!(!flagged[2]);
    assert!(!flagged[3]);
    assert!(flagged[4]);
}

#[test]
fn test_double_mad_excludes_nan() {
    let values = [1.0, 1.2, 0.8, f64::NAN, 1.1, 25.0];
    let flagged = double_mad(&values, DOUBLE_MAD_THRESHOLD);
    assert!(!flagged[3]);
    assert!(flagged[5]);
    // The median must have been computed from the finite entries only;
    // a NaN median would have suppressed all flags.
    assert_eq!(flagged.iter().filter(|&&f| f).count(), 1);
}

#[test]
fn test_bin_mask_shape_and_domain() {
    let n_bin = 256;
    let template = Array1::from_shape_fn(n_bin, |j| {
        let x = (j as f64 - 128.0) / 6.0;
        (-x * x / 2.0).exp()
    });
    let mask = bin_mask_from_template(template.view());
    assert_eq!(mask.len(), n_bin);
    assert!(mask.iter().all(|&m| m == 0 || m == 1));
    // The peak must be on-pulse and the far baseline off-pulse.
    assert_eq!(mask[128], 1);
    assert_eq!(mask[0], 0);
    assert_eq!(mask[255], 0);
}

#[test]
fn test_bin_mask_wraps_around() {
    // A pulse centred on bin 0: its wings hang off both ends of the array,
    // so correct wrap-around indexing must mark both edges on-pulse.
    let n_bin = 256;
    let template = Array1::from_shape_fn(n_bin, |j| {
        let d = (j as isize).min(n_bin as isize - j as isize) as f64;
        if d < 8.0 {
            1.0 - d / 8.0
        } else {
            0.0
        }
    });
    let mask = bin_mask_from_template(template.view());
    assert_eq!(mask[0], 1);
    assert_eq!(mask[n_bin - 1], 1);
    assert_eq!(mask[128], 0);
}

#[test]
fn test_baseline_of_offset_pulse() {
    let n_bin = 256;
    let profile = Array1::from_shape_fn(n_bin, |j| {
        let x = (j as f64 - 100.0) / 4.0;
        2.0 + 10.0 * (-x * x / 2.0).exp()
    });
    let (base_mean, base_rms) = baseline(profile.view(), DEFAULT_DUTY);
    assert_abs_diff_eq!(base_mean, 2.0, epsilon = 0.05);
    assert_abs_diff_eq!(base_rms, 2.0, epsilon = 0.05);
}
