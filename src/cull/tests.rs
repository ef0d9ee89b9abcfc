// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::cell::Cell;

use approx::assert_abs_diff_eq;

use super::*;
use crate::archive::MemoryArchive;

const N_BIN: usize = 64;

/// A pulse with an exactly-zero baseline, centred on bin 32.
fn pulse_template() -> Array1<f64> {
    Array1::from_shape_fn(N_BIN, |j| {
        let d = (j as f64 - 32.0).abs();
        (1.0 - d / 5.0).max(0.0)
    })
}

/// A 4x4 archive whose cell (s, c) holds the template riding on a constant
/// baseline of `levels[[s, c]]`, so each cell's off-pulse RMS is exactly its
/// baseline level.
fn archive_with_levels(levels: &Array2<f64>) -> MemoryArchive {
    let template = pulse_template();
    let (n_subint, n_chan) = levels.dim();
    let raw = Array3::from_shape_fn((n_subint, n_chan, N_BIN), |(s, c, b)| {
        template[b] + levels[[s, c]]
    });
    MemoryArchive::with_unit_weights(raw)
}

/// 15 clean baseline levels plus one hot cell at the given position.
fn levels_with_outlier(outlier: f64, position: (usize, usize)) -> Array2<f64> {
    let mut k = 0;
    let mut levels = Array2::zeros((4, 4));
    for s in 0..4 {
        for c in 0..4 {
            if (s, c) == position {
                levels[[s, c]] = outlier;
            } else {
                levels[[s, c]] = 1.0 + 0.01 * k as f64;
                k += 1;
            }
        }
    }
    levels
}

fn test_params(criterion: RejectionCriterion, iterations: usize) -> CullParams {
    CullParams {
        criterion,
        max_iterations: NonZeroUsize::new(iterations).unwrap(),
        sn_threshold: 0.0,
    }
}

/// Counts progress callbacks.
#[derive(Default)]
struct CountingProgress {
    passes: Cell<usize>,
    rejections: Cell<usize>,
}

impl CullProgress for CountingProgress {
    fn pass_started(&self, _kind: LoopKind, _pass: usize) {
        self.passes.set(self.passes.get() + 1);
    }

    fn cell_rejected(&self, _subint: usize, _chan: usize) {
        self.rejections.set(self.rejections.get() + 1);
    }
}

#[test]
fn test_build_rms_matrix_off_pulse_only() {
    let levels = levels_with_outlier(50.0, (2, 3));
    let archive = archive_with_levels(&levels);
    let template = pulse_template();
    let mask = stats::bin_mask_from_template(template.view());

    let rms_matrix = build_rms_matrix(archive.data(), mask.view());
    // Off-pulse bins hold only the baseline level, so the RMS is the level
    // itself; on-pulse amplitude must not leak in.
    assert_abs_diff_eq!(rms_matrix[[2, 3]], 50.0, epsilon = 1e-12);
    assert_abs_diff_eq!(rms_matrix[[0, 0]], levels[[0, 0]], epsilon = 1e-12);
}

#[test]
fn test_build_rms_matrix_all_zero_cell_is_nan() {
    let mut data = Array3::from_elem((2, 2, N_BIN), 1.0);
    data.slice_mut(ndarray::s![1, 0, ..]).fill(0.0);
    let mask = Array1::zeros(N_BIN);

    let rms_matrix = build_rms_matrix(data.view(), mask.view());
    assert!(rms_matrix[[1, 0]].is_nan());
    assert_abs_diff_eq!(rms_matrix[[0, 0]], 1.0);
}

#[test]
fn test_all_zero_cell_never_flagged_despite_skewed_statistics() {
    let mut levels = levels_with_outlier(120.0, (0, 0));
    levels[[3, 3]] = 1.05;
    let archive = {
        let mut archive = archive_with_levels(&levels);
        // An all-zero cell, as left behind by earlier flagging.
        archive.set_weight(0.0, 3, 3);
        archive
    };
    let template = pulse_template();
    let mask = stats::bin_mask_from_template(template.view());

    let rms_matrix = build_rms_matrix(archive.data(), mask.view());
    assert!(rms_matrix[[3, 3]].is_nan());

    // The hot cell skews the global mean and spread, but the missing cell
    // must never be selected by either criterion.
    for criterion in [RejectionCriterion::Chauvenet, RejectionCriterion::DoubleMad] {
        let flagged = criterion_flags(rms_matrix.view(), criterion);
        assert!(!flagged[[3, 3]]);
    }
}

#[test]
fn test_single_outlier_converges_in_one_generation() {
    // Uniform clean baselines make every clean cell bit-identical, so both
    // loops behave exactly: one hot cell, one flagging pass, one empty pass.
    let mut levels = Array2::ones((4, 4));
    levels[[1, 2]] = 50.0;
    let mut archive = archive_with_levels(&levels);
    let template = pulse_template();
    let progress = CountingProgress::default();

    let report = reject(
        &mut archive,
        template.view(),
        &test_params(RejectionCriterion::Chauvenet, 5),
        &progress,
    )
    .unwrap();

    assert!(matches!(report.status, CullStatus::Culled));
    let rms_outcome = report.rms_loop.unwrap();
    assert_eq!(rms_outcome.state, LoopState::Converged);
    // One generation flags the hot cell, the next comes up empty.
    assert_eq!(rms_outcome.num_passes, 2);
    assert_eq!(rms_outcome.num_rejected, 1);

    let shift_outcome = report.bin_shift_loop.unwrap();
    assert_eq!(shift_outcome.state, LoopState::Converged);
    assert_eq!(shift_outcome.num_rejected, 0);

    assert_eq!(report.num_rejected, 1);
    assert_abs_diff_eq!(archive.weights()[[1, 2]], 0.0);
    // Every other weight is untouched.
    assert_eq!(
        archive.weights().iter().filter(|&&w| w == 1.0).count(),
        15
    );
    assert_eq!(progress.rejections.get(), 1);
    // Two RMS passes plus one bin-shift pass.
    assert_eq!(progress.passes.get(), 3);
}

#[test]
fn test_double_mad_criterion_flags_single_outlier() {
    let levels = levels_with_outlier(30.0, (0, 3));
    let mut archive = archive_with_levels(&levels);
    let template = pulse_template();

    let report = reject(
        &mut archive,
        template.view(),
        &test_params(RejectionCriterion::DoubleMad, 5),
        &SilentProgress,
    )
    .unwrap();

    let rms_outcome = report.rms_loop.unwrap();
    assert_eq!(rms_outcome.state, LoopState::Converged);
    assert_eq!(rms_outcome.num_rejected, 1);
    assert_abs_diff_eq!(archive.weights()[[0, 3]], 0.0);
}

#[test]
fn test_iteration_budget_bounds_passes() {
    // Two tiers of outlier: the gross one hides the lesser one until it has
    // been excised, so convergence needs three generations.
    let mut levels = Array2::ones((4, 4));
    levels[[0, 0]] = 120.0;
    levels[[0, 1]] = 12.0;

    let template = pulse_template();

    // With a budget of 2, the loop must stop exhausted after both flagging
    // passes, having zeroed both outliers.
    let mut archive = archive_with_levels(&levels);
    let progress = CountingProgress::default();
    let report = reject(
        &mut archive,
        template.view(),
        &test_params(RejectionCriterion::Chauvenet, 2),
        &progress,
    )
    .unwrap();
    let rms_outcome = report.rms_loop.unwrap();
    assert_eq!(rms_outcome.state, LoopState::Exhausted);
    assert_eq!(rms_outcome.num_passes, 2);
    assert_eq!(rms_outcome.num_rejected, 2);
    assert_abs_diff_eq!(archive.weights()[[0, 0]], 0.0);
    assert_abs_diff_eq!(archive.weights()[[0, 1]], 0.0);

    // With budget to spare, the same data converges in three generations.
    let mut archive = archive_with_levels(&levels);
    let report = reject(
        &mut archive,
        template.view(),
        &test_params(RejectionCriterion::Chauvenet, 10),
        &SilentProgress,
    )
    .unwrap();
    let rms_outcome = report.rms_loop.unwrap();
    assert_eq!(rms_outcome.state, LoopState::Converged);
    assert_eq!(rms_outcome.num_passes, 3);
    assert_eq!(rms_outcome.num_rejected, 2);
}

#[test]
fn test_rejection_is_monotonic() {
    let levels = levels_with_outlier(50.0, (1, 1));
    let mut archive = archive_with_levels(&levels);
    let template = pulse_template();

    reject(
        &mut archive,
        template.view(),
        &test_params(RejectionCriterion::Chauvenet, 4),
        &SilentProgress,
    )
    .unwrap();
    assert_abs_diff_eq!(archive.weights()[[1, 1]], 0.0);

    // A second full run over the already-culled archive may flag more cells
    // but must never restore the zeroed one.
    reject(
        &mut archive,
        template.view(),
        &test_params(RejectionCriterion::Chauvenet, 4),
        &SilentProgress,
    )
    .unwrap();
    assert_abs_diff_eq!(archive.weights()[[1, 1]], 0.0);
}

#[test]
fn test_hard_fit_failure_zeroes_cell_locally() {
    // One cell is a constant level with no pulse at all: its RMS blends in,
    // but the template fit has nothing to converge on.
    let template = pulse_template();
    let mut raw = Array3::from_shape_fn((4, 4, N_BIN), |(_, _, b)| template[b] + 1.0);
    raw.slice_mut(ndarray::s![2, 2, ..]).fill(1.0);
    let mut archive = MemoryArchive::with_unit_weights(raw);

    let report = reject(
        &mut archive,
        template.view(),
        &test_params(RejectionCriterion::Chauvenet, 5),
        &SilentProgress,
    )
    .unwrap();

    // The RMS loop sees nothing wrong with the flat cell...
    let rms_outcome = report.rms_loop.unwrap();
    assert_eq!(rms_outcome.num_rejected, 0);

    // ...but the bin-shift loop zeroes it as a hard failure, and the
    // failure is local: the loop still converges on its first pass.
    let shift_outcome = report.bin_shift_loop.unwrap();
    assert_eq!(shift_outcome.state, LoopState::Converged);
    assert_eq!(shift_outcome.num_passes, 1);
    assert_eq!(shift_outcome.num_rejected, 1);
    assert_abs_diff_eq!(archive.weights()[[2, 2]], 0.0);
}

#[test]
fn test_unknown_criterion_is_a_configuration_error() {
    let err = RejectionCriterion::from_str("bogus-criterion").unwrap_err();
    assert_eq!(
        err,
        CullError::UnknownCriterion("bogus-criterion".to_string())
    );
    // The accepted spellings parse.
    assert_eq!(
        RejectionCriterion::from_str("chauvenet").unwrap(),
        RejectionCriterion::Chauvenet
    );
    assert_eq!(
        RejectionCriterion::from_str("DMAD").unwrap(),
        RejectionCriterion::DoubleMad
    );
}

#[test]
fn test_template_length_mismatch_leaves_weights_untouched() {
    let levels = levels_with_outlier(50.0, (0, 0));
    let mut archive = archive_with_levels(&levels);
    let short_template = Array1::ones(N_BIN / 2);

    let result = reject(
        &mut archive,
        short_template.view(),
        &test_params(RejectionCriterion::Chauvenet, 3),
        &SilentProgress,
    );
    assert!(matches!(result, Err(CullError::TemplateLength { .. })));
    // Config errors abort before any weight is modified, outlier included.
    assert!(archive.weights().iter().all(|&w| w == 1.0));
}

#[test]
fn test_low_signal_to_noise_skips_archive() {
    let levels = levels_with_outlier(50.0, (0, 0));
    let mut archive = archive_with_levels(&levels);
    let template = pulse_template();
    let mut params = test_params(RejectionCriterion::Chauvenet, 3);
    params.sn_threshold = 1.0e6;

    let report = reject(&mut archive, template.view(), &params, &SilentProgress).unwrap();
    assert!(matches!(
        report.status,
        CullStatus::LowSignalToNoise { .. }
    ));
    assert!(report.rms_loop.is_none());
    assert!(report.bin_shift_loop.is_none());
    assert_eq!(report.num_rejected, 0);
    // Skipped means untouched, even for the cell that would have been
    // flagged.
    assert!(archive.weights().iter().all(|&w| w == 1.0));
}

#[test]
fn test_report_serialises() {
    let levels = levels_with_outlier(50.0, (1, 2));
    let mut archive = archive_with_levels(&levels);
    let template = pulse_template();

    let report = reject(
        &mut archive,
        template.view(),
        &test_params(RejectionCriterion::Chauvenet, 2),
        &SilentProgress,
    )
    .unwrap();

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"num_rejected\""));
    assert!(json.contains("\"Culled\""));
}
