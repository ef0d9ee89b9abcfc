// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The iterative outlier-rejection engine.
//!
//! Rejection runs as two loops in sequence: an RMS-based loop screens out
//! grossly noisy profiles first, then a bin-shift loop applies the more
//! expensive template-matching statistics to the cleaner remainder. Each
//! loop repeats until a pass flags nothing (converged) or the iteration
//! budget runs out (exhausted; a terminal state, not an error). Every pass
//! recomputes its statistics grids from the archive's current weights,
//! flags cells with the selected criterion, and only then zeroes the
//! flagged weights, so criterion thresholds always come from the pre-pass
//! state. Zeroing is monotonic within a run: no pass restores a weight.

mod error;
#[cfg(test)]
mod tests;

pub use error::CullError;

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use log::{debug, info};
use ndarray::prelude::*;
use serde::Serialize;

use crate::archive::Archive;
use crate::stats;
use crate::toa;

/// Statistical criteria for flagging outlier cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectionCriterion {
    /// Chauvenet's criterion: flag deviations beyond a fixed number of
    /// standard deviations from the mean.
    Chauvenet,

    /// Double median absolute deviation, with separate deviation scales
    /// above and below the median. Only applied to the RMS loop; the
    /// bin-shift loop always uses Chauvenet.
    DoubleMad,
}

impl FromStr for RejectionCriterion {
    type Err = CullError;

    fn from_str(s: &str) -> Result<RejectionCriterion, CullError> {
        match s {
            "chauvenet" => Ok(RejectionCriterion::Chauvenet),
            "DMAD" | "dmad" => Ok(RejectionCriterion::DoubleMad),
            other => Err(CullError::UnknownCriterion(other.to_string())),
        }
    }
}

impl fmt::Display for RejectionCriterion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RejectionCriterion::Chauvenet => write!(f, "chauvenet"),
            RejectionCriterion::DoubleMad => write!(f, "DMAD"),
        }
    }
}

/// Which of the two rejection loops an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopKind {
    Rms,
    BinShift,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoopKind::Rms => write!(f, "RMS"),
            LoopKind::BinShift => write!(f, "bin shift"),
        }
    }
}

/// Terminal state of one rejection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    /// A pass flagged nothing; every outlier the criterion can see is gone.
    Converged,

    /// The iteration budget ran out before a pass came up empty. This means
    /// "did as much as allowed", not failure.
    Exhausted,
}

/// What one rejection loop did.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LoopOutcome {
    pub state: LoopState,

    /// Passes executed, including the empty one that declared convergence.
    pub num_passes: usize,

    /// Distinct cells whose weights this loop zeroed.
    pub num_rejected: usize,
}

/// Whether the archive was actually culled or skipped outright.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum CullStatus {
    Culled,

    /// The archive's signal-to-noise was below the configured floor; it was
    /// skipped without modification. A quality outcome, not an error.
    LowSignalToNoise { sn: f64, threshold: f64 },
}

/// Summary of a full rejection run, serialisable for downstream bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct CullReport {
    pub status: CullStatus,
    pub n_subint: usize,
    pub n_chan: usize,
    pub n_bin: usize,
    pub rms_loop: Option<LoopOutcome>,
    pub bin_shift_loop: Option<LoopOutcome>,

    /// Total distinct cells zeroed across both loops.
    pub num_rejected: usize,
}

/// Tunables for a rejection run.
#[derive(Debug, Clone)]
pub struct CullParams {
    /// The criterion for the RMS loop. The bin-shift loop always uses
    /// Chauvenet on the shift and shift-error grids.
    pub criterion: RejectionCriterion,

    /// The iteration budget for each of the two loops.
    pub max_iterations: NonZeroUsize,

    /// Archives with a signal-to-noise estimate below this are skipped.
    pub sn_threshold: f64,
}

impl Default for CullParams {
    fn default() -> CullParams {
        CullParams {
            criterion: RejectionCriterion::Chauvenet,
            max_iterations: NonZeroUsize::new(1).unwrap(),
            sn_threshold: 3000.0,
        }
    }
}

/// Observer for rejection progress, so the engine never talks to a console
/// directly. All methods default to no-ops.
pub trait CullProgress {
    fn pass_started(&self, _kind: LoopKind, _pass: usize) {}

    fn cell_rejected(&self, _subint: usize, _chan: usize) {}

    fn loop_finished(&self, _kind: LoopKind, _outcome: &LoopOutcome) {}
}

/// Swallows every progress event.
pub struct SilentProgress;

impl CullProgress for SilentProgress {}

/// The RMS of every cell's off-pulse region, computed in parallel over the
/// supplied snapshot of the data cube. Cells whose profile is entirely zero
/// get NaN rather than 0, so already-flagged cells read as missing instead
/// of perfectly quiet.
pub fn build_rms_matrix(data: ArrayView3<f64>, mask: ArrayView1<u8>) -> Array2<f64> {
    let (n_subint, n_chan, _) = data.dim();
    let mut rms_matrix = Array2::zeros((n_subint, n_chan));
    ndarray::Zip::from(&mut rms_matrix)
        .and(data.lanes(Axis(2)))
        .par_for_each(|rms, profile| {
            if profile.iter().all(|&amp| amp == 0.0) {
                *rms = f64::NAN;
                return;
            }
            let off_pulse: Vec<f64> = profile
                .iter()
                .zip(mask.iter())
                .filter(|(_, &m)| m == 0)
                .map(|(&amp, _)| amp)
                .collect();
            *rms = stats::root_mean_square(&off_pulse);
        });
    rms_matrix
}

/// Rejects outlier profiles in `archive` by zeroing their weights: an
/// RMS-based loop followed by a bin-shift-based loop, each iterated until
/// convergence or `params.max_iterations`.
///
/// The template must match the archive's bin count. Archives below the
/// signal-to-noise floor are reported as skipped without being touched.
pub fn reject<A: Archive>(
    archive: &mut A,
    template: ArrayView1<f64>,
    params: &CullParams,
    progress: &dyn CullProgress,
) -> Result<CullReport, CullError> {
    let (n_subint, n_chan, n_bin) = (archive.n_subint(), archive.n_chan(), archive.n_bin());
    if template.len() != n_bin {
        return Err(CullError::TemplateLength {
            template: template.len(),
            n_bin,
        });
    }

    let sn = archive.sn();
    if sn < params.sn_threshold {
        info!(
            "Signal-to-noise {:.1} is below the floor of {}; skipping this archive",
            sn, params.sn_threshold
        );
        return Ok(CullReport {
            status: CullStatus::LowSignalToNoise {
                sn,
                threshold: params.sn_threshold,
            },
            n_subint,
            n_chan,
            n_bin,
            rms_loop: None,
            bin_shift_loop: None,
            num_rejected: 0,
        });
    }

    info!(
        "Beginning data rejection ({} criterion, budget of {} passes per loop)",
        params.criterion, params.max_iterations
    );

    // One mask per run; prior zeroing changes the statistics grids but never
    // the template.
    let mask = stats::bin_mask_from_template(template);

    let rms_outcome = rms_loop(archive, mask.view(), params, progress);
    // The bin-shift loop runs regardless of how the RMS loop ended: gross
    // noise is gone either way, which is all the fit-based screening needs.
    let shift_outcome = bin_shift_loop(archive, template, mask.view(), params, progress);

    let num_rejected = rms_outcome.num_rejected + shift_outcome.num_rejected;
    info!("Data rejection complete; {num_rejected} profiles zeroed");

    Ok(CullReport {
        status: CullStatus::Culled,
        n_subint,
        n_chan,
        n_bin,
        rms_loop: Some(rms_outcome),
        bin_shift_loop: Some(shift_outcome),
        num_rejected,
    })
}

fn rms_loop<A: Archive>(
    archive: &mut A,
    mask: ArrayView1<u8>,
    params: &CullParams,
    progress: &dyn CullProgress,
) -> LoopOutcome {
    let max_iterations = params.max_iterations.get();
    let mut num_rejected = 0;

    for pass in 0..max_iterations {
        progress.pass_started(LoopKind::Rms, pass);

        let rms_matrix = build_rms_matrix(archive.data(), mask);
        let flagged = criterion_flags(rms_matrix.view(), params.criterion);
        let cells: Vec<(usize, usize)> = flagged
            .indexed_iter()
            .filter(|(_, &f)| f)
            .map(|(idx, _)| idx)
            .collect();

        if cells.is_empty() {
            let outcome = LoopOutcome {
                state: LoopState::Converged,
                num_passes: pass + 1,
                num_rejected,
            };
            info!("RMS rejection converged after {} generations", pass + 1);
            progress.loop_finished(LoopKind::Rms, &outcome);
            return outcome;
        }

        zero_cells(archive, &cells, progress);
        num_rejected += cells.len();
    }

    let outcome = LoopOutcome {
        state: LoopState::Exhausted,
        num_passes: max_iterations,
        num_rejected,
    };
    info!("Maximum number of RMS rejection passes ({max_iterations}) completed");
    progress.loop_finished(LoopKind::Rms, &outcome);
    outcome
}

fn bin_shift_loop<A: Archive>(
    archive: &mut A,
    template: ArrayView1<f64>,
    mask: ArrayView1<u8>,
    params: &CullParams,
    progress: &dyn CullProgress,
) -> LoopOutcome {
    let max_iterations = params.max_iterations.get();
    let mut num_rejected = 0;

    for pass in 0..max_iterations {
        progress.pass_started(LoopKind::BinShift, pass);

        let (cells, converged) = bin_shift_pass(archive, template, mask);
        num_rejected += cells.len();
        zero_cells(archive, &cells, progress);

        if converged {
            let outcome = LoopOutcome {
                state: LoopState::Converged,
                num_passes: pass + 1,
                num_rejected,
            };
            info!("Bin shift rejection converged after {} generations", pass + 1);
            progress.loop_finished(LoopKind::BinShift, &outcome);
            return outcome;
        }
    }

    let outcome = LoopOutcome {
        state: LoopState::Exhausted,
        num_passes: max_iterations,
        num_rejected,
    };
    info!("Maximum number of bin shift rejection passes ({max_iterations}) completed");
    progress.loop_finished(LoopKind::BinShift, &outcome);
    outcome
}

/// One bin-shift pass: build the shift and shift-error grids, flag each with
/// Chauvenet's criterion independently, and return the union of hard fit
/// failures and flagged cells. The loop has converged when *both* criterion
/// flag sets are empty; hard failures still zero their cells but read as
/// missing (NaN) from the next pass onwards, so they can't hold the loop
/// open.
fn bin_shift_pass<A: Archive>(
    archive: &A,
    template: ArrayView1<f64>,
    mask: ArrayView1<u8>,
) -> (Vec<(usize, usize)>, bool) {
    let data = archive.data();
    let rms_matrix = build_rms_matrix(data, mask);
    let (shifts, errors, failures) = toa::build_shift_matrices(data, template, rms_matrix.view());
    for &(subint, chan) in &failures {
        debug!("Bin shift fit failed for (subint: {subint}, channel: {chan})");
    }

    let shift_mean = stats::nan_mean(shifts.iter());
    let shift_std = stats::nan_std(shifts.iter());
    let error_mean = stats::nan_mean(errors.iter());
    let error_std = stats::nan_std(errors.iter());

    let flagged_shifts = stats::chauvenet(
        shifts.view(),
        shift_mean,
        shift_std,
        stats::CHAUVENET_THRESHOLD,
    );
    let flagged_errors = stats::chauvenet(
        errors.view(),
        error_mean,
        error_std,
        stats::CHAUVENET_THRESHOLD,
    );
    let converged = !flagged_shifts.iter().any(|&f| f) && !flagged_errors.iter().any(|&f| f);

    let mut cells = failures;
    cells.extend(
        flagged_shifts
            .indexed_iter()
            .zip(flagged_errors.iter())
            .filter(|((_, &s), &e)| s || e)
            .map(|((idx, _), _)| idx),
    );
    (cells, converged)
}

/// Applies the selected criterion to a statistics grid. NaN cells (missing
/// data) can never be flagged by either criterion.
fn criterion_flags(grid: ArrayView2<f64>, criterion: RejectionCriterion) -> Array2<bool> {
    match criterion {
        RejectionCriterion::Chauvenet => {
            let mean = stats::nan_mean(grid.iter());
            let stddev = stats::nan_std(grid.iter());
            stats::chauvenet(grid, mean, stddev, stats::CHAUVENET_THRESHOLD)
        }
        RejectionCriterion::DoubleMad => {
            let linear: Vec<f64> = grid.iter().copied().collect();
            let flags = stats::double_mad(&linear, stats::DOUBLE_MAD_THRESHOLD);
            Array2::from_shape_vec(grid.dim(), flags).unwrap()
        }
    }
}

/// Zeroes the weight of every listed cell, after the full flagged set for
/// the pass has been determined.
fn zero_cells<A: Archive>(
    archive: &mut A,
    cells: &[(usize, usize)],
    progress: &dyn CullProgress,
) {
    for &(subint, chan) in cells {
        debug!("Setting the weight of (subint: {subint}, channel: {chan}) to 0");
        archive.set_weight(0.0, subint, chan);
        progress.cell_rejected(subint, chan);
    }
}
