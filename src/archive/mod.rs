// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The archive seam: the narrow contract the rejection engine drives, and
//! an in-memory implementation with numpy-interchange IO.
//!
//! Folded-archive *parsing* (PSRFITS and friends) deliberately lives outside
//! this crate; anything that can serve a (sub-integration, channel, bin)
//! cube and accept per-cell weight updates can sit behind [`Archive`].

mod error;

pub use error::ArchiveError;

use std::fs::File;
use std::io::BufWriter;
use std::num::NonZeroUsize;
use std::path::Path;

use ndarray::prelude::*;
use ndarray_npy::{NpzReader, NpzWriter};
use rayon::prelude::*;

use crate::stats;

/// What the rejection engine needs from a folded archive: read access to the
/// weighted amplitude cube and the ability to zero (or restore) one cell's
/// weight.
pub trait Archive {
    fn n_subint(&self) -> usize;

    fn n_chan(&self) -> usize;

    fn n_bin(&self) -> usize;

    /// The amplitude cube with the current weights applied; a zero-weight
    /// cell reads as an all-zero profile.
    fn data(&self) -> ArrayView3<'_, f64>;

    /// Sets one cell's weight. The engine only ever writes 0, but restoring
    /// with 1 is allowed; amplitudes themselves are never touched.
    fn set_weight(&mut self, weight: f64, subint: usize, chan: usize);

    /// A scalar signal-to-noise estimate of the whole archive, used as a
    /// pre-flight gate before rejection begins.
    fn sn(&self) -> f64;
}

/// An [`Archive`] held fully in memory, loadable from (and writable to) an
/// `.npz` file with `data` (3-D) and `weights` (2-D) entries.
pub struct MemoryArchive {
    /// Raw amplitudes, shape (n_subint, n_chan, n_bin). Never mutated after
    /// construction.
    raw: Array3<f64>,

    /// Per-cell weights, shape (n_subint, n_chan).
    weights: Array2<f64>,

    /// `raw` with `weights` applied, kept in step with `set_weight`.
    weighted: Array3<f64>,
}

impl MemoryArchive {
    pub fn new(raw: Array3<f64>, weights: Array2<f64>) -> Result<MemoryArchive, ArchiveError> {
        let (n_subint, n_chan, _) = raw.dim();
        if weights.dim() != (n_subint, n_chan) {
            return Err(ArchiveError::WeightShape {
                data: raw.dim(),
                weights: weights.dim(),
            });
        }
        let mut archive = MemoryArchive {
            weighted: Array3::zeros(raw.dim()),
            raw,
            weights,
        };
        archive.reapply_weights();
        Ok(archive)
    }

    /// An archive with every cell's weight set to 1.
    pub fn with_unit_weights(raw: Array3<f64>) -> MemoryArchive {
        let (n_subint, n_chan, _) = raw.dim();
        let weights = Array2::ones((n_subint, n_chan));
        // Shapes agree by construction.
        MemoryArchive::new(raw, weights).unwrap()
    }

    pub fn from_npz(path: &Path) -> Result<MemoryArchive, ArchiveError> {
        let file = File::open(path).map_err(|err| ArchiveError::Open {
            path: path.to_path_buf(),
            err,
        })?;
        let mut npz = NpzReader::new(file).map_err(|err| ArchiveError::Npz {
            path: path.to_path_buf(),
            err,
        })?;
        let raw: Array3<f64> = npz_entry(&mut npz, path, "data")?;
        let weights: Array2<f64> = npz_entry(&mut npz, path, "weights")?;
        MemoryArchive::new(raw, weights)
    }

    pub fn write_npz(&self, path: &Path) -> Result<(), ArchiveError> {
        let file = File::create(path).map_err(|err| ArchiveError::Create {
            path: path.to_path_buf(),
            err,
        })?;
        let write_err = |err| ArchiveError::Write {
            path: path.to_path_buf(),
            err,
        };
        let mut npz = NpzWriter::new(BufWriter::new(file));
        npz.add_array("data", &self.raw).map_err(write_err)?;
        npz.add_array("weights", &self.weights).map_err(write_err)?;
        npz.finish().map_err(write_err)?;
        Ok(())
    }

    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    /// Averages blocks of `factor` sub-integrations together, weighting each
    /// profile by its cell weight. A trailing partial block is averaged on
    /// its own. Blocks whose weights are all zero stay zero-weighted.
    pub fn tscrunch(&mut self, factor: NonZeroUsize) {
        let factor = factor.get();
        if factor == 1 {
            return;
        }
        let (n_subint, n_chan, n_bin) = self.raw.dim();
        let n_out = n_subint.div_ceil(factor);
        let mut raw = Array3::zeros((n_out, n_chan, n_bin));
        let mut weights = Array2::zeros((n_out, n_chan));

        for i_out in 0..n_out {
            let block = i_out * factor..((i_out + 1) * factor).min(n_subint);
            for i_chan in 0..n_chan {
                let weight_sum: f64 = block.clone().map(|s| self.weights[[s, i_chan]]).sum();
                if weight_sum == 0.0 {
                    continue;
                }
                let mut accumulated = raw.slice_mut(s![i_out, i_chan, ..]);
                for i_subint in block.clone() {
                    let w = self.weights[[i_subint, i_chan]];
                    accumulated.scaled_add(w / weight_sum, &self.raw.slice(s![i_subint, i_chan, ..]));
                }
                weights[[i_out, i_chan]] = 1.0;
            }
        }

        self.raw = raw;
        self.weights = weights;
        self.weighted = Array3::zeros(self.raw.dim());
        self.reapply_weights();
    }

    fn reapply_weights(&mut self) {
        for ((i_subint, i_chan), &w) in self.weights.indexed_iter() {
            let row = self.raw.slice(s![i_subint, i_chan, ..]);
            self.weighted
                .slice_mut(s![i_subint, i_chan, ..])
                .assign(&row.mapv(|v| v * w));
        }
    }
}

impl Archive for MemoryArchive {
    fn n_subint(&self) -> usize {
        self.raw.len_of(Axis(0))
    }

    fn n_chan(&self) -> usize {
        self.raw.len_of(Axis(1))
    }

    fn n_bin(&self) -> usize {
        self.raw.len_of(Axis(2))
    }

    fn data(&self) -> ArrayView3<'_, f64> {
        self.weighted.view()
    }

    fn set_weight(&mut self, weight: f64, subint: usize, chan: usize) {
        self.weights[[subint, chan]] = weight;
        let row = self.raw.slice(s![subint, chan, ..]);
        self.weighted
            .slice_mut(s![subint, chan, ..])
            .assign(&row.mapv(|v| v * weight));
    }

    /// Peak amplitude of the frequency- and time-summed profile over its own
    /// off-pulse RMS. Coarse, but it only gates whether the archive is worth
    /// culling at all.
    fn sn(&self) -> f64 {
        let n_bin = self.n_bin();
        let summed = self
            .weighted
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|subint| subint.sum_axis(Axis(0)))
            .reduce(|| Array1::zeros(n_bin), |a, b| a + b);
        let (base_mean, base_rms) = stats::baseline(summed.view(), stats::DEFAULT_DUTY);
        let peak = summed.fold(f64::NEG_INFINITY, |a, &v| a.max(v));
        (peak - base_mean) / base_rms
    }
}

fn npz_entry<D: ndarray::Dimension>(
    npz: &mut NpzReader<File>,
    path: &Path,
    name: &str,
) -> Result<Array<f64, D>, ArchiveError> {
    // Tolerate both bare and numpy-style suffixed entry names.
    npz.by_name(name)
        .or_else(|_| npz.by_name(&format!("{name}.npy")))
        .map_err(|err| ArchiveError::Npz {
            path: path.to_path_buf(),
            err,
        })
}
