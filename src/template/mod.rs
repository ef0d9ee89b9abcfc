// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Template-profile persistence and creation.
//!
//! Templates are 1-D `.npy` arrays on disk; a filename with no extension
//! gets `.npy` appended. New templates are built by folding the profiles of
//! one or more archives into a [`TemplateAccumulator`].

mod error;

pub use error::TemplateError;

use std::path::{Path, PathBuf};

use log::debug;
use ndarray::prelude::*;
use ndarray_npy::{read_npy, write_npy};

use crate::archive::Archive;

/// Appends the default `.npy` extension when the path has none.
fn with_default_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(_) => path.to_path_buf(),
        None => path.with_extension("npy"),
    }
}

/// Loads a template profile from a `.npy` file.
pub fn load(path: &Path) -> Result<Array1<f64>, TemplateError> {
    let path = with_default_extension(path);
    let template = read_npy(&path).map_err(|err| TemplateError::Read { path, err })?;
    Ok(template)
}

/// Saves a template profile to a `.npy` file.
pub fn save(path: &Path, template: ArrayView1<f64>) -> Result<PathBuf, TemplateError> {
    let path = with_default_extension(path);
    write_npy(&path, &template).map_err(|err| TemplateError::Write {
        path: path.clone(),
        err,
    })?;
    Ok(path)
}

/// Sums pulse profiles across archives into a single template profile.
///
/// The accumulator is seeded with a zero profile of the expected bin count
/// and folded over archives one at a time; every archive must agree on the
/// bin count.
pub struct TemplateAccumulator {
    profile: Array1<f64>,
    num_profiles: usize,
}

impl TemplateAccumulator {
    pub fn new(n_bin: usize) -> TemplateAccumulator {
        TemplateAccumulator {
            profile: Array1::zeros(n_bin),
            num_profiles: 0,
        }
    }

    /// Adds every (sub-integration, channel) profile of `archive` to the
    /// running template.
    pub fn accumulate<A: Archive>(&mut self, archive: &A) -> Result<(), TemplateError> {
        if archive.n_bin() != self.profile.len() {
            return Err(TemplateError::BinCountMismatch {
                expected: self.profile.len(),
                got: archive.n_bin(),
            });
        }
        let data = archive.data();
        for lane in data.lanes(Axis(2)) {
            self.profile += &lane;
        }
        self.num_profiles += archive.n_subint() * archive.n_chan();
        debug!("Accumulated {} profiles so far", self.num_profiles);
        Ok(())
    }

    /// How many profiles have been folded in.
    pub fn num_profiles(&self) -> usize {
        self.num_profiles
    }

    pub fn into_profile(self) -> Array1<f64> {
        self.profile
    }
}
