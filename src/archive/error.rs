// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use ndarray_npy::{ReadNpzError, WriteNpzError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Couldn't open archive file {path}: {err}")]
    Open {
        path: PathBuf,
        err: std::io::Error,
    },

    #[error("Couldn't create archive file {path}: {err}")]
    Create {
        path: PathBuf,
        err: std::io::Error,
    },

    #[error("{path} isn't a valid npz archive (expected 'data' and 'weights' entries): {err}")]
    Npz {
        path: PathBuf,
        err: ReadNpzError,
    },

    #[error("Couldn't write npz archive {path}: {err}")]
    Write {
        path: PathBuf,
        err: WriteNpzError,
    },

    #[error(
        "Weights shape {weights:?} doesn't match the data cube's (sub-integration, channel) dimensions {data:?}"
    )]
    WeightShape {
        data: (usize, usize, usize),
        weights: (usize, usize),
    },
}
