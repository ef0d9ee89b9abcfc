// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use ndarray_npy::{ReadNpyError, WriteNpyError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Couldn't read template {path}: {err}")]
    Read {
        path: PathBuf,
        err: ReadNpyError,
    },

    #[error("Couldn't write template {path}: {err}")]
    Write {
        path: PathBuf,
        err: WriteNpyError,
    },

    #[error("Template accumulator expects {expected} bins per profile, but the archive has {got}")]
    BinCountMismatch { expected: usize, got: usize },
}
