// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all psrcull-related errors.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::cull::CullError;
use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum PsrcullError {
    #[error("{0}")]
    Archive(#[from] ArchiveError),

    #[error("{0}")]
    Template(#[from] TemplateError),

    #[error("{0}")]
    Cull(#[from] CullError),

    #[error("Couldn't write the rejection report: {0}")]
    Report(#[from] std::io::Error),

    #[error("Couldn't serialise the rejection report: {0}")]
    ReportFormat(#[from] serde_json::Error),
}
