// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Configuration problems that abort a rejection run before any weight is
/// modified. Statistical "is this an outlier" decisions are never errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CullError {
    #[error("Unknown rejection criterion '{0}'; allowed criteria are 'chauvenet' and 'DMAD'")]
    UnknownCriterion(String),

    #[error("Template has {template} bins but the archive's profiles have {n_bin}")]
    TemplateLength { template: usize, n_bin: usize },

    #[error("The iteration count must be greater than 0")]
    ZeroIterations,

    #[error("The sub-integration scrunch factor must be greater than 0")]
    ZeroScrunchFactor,
}
