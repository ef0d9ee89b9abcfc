// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Ways the template-matching fit can fail for a single profile. These are
/// local to one (sub-integration, channel) cell; the rejection engine zeroes
/// the cell and carries on.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FitError {
    #[error("Template has {template} bins but profile has {profile}")]
    LengthMismatch { template: usize, profile: usize },

    #[error("Profile has {0} bins; too few to fit over the lag window")]
    TooFewBins(usize),

    #[error("Cross-correlation produced non-finite values")]
    NotFinite,

    #[error("Cross-correlation is flat; no peak to fit")]
    FlatCorrelation,

    #[error("Correlation peak has no negative curvature; fit did not converge")]
    NoCurvature,

    #[error("Fitted apex {0} lies outside the lag window")]
    ApexOutsideWindow(f64),
}
