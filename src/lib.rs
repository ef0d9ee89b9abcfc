// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Statistical data culling for folded pulse-profile archives.

Noise-corrupted (sub-integration, channel) profiles are identified by
iterative outlier rejection over off-pulse RMS and template-matching
bin-shift statistics, and excised by zeroing their weights.
 */

pub mod archive;
pub mod cli;
pub mod cull;
mod error;
pub mod stats;
pub mod template;
pub mod toa;

pub use error::PsrcullError;

use crossbeam_utils::atomic::AtomicCell;

/// Whether progress bars are drawn. A UI concern, not an algorithm tunable,
/// so it lives outside `CullParams`.
pub static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
