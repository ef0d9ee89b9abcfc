// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use log::info;
use vec1::Vec1;

use crate::archive::{Archive, MemoryArchive};
use crate::template::{self, TemplateAccumulator};
use crate::PsrcullError;

#[derive(Debug, clap::Args)]
pub(super) struct TemplateArgs {
    /// The archives to accumulate (npz files with 'data' and 'weights'
    /// entries). At least one is required.
    #[clap(name = "ARCHIVES", required = true)]
    archives: Vec<PathBuf>,

    /// Where to write the template profile (.npy appended if the name has
    /// no extension).
    #[clap(short, long)]
    output: PathBuf,
}

impl TemplateArgs {
    pub(super) fn run(self) -> Result<(), PsrcullError> {
        let archives =
            Vec1::try_from_vec(self.archives).expect("clap guarantees at least one archive");

        let first = MemoryArchive::from_npz(archives.first())?;
        let mut accumulator = TemplateAccumulator::new(first.n_bin());
        accumulator.accumulate(&first)?;
        for path in archives.iter().skip(1) {
            let archive = MemoryArchive::from_npz(path)?;
            accumulator.accumulate(&archive)?;
        }
        info!(
            "Accumulated {} profiles from {} archives",
            accumulator.num_profiles(),
            archives.len()
        );

        let written = template::save(&self.output, accumulator.into_profile().view())?;
        info!("Template written to {}", written.display());
        Ok(())
    }
}
