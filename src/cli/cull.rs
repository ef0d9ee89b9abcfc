// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fs::File;
use std::io::BufWriter;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;

use crate::archive::{Archive, MemoryArchive};
use crate::cull::{
    self, CullError, CullParams, CullProgress, CullStatus, LoopKind, RejectionCriterion,
};
use crate::template;
use crate::{PsrcullError, PROGRESS_BARS};

#[derive(Debug, clap::Args)]
pub(super) struct CullArgs {
    /// Path to the archive to cull: an npz file with 'data' and 'weights'
    /// entries.
    #[clap(name = "ARCHIVE")]
    archive: PathBuf,

    /// Path to the template profile (.npy; the extension may be omitted).
    #[clap(short, long)]
    template: PathBuf,

    /// The rejection criterion for the RMS loop, either 'chauvenet' or
    /// 'DMAD'. The bin-shift loop always uses 'chauvenet'.
    #[clap(short, long, default_value = "chauvenet")]
    criterion: String,

    /// The iteration budget for each rejection loop. Must be greater than 0.
    #[clap(short, long, default_value = "1")]
    iterations: usize,

    /// Skip archives whose signal-to-noise estimate is below this floor.
    #[clap(long, default_value = "3000")]
    sn_threshold: f64,

    /// Average this many sub-integrations together before culling. Must be
    /// greater than 0.
    #[clap(short = 's', long)]
    subint_factor: Option<usize>,

    /// Where to write the culled archive. The input file is rewritten in
    /// place if this isn't given.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Write a JSON rejection report to this path.
    #[clap(long)]
    report: Option<PathBuf>,
}

impl CullArgs {
    pub(super) fn run(self) -> Result<(), PsrcullError> {
        // Configuration problems surface before the archive is touched.
        let criterion = RejectionCriterion::from_str(&self.criterion)?;
        let max_iterations =
            NonZeroUsize::new(self.iterations).ok_or(CullError::ZeroIterations)?;
        let subint_factor = self
            .subint_factor
            .map(|f| NonZeroUsize::new(f).ok_or(CullError::ZeroScrunchFactor))
            .transpose()?;

        let mut archive = MemoryArchive::from_npz(&self.archive)?;
        info!(
            "Loaded {}: {} sub-integrations x {} channels x {} bins",
            self.archive.display(),
            archive.n_subint(),
            archive.n_chan(),
            archive.n_bin()
        );
        if let Some(factor) = subint_factor {
            archive.tscrunch(factor);
            info!("Scrunched to {} sub-integrations", archive.n_subint());
        }

        let template = template::load(&self.template)?;
        info!("Template {} loaded", self.template.display());

        let params = CullParams {
            criterion,
            max_iterations,
            sn_threshold: self.sn_threshold,
        };
        let progress = BarProgress::new(max_iterations.get());
        let report = cull::reject(&mut archive, template.view(), &params, &progress)?;
        progress.finish();

        match report.status {
            CullStatus::LowSignalToNoise { .. } => {
                // Nothing was modified, so there's nothing worth writing.
            }
            CullStatus::Culled => {
                let output = self.output.as_ref().unwrap_or(&self.archive);
                archive.write_npz(output)?;
                info!("Culled archive written to {}", output.display());
            }
        }

        if let Some(report_path) = &self.report {
            let file = BufWriter::new(File::create(report_path)?);
            serde_json::to_writer_pretty(file, &report)?;
            info!("Rejection report written to {}", report_path.display());
        }

        Ok(())
    }
}

/// A progress bar over rejection passes, hidden unless progress bars are
/// enabled.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(max_iterations: usize) -> BarProgress {
        let bar = ProgressBar::with_draw_target(
            Some((2 * max_iterations) as u64),
            if PROGRESS_BARS.load() {
                // Use stdout, not stderr, because the messages printed by
                // the progress bar are valuable.
                ProgressDrawTarget::stdout()
            } else {
                ProgressDrawTarget::hidden()
            },
        )
        .with_style(
            ProgressStyle::default_bar()
                .template("{msg}: [{wide_bar:.blue}] {pos:3}/{len:3}")
                .unwrap()
                .progress_chars("=> "),
        )
        .with_position(0)
        .with_message("Rejecting");
        BarProgress { bar }
    }

    fn finish(&self) {
        self.bar.abandon();
    }
}

impl CullProgress for BarProgress {
    fn pass_started(&self, kind: LoopKind, pass: usize) {
        self.bar.set_message(format!("{} pass {}", kind, pass + 1));
        self.bar.inc(1);
    }

    fn cell_rejected(&self, subint: usize, chan: usize) {
        if !self.bar.is_hidden() {
            self.bar
                .println(format!("Zeroing the weight of (subint: {subint}, channel: {chan})"));
        }
    }
}
