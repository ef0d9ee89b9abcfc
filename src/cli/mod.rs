// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command-line interface code. Options specific to each `psrcull`
//! subcommand live in their own modules.

mod cull;
mod template;

use clap::{AppSettings, Args, Parser, Subcommand};
use log::info;

use crate::{PsrcullError, PROGRESS_BARS};

#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    about = "Statistical data culling for folded pulse-profile archives"
)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_subcommands = true)]
#[clap(propagate_version = true)]
pub struct Psrcull {
    #[clap(flatten)]
    global_opts: GlobalArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Don't draw progress bars.
    #[clap(long)]
    #[clap(global = true)]
    no_progress_bars: bool,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    #[clap(global = true)]
    verbosity: u8,
}

#[derive(Debug, Subcommand)]
#[clap(arg_required_else_help = true)]
enum Command {
    #[clap(about = "Reject noise-corrupted profiles from an archive by iterative outlier excision.")]
    Cull(cull::CullArgs),

    #[clap(about = "Accumulate the profiles of one or more archives into a template profile.")]
    Template(template::TemplateArgs),
}

impl Psrcull {
    pub fn run(self) -> Result<(), PsrcullError> {
        setup_logging(self.global_opts.verbosity).expect("Failed to initialise logging.");
        // Enable progress bars if the user didn't say "no progress bars".
        if !self.global_opts.no_progress_bars {
            PROGRESS_BARS.store(true);
        }

        let sub_command = match &self.command {
            Command::Cull(_) => "cull",
            Command::Template(_) => "template",
        };
        info!("psrcull {} {}", sub_command, env!("CARGO_PKG_VERSION"));

        match self.command {
            Command::Cull(args) => args.run(),
            Command::Template(args) => args.run(),
        }
    }
}

/// Activate a logger. All log messages are put onto `stdout`. `env_logger`
/// automatically only uses colours and fancy symbols if we're on a tty;
/// piped output will be formatted sensibly.
fn setup_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        _ => builder.filter_level(log::LevelFilter::Trace),
    };
    builder.init();

    Ok(())
}
