use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "steam-download-monitor",
    version,
    about = "Follow Steam's content log and report the active download"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Number of checks to run before stopping.
    #[arg(long, value_name = "COUNT", value_parser = clap::value_parser!(u32).range(1..))]
    pub checks: Option<u32>,

    /// Seconds to wait between checks.
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// How many trailing log lines to inspect per check.
    #[arg(long, value_name = "LINES", value_parser = clap::value_parser!(u64).range(1..))]
    pub window: Option<u64>,

    /// Steam installation folder (skips automatic discovery).
    #[arg(long, value_name = "DIR", global = true)]
    pub steam_path: Option<PathBuf>,

    /// Content log to follow instead of `<steam>/logs/content_log.txt`.
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Do not mirror reports into the report log file.
    #[arg(long)]
    pub no_log_file: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a one-shot snapshot of the current download.
    Status {
        /// Emit the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check that Steam and its content log can be found.
    Doctor,
}
