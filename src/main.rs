use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use steam_download_monitor::app;
use steam_download_monitor::cli::{Cli, Commands};
use steam_download_monitor::config::MonitorConfig;
use steam_download_monitor::util::setup_tracing;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("steam-download-monitor error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<u8> {
    setup_tracing();
    let cli = Cli::parse();
    let config = MonitorConfig::load_or_init()?;

    match cli.command {
        Some(Commands::Status { json }) => {
            app::print_status(&config, &cli.run, json)?;
            Ok(0)
        }
        Some(Commands::Doctor) => app::doctor(&config, &cli.run),
        None => {
            let outcome = app::run(&config, &cli.run)?;
            Ok(app::exit_code(&outcome))
        }
    }
}
