use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::RunArgs;
use crate::config::{self, LocationSource, MonitorConfig, RuntimeSettings, SteamLocation};
use crate::logtail::read_window;
use crate::manifest::{NameResolver, SteamAppsStore};
use crate::monitor::{Monitor, MonitorOutcome, MonitorPlan, MonitorState};
use crate::report::TickReport;
use crate::session::parse_window;
use crate::ui::ConsoleReporter;
use crate::util::clock_local;

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub steam: Option<SteamLocation>,
    pub log_path: PathBuf,
    pub steamapps: PathBuf,
}

pub fn run(config: &MonitorConfig, args: &RunArgs) -> Result<MonitorOutcome> {
    let paths = resolve_paths(config, args)?;
    let settings = effective_settings(config, args);
    let stop = install_stop_signal()?;

    let log_path = (!args.no_log_file)
        .then(|| config.report_log_path())
        .flatten();
    let reporter = ConsoleReporter::stdout(log_path.as_deref());
    let resolver = NameResolver::new(SteamAppsStore::new(&paths.steamapps));
    let plan = MonitorPlan {
        log_path: paths.log_path,
        steam_root: paths.steam.map(|location| location.root),
        settings,
    };

    let mut monitor = Monitor::new(plan, resolver, reporter, stop);
    let outcome = monitor.run();
    info!(
        state = ?monitor.state(),
        checks = outcome.checks_run,
        "monitor stopped"
    );
    Ok(outcome)
}

pub fn print_status(config: &MonitorConfig, args: &RunArgs, json: bool) -> Result<()> {
    let paths = resolve_paths(config, args)?;
    let settings = effective_settings(config, args);
    let window = read_window(&paths.log_path, settings.window_lines)?;
    let missing = window.is_none();
    let snapshot = window
        .map(|lines| parse_window(&lines))
        .unwrap_or_default();
    let name = snapshot.item_id.as_deref().map(|item_id| {
        NameResolver::new(SteamAppsStore::new(&paths.steamapps)).resolve(item_id)
    });

    let mut report = TickReport::build(1, 1, clock_local(), &snapshot, name.as_deref());
    if missing {
        report = report.with_missing_log(paths.log_path.clone());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("steam-download-monitor status");
    if let Some(steam) = &paths.steam {
        println!("steam_root: {}", steam.root.display());
    }
    println!("content_log: {}", paths.log_path.display());
    for line in report.lines().iter().skip(3) {
        println!("{}", line.text);
    }
    Ok(())
}

pub fn doctor(config: &MonitorConfig, args: &RunArgs) -> Result<u8> {
    let mut issues = 0u8;

    println!("steam-download-monitor doctor");
    println!("config_path: {}", config::config_path().display());

    let override_path = args.steam_path.clone().or_else(|| config.steam_override());
    let steam = match config::locate_steam(override_path.as_deref()) {
        Ok(location) => {
            println!(
                "[OK] Steam found at {} ({}).",
                location.root.display(),
                source_label(location.source)
            );
            Some(location)
        }
        Err(err) => {
            if args.log_file.is_none() {
                issues += 1;
            }
            println!("[WARN] {err}");
            None
        }
    };

    let log_path = args
        .log_file
        .clone()
        .or_else(|| steam.as_ref().map(SteamLocation::content_log));
    match &log_path {
        Some(path) if path.is_file() => println!("[OK] Content log present: {}", path.display()),
        Some(path) => {
            issues += 1;
            println!(
                "[WARN] Content log not found: {} (start a download in Steam).",
                path.display()
            );
        }
        None => {
            issues += 1;
            println!("[WARN] No content log location could be determined.");
        }
    }

    if let Some(location) = &steam {
        let steamapps = location.steamapps();
        if steamapps.is_dir() {
            println!("[OK] steamapps directory present: {}", steamapps.display());
        } else {
            println!(
                "[INFO] steamapps directory missing: {} (game names will use placeholders).",
                steamapps.display()
            );
        }
    }

    match config.report_log_path() {
        Some(path) => println!("[INFO] Report log: {}", path.display()),
        None => println!("[INFO] Report log disabled."),
    }

    if issues == 0 {
        println!("Doctor: healthy");
        Ok(0)
    } else {
        println!("Doctor: {issues} issue(s) found");
        Ok(1)
    }
}

// Fails only when no content log location can be determined.
pub fn resolve_paths(config: &MonitorConfig, args: &RunArgs) -> Result<ResolvedPaths> {
    let override_path = args.steam_path.clone().or_else(|| config.steam_override());

    if let Some(log_path) = args.log_file.clone() {
        let steam = config::locate_steam(override_path.as_deref()).ok();
        let steamapps = steam
            .as_ref()
            .map(SteamLocation::steamapps)
            .or_else(|| {
                log_path
                    .parent()
                    .and_then(|logs| logs.parent())
                    .map(|root| root.join("steamapps"))
            })
            .unwrap_or_else(|| PathBuf::from("steamapps"));
        return Ok(ResolvedPaths {
            steam,
            log_path,
            steamapps,
        });
    }

    let location = config::locate_steam(override_path.as_deref())
        .context("cannot monitor downloads without a Steam installation")?;
    info!(
        root = %location.root.display(),
        source = source_label(location.source),
        "using Steam installation"
    );
    Ok(ResolvedPaths {
        log_path: location.content_log(),
        steamapps: location.steamapps(),
        steam: Some(location),
    })
}

pub fn effective_settings(config: &MonitorConfig, args: &RunArgs) -> RuntimeSettings {
    let mut settings = config::runtime_settings(config);
    if let Some(checks) = args.checks {
        settings.checks = checks;
    }
    if let Some(interval) = args.interval {
        settings.interval = Duration::from_secs(interval);
    }
    if let Some(window) = args.window {
        settings.window_lines = usize::try_from(window).unwrap_or(usize::MAX);
    }
    settings
}

fn source_label(source: LocationSource) -> &'static str {
    match source {
        LocationSource::Override => "configured",
        LocationSource::Primary => "discovered",
        LocationSource::Fallback => "fallback",
    }
}

fn install_stop_signal() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })
    .context("failed to install Ctrl+C handler")?;
    Ok(stop)
}

pub fn exit_code(outcome: &MonitorOutcome) -> u8 {
    match outcome.state {
        MonitorState::Cancelled => 130,
        _ => 0,
    }
}
