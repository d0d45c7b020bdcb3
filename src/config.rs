use std::env;
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(windows)]
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logtail::DEFAULT_WINDOW_LINES;

const CONFIG_SCHEMA_VERSION: u32 = 1;
const DEFAULT_CHECKS: u32 = 5;
const DEFAULT_INTERVAL_SECONDS: u64 = 60;
const SLEEP_SEGMENT: Duration = Duration::from_secs(10);
const REPORT_LOG_FILE: &str = "steam_monitor.log";
#[cfg(windows)]
const FALLBACK_STEAM_PATH: &str = "C:/Steam";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub schema_version: u32,
    pub steam_path: Option<String>,
    pub checks: u32,
    pub interval_seconds: u64,
    pub window_lines: usize,
    pub log_to_file: bool,
    pub report_log_path: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            steam_path: None,
            checks: DEFAULT_CHECKS,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            window_lines: DEFAULT_WINDOW_LINES,
            log_to_file: true,
            report_log_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub checks: u32,
    pub interval: Duration,
    pub window_lines: usize,
    pub sleep_segment: Duration,
}

impl MonitorConfig {
    pub fn load_or_init() -> Result<Self> {
        let cfg_path = config_path();
        if let Some(parent) = cfg_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }

        if cfg_path.exists() {
            let raw = fs::read_to_string(&cfg_path)
                .with_context(|| format!("failed to read {}", cfg_path.display()))?;
            let mut parsed: MonitorConfig = serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", cfg_path.display()))?;
            if parsed.normalize_and_migrate() {
                parsed.save()?;
            }
            Ok(parsed)
        } else {
            let cfg = MonitorConfig::default();
            cfg.save()?;
            Ok(cfg)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }

        let data = serde_json::to_string_pretty(self)?;
        fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Steam root requested by the operator, environment first.
    pub fn steam_override(&self) -> Option<PathBuf> {
        env::var("STEAM_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| self.steam_path.clone())
            .map(PathBuf::from)
    }

    pub fn report_log_path(&self) -> Option<PathBuf> {
        if !self.log_to_file {
            return None;
        }
        Some(
            self.report_log_path
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| monitor_home().join(REPORT_LOG_FILE)),
        )
    }

    fn normalize_and_migrate(&mut self) -> bool {
        let mut changed = false;

        if self.schema_version < CONFIG_SCHEMA_VERSION {
            self.schema_version = CONFIG_SCHEMA_VERSION;
            changed = true;
        }
        if self.checks == 0 {
            self.checks = DEFAULT_CHECKS;
            changed = true;
        }
        if self.interval_seconds == 0 {
            self.interval_seconds = DEFAULT_INTERVAL_SECONDS;
            changed = true;
        }
        if self.window_lines == 0 {
            self.window_lines = DEFAULT_WINDOW_LINES;
            changed = true;
        }
        for item in [&mut self.steam_path, &mut self.report_log_path] {
            if normalize_optional_string(item) {
                changed = true;
            }
        }

        changed
    }
}

pub fn runtime_settings(config: &MonitorConfig) -> RuntimeSettings {
    RuntimeSettings {
        checks: env_u64("STEAM_MONITOR_CHECKS", u64::from(config.checks))
            .try_into()
            .unwrap_or(u32::MAX),
        interval: Duration::from_secs(env_u64(
            "STEAM_MONITOR_INTERVAL_SECONDS",
            config.interval_seconds,
        )),
        window_lines: env_u64("STEAM_MONITOR_WINDOW_LINES", config.window_lines as u64)
            .try_into()
            .unwrap_or(usize::MAX),
        sleep_segment: SLEEP_SEGMENT,
    }
}

pub fn monitor_home() -> PathBuf {
    if let Ok(custom) = env::var("STEAM_MONITOR_HOME") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("steam-download-monitor")
}

pub fn config_path() -> PathBuf {
    monitor_home().join("config.json")
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("configured Steam path {} does not exist", .0.display())]
    OverrideMissing(PathBuf),
    #[error("Steam installation not found (searched: {searched}); make sure Steam is installed")]
    NotFound { searched: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    Override,
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteamLocation {
    pub root: PathBuf,
    pub source: LocationSource,
}

impl SteamLocation {
    pub fn content_log(&self) -> PathBuf {
        self.root.join("logs").join("content_log.txt")
    }

    pub fn steamapps(&self) -> PathBuf {
        self.root.join("steamapps")
    }
}

pub fn locate_steam(override_path: Option<&Path>) -> Result<SteamLocation, LocateError> {
    locate_steam_in(
        override_path,
        &primary_steam_candidates(),
        fallback_steam_path().as_deref(),
    )
}

fn locate_steam_in(
    override_path: Option<&Path>,
    primary: &[PathBuf],
    fallback: Option<&Path>,
) -> Result<SteamLocation, LocateError> {
    if let Some(path) = override_path {
        if path.is_dir() {
            return Ok(SteamLocation {
                root: path.to_path_buf(),
                source: LocationSource::Override,
            });
        }
        return Err(LocateError::OverrideMissing(path.to_path_buf()));
    }

    if let Some(root) = primary.iter().find(|path| path.is_dir()) {
        return Ok(SteamLocation {
            root: root.clone(),
            source: LocationSource::Primary,
        });
    }

    if let Some(root) = fallback.filter(|path| path.is_dir()) {
        return Ok(SteamLocation {
            root: root.to_path_buf(),
            source: LocationSource::Fallback,
        });
    }

    let searched = primary
        .iter()
        .map(PathBuf::as_path)
        .chain(fallback)
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>();
    Err(LocateError::NotFound {
        searched: if searched.is_empty() {
            "no candidate paths".to_string()
        } else {
            searched.join(", ")
        },
    })
}

#[cfg(windows)]
fn primary_steam_candidates() -> Vec<PathBuf> {
    registry_steam_path().into_iter().collect()
}

#[cfg(not(windows))]
fn primary_steam_candidates() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    vec![
        home.join(".steam").join("steam"),
        home.join(".local").join("share").join("Steam"),
        home.join(".var")
            .join("app")
            .join("com.valvesoftware.Steam")
            .join(".local")
            .join("share")
            .join("Steam"),
        home.join("Library")
            .join("Application Support")
            .join("Steam"),
    ]
}

#[cfg(windows)]
fn fallback_steam_path() -> Option<PathBuf> {
    Some(PathBuf::from(FALLBACK_STEAM_PATH))
}

#[cfg(not(windows))]
fn fallback_steam_path() -> Option<PathBuf> {
    None
}

#[cfg(windows)]
fn registry_steam_path() -> Option<PathBuf> {
    let output = Command::new("reg")
        .args(["query", r"HKCU\Software\Valve\Steam", "/v", "SteamPath"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        tracing::debug!("SteamPath registry value not found");
        return None;
    }
    parse_reg_query_value(&String::from_utf8_lossy(&output.stdout), "SteamPath")
        .and_then(|raw| existing_registry_path(&raw))
}

#[cfg(any(windows, test))]
fn existing_registry_path(raw: &str) -> Option<PathBuf> {
    let path = PathBuf::from(raw);
    if path.is_dir() {
        return Some(path);
    }
    tracing::debug!(raw, "registry SteamPath is not a directory");
    None
}

#[cfg(any(windows, test))]
fn parse_reg_query_value(output: &str, name: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        if parts.next()? != name {
            return None;
        }
        let rest = parts.next()?.trim_start();
        let value = rest.strip_prefix("REG_SZ")?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn normalize_optional_string(value: &mut Option<String>) -> bool {
    if let Some(item) = value.as_mut() {
        let trimmed = item.trim().to_string();
        if trimmed.is_empty() {
            *value = None;
            return true;
        }
        if *item != trimmed {
            *item = trimmed;
            return true;
        }
    }
    false
}
