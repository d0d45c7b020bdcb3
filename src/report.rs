use std::path::PathBuf;

use serde::Serialize;

use crate::session::{DownloadProgress, DownloadStatus, SessionSnapshot};
use crate::util::{format_percent, format_rate, format_size, progress_bar};

const RULE_WIDTH: usize = 80;
const PROGRESS_BAR_WIDTH: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    Info,
    Warn,
    Error,
}

impl LineLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Rule,
    Heading,
    Field,
    Status(DownloadStatus),
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub level: LineLevel,
    pub kind: LineKind,
    pub text: String,
}

impl ReportLine {
    fn info(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            level: LineLevel::Info,
            kind,
            text: text.into(),
        }
    }

    fn field(label: &str, value: &str) -> Self {
        Self::info(LineKind::Field, format!("{label}: {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveDownload {
    pub item_id: String,
    pub name: String,
    pub status: DownloadStatus,
    pub rate_mbps: Option<f64>,
    pub progress: Option<DownloadProgress>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub check: u32,
    pub total_checks: u32,
    pub observed_at: String,
    pub missing_log: Option<PathBuf>,
    pub active: Option<ActiveDownload>,
}

impl TickReport {
    pub fn build(
        check: u32,
        total_checks: u32,
        observed_at: String,
        snapshot: &SessionSnapshot,
        name: Option<&str>,
    ) -> Self {
        let active = snapshot.item_id.as_ref().map(|item_id| ActiveDownload {
            item_id: item_id.clone(),
            name: name.map(ToString::to_string).unwrap_or_else(|| {
                crate::manifest::placeholder_name(item_id)
            }),
            status: snapshot.status,
            rate_mbps: snapshot.visible_rate(),
            progress: snapshot.progress,
        });
        Self {
            check,
            total_checks,
            observed_at,
            missing_log: None,
            active,
        }
    }

    pub fn with_missing_log(mut self, path: PathBuf) -> Self {
        self.missing_log = Some(path);
        self
    }

    pub fn lines(&self) -> Vec<ReportLine> {
        let rule = "=".repeat(RULE_WIDTH);
        let mut lines = vec![
            ReportLine::info(LineKind::Rule, rule.clone()),
            ReportLine::info(
                LineKind::Heading,
                format!(
                    "Check {}/{} - {}",
                    self.check, self.total_checks, self.observed_at
                ),
            ),
            ReportLine::info(LineKind::Rule, rule),
        ];

        if let Some(path) = &self.missing_log {
            lines.push(ReportLine {
                level: LineLevel::Warn,
                kind: LineKind::Notice,
                text: format!("Log file not found: {}", path.display()),
            });
        }

        let Some(active) = &self.active else {
            lines.push(ReportLine::info(LineKind::Notice, "No active downloads"));
            return lines;
        };

        lines.push(ReportLine::field("Game", &active.name));
        lines.push(ReportLine::field("AppID", &active.item_id));
        lines.push(ReportLine::info(
            LineKind::Status(active.status),
            format!("Status: {}", active.status.label()),
        ));
        if active.rate_mbps.is_some() {
            lines.push(ReportLine::field("Rate", &format_rate(active.rate_mbps)));
        }
        if let Some(progress) = &active.progress {
            let percent = progress.percent();
            lines.push(ReportLine::field(
                "Progress",
                &format!(
                    "{} [{}]",
                    format_percent(percent),
                    progress_bar(percent, PROGRESS_BAR_WIDTH)
                ),
            ));
            lines.push(ReportLine::field(
                "Downloaded",
                &format!(
                    "{} / {}",
                    format_size(Some(progress.downloaded_bytes)),
                    format_size(Some(progress.total_bytes))
                ),
            ));
        }
        lines
    }
}
