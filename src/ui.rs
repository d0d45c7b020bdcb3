use std::fs::{self, File, OpenOptions};
use std::io::{self, IsTerminal, Stdout, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossterm::style::{Color, Stylize};
use tracing::warn;

use crate::monitor::{MonitorOutcome, MonitorPlan, MonitorState, Reporter};
use crate::report::{LineKind, LineLevel, ReportLine, TickReport};
use crate::session::DownloadStatus;
use crate::util::{human_duration, now_local};

pub struct ConsoleReporter<W> {
    out: W,
    color: bool,
    file: Option<File>,
    file_path: Option<PathBuf>,
}

impl ConsoleReporter<Stdout> {
    pub fn stdout(log_path: Option<&Path>) -> Self {
        let out = io::stdout();
        let color = out.is_terminal();
        let mut reporter = Self::new(out, color, log_path.and_then(open_report_log));
        reporter.file_path = log_path.map(Path::to_path_buf);
        reporter
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, color: bool, file: Option<File>) -> Self {
        Self {
            out,
            color,
            file,
            file_path: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn emit(&mut self, line: &ReportLine) {
        let rendered = if self.color {
            styled(line)
        } else {
            line.text.clone()
        };
        let _ = writeln!(self.out, "{rendered}");
        if let Some(file) = self.file.as_mut()
            && let Err(err) = writeln!(
                file,
                "{} - {} - {}",
                now_local(),
                line.level.as_str(),
                line.text
            )
        {
            warn!(error = %err, "report log write failed; continuing on console only");
            self.file = None;
        }
    }

    fn emit_text(&mut self, level: LineLevel, text: impl Into<String>) {
        self.emit(&ReportLine {
            level,
            kind: LineKind::Notice,
            text: text.into(),
        });
    }

    fn flush(&mut self) {
        let _ = self.out.flush();
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn started(&mut self, plan: &MonitorPlan) {
        let settings = &plan.settings;
        self.emit_text(LineLevel::Info, "Starting Steam download monitor");
        if let Some(path) = self.file_path.clone().filter(|_| self.file.is_some()) {
            self.emit_text(LineLevel::Info, format!("Report log: {}", path.display()));
        }
        if let Some(root) = &plan.steam_root {
            self.emit_text(LineLevel::Info, format!("Steam folder: {}", root.display()));
        }
        self.emit_text(
            LineLevel::Info,
            format!("Content log: {}", plan.log_path.display()),
        );
        self.emit_text(LineLevel::Info, format!("Checks: {}", settings.checks));
        self.emit_text(
            LineLevel::Info,
            format!("Interval: {}", human_duration(settings.interval)),
        );
        if !plan.log_path.exists() {
            self.emit_text(LineLevel::Warn, "Content log not found yet.");
            self.emit_text(
                LineLevel::Warn,
                "Make sure Steam is running and a download has started.",
            );
        }
        self.flush();
    }

    fn report(&mut self, report: &TickReport) {
        for line in report.lines() {
            self.emit(&line);
        }
        self.flush();
    }

    fn countdown(&mut self, remaining: Duration) {
        self.emit_text(
            LineLevel::Info,
            format!("Next check in {}", human_duration(remaining)),
        );
        self.flush();
    }

    fn tick_failed(&mut self, check: u32, error: &anyhow::Error) {
        self.emit_text(LineLevel::Error, format!("Check {check} failed: {error:#}"));
        self.flush();
    }

    fn finished(&mut self, outcome: &MonitorOutcome) {
        self.emit_text(LineLevel::Info, "=".repeat(80));
        let (level, text) = match outcome.state {
            MonitorState::Cancelled => (
                LineLevel::Warn,
                format!(
                    "Monitoring interrupted by user after {}/{} checks",
                    outcome.checks_run, outcome.total_checks
                ),
            ),
            _ => (
                LineLevel::Info,
                format!(
                    "Monitoring finished ({}/{} checks)",
                    outcome.checks_run, outcome.total_checks
                ),
            ),
        };
        self.emit_text(level, text);
        self.flush();
    }
}

fn open_report_log(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(err) = fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), error = %err, "cannot create report log directory");
        return None;
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot open report log");
            None
        }
    }
}

fn styled(line: &ReportLine) -> String {
    let text = line.text.as_str();
    match (&line.kind, line.level) {
        (_, LineLevel::Error) => text.with(Color::Red).bold().to_string(),
        (_, LineLevel::Warn) => text.with(Color::Yellow).to_string(),
        (LineKind::Rule, _) => text.with(Color::DarkGrey).to_string(),
        (LineKind::Heading, _) => text.bold().to_string(),
        (LineKind::Status(status), _) => text.with(status_color(*status)).to_string(),
        _ => text.to_string(),
    }
}

fn status_color(status: DownloadStatus) -> Color {
    match status {
        DownloadStatus::Downloading => Color::Green,
        DownloadStatus::Paused => Color::Yellow,
        DownloadStatus::Verifying | DownloadStatus::Preallocating | DownloadStatus::Staging => {
            Color::Cyan
        }
        DownloadStatus::Unknown => Color::DarkGrey,
    }
}
