use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::RuntimeSettings;
use crate::logtail::read_window;
use crate::manifest::{MetadataStore, NameResolver};
use crate::report::TickReport;
use crate::session::parse_window;
use crate::util::clock_local;

const COUNTDOWN_STEP_SECS: u64 = 30;
const COUNTDOWN_TAIL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOutcome {
    pub state: MonitorState,
    pub checks_run: u32,
    pub total_checks: u32,
}

#[derive(Debug, Clone)]
pub struct MonitorPlan {
    pub log_path: PathBuf,
    pub steam_root: Option<PathBuf>,
    pub settings: RuntimeSettings,
}

pub trait Reporter {
    fn started(&mut self, plan: &MonitorPlan);
    fn report(&mut self, report: &TickReport);
    fn countdown(&mut self, remaining: Duration);
    fn tick_failed(&mut self, check: u32, error: &anyhow::Error);
    fn finished(&mut self, outcome: &MonitorOutcome);
}

pub struct Monitor<S, R> {
    plan: MonitorPlan,
    resolver: NameResolver<S>,
    reporter: R,
    stop: Arc<AtomicBool>,
    state: MonitorState,
    last_item_id: Option<String>,
    last_name: Option<String>,
}

impl<S: MetadataStore, R: Reporter> Monitor<S, R> {
    pub fn new(
        plan: MonitorPlan,
        resolver: NameResolver<S>,
        reporter: R,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            plan,
            resolver,
            reporter,
            stop,
            state: MonitorState::Idle,
            last_item_id: None,
            last_name: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    #[cfg(test)]
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn run(&mut self) -> MonitorOutcome {
        self.state = MonitorState::Running;
        self.reporter.started(&self.plan);

        let total = self.plan.settings.checks;
        let mut checks_run = 0;

        for check in 1..=total {
            if self.stop_requested() {
                return self.finish(MonitorState::Cancelled, checks_run);
            }

            match self.tick(check) {
                Ok(Some(report)) => {
                    self.reporter.report(&report);
                    checks_run += 1;
                }
                Ok(None) => return self.finish(MonitorState::Cancelled, checks_run),
                Err(err) => {
                    warn!(check, error = %err, "check failed");
                    self.reporter.tick_failed(check, &err);
                    checks_run += 1;
                }
            }

            if check < total && !self.pause(self.plan.settings.interval) {
                return self.finish(MonitorState::Cancelled, checks_run);
            }
        }

        self.finish(MonitorState::Completed, checks_run)
    }

    // `None` means a stop arrived before the report could be shown.
    pub fn tick(&mut self, check: u32) -> Result<Option<TickReport>> {
        let window = read_window(&self.plan.log_path, self.plan.settings.window_lines)?;
        let missing = window.is_none();
        let snapshot = match window {
            Some(lines) => parse_window(&lines),
            None => {
                debug!(path = %self.plan.log_path.display(), "content log not found");
                Default::default()
            }
        };

        debug!(
            check,
            active = snapshot.is_active(),
            status = snapshot.status.label(),
            "parsed content log window"
        );

        if let Some(item_id) = snapshot.item_id.as_deref()
            && self.last_item_id.as_deref() != Some(item_id)
        {
            self.last_name = Some(self.resolver.resolve(item_id));
            self.last_item_id = Some(item_id.to_string());
        }

        if self.stop_requested() {
            return Ok(None);
        }

        let mut report = TickReport::build(
            check,
            self.plan.settings.checks,
            clock_local(),
            &snapshot,
            self.last_name.as_deref(),
        );
        if missing {
            report = report.with_missing_log(self.plan.log_path.clone());
        }
        Ok(Some(report))
    }

    fn pause(&mut self, duration: Duration) -> bool {
        let segment = self.plan.settings.sleep_segment.max(Duration::from_millis(1));
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.stop_requested() {
                return false;
            }
            if should_announce(remaining, duration) {
                self.reporter.countdown(remaining);
            }
            let step = remaining.min(segment);
            thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        !self.stop_requested()
    }

    fn finish(&mut self, state: MonitorState, checks_run: u32) -> MonitorOutcome {
        self.state = state;
        let outcome = MonitorOutcome {
            state,
            checks_run,
            total_checks: self.plan.settings.checks,
        };
        self.reporter.finished(&outcome);
        outcome
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

fn should_announce(remaining: Duration, total: Duration) -> bool {
    remaining == total
        || remaining <= COUNTDOWN_TAIL
        || (remaining.subsec_nanos() == 0 && remaining.as_secs() % COUNTDOWN_STEP_SECS == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestError;
    use crate::session::DownloadStatus;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Instant;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingReporter {
        reports: Vec<TickReport>,
        countdowns: Vec<Duration>,
        failures: Vec<u32>,
        outcome: Option<MonitorOutcome>,
        started: bool,
    }

    impl Reporter for RecordingReporter {
        fn started(&mut self, _plan: &MonitorPlan) {
            self.started = true;
        }

        fn report(&mut self, report: &TickReport) {
            self.reports.push(report.clone());
        }

        fn countdown(&mut self, remaining: Duration) {
            self.countdowns.push(remaining);
        }

        fn tick_failed(&mut self, check: u32, _error: &anyhow::Error) {
            self.failures.push(check);
        }

        fn finished(&mut self, outcome: &MonitorOutcome) {
            self.outcome = Some(*outcome);
        }
    }

    struct FixedStore {
        calls: Rc<Cell<usize>>,
    }

    impl MetadataStore for FixedStore {
        fn read_record(&self, _item_id: &str) -> Result<String, ManifestError> {
            self.calls.set(self.calls.get() + 1);
            Ok("\"name\"  \"Half-Life\"".to_string())
        }
    }

    fn plan(log_path: PathBuf, checks: u32, interval: Duration) -> MonitorPlan {
        MonitorPlan {
            log_path,
            steam_root: None,
            settings: RuntimeSettings {
                checks,
                interval,
                window_lines: 50,
                sleep_segment: Duration::from_millis(5),
            },
        }
    }

    fn monitor(
        plan: MonitorPlan,
        stop: Arc<AtomicBool>,
    ) -> (Monitor<FixedStore, RecordingReporter>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let store = FixedStore {
            calls: Rc::clone(&calls),
        };
        let monitor = Monitor::new(
            plan,
            NameResolver::new(store),
            RecordingReporter::default(),
            stop,
        );
        (monitor, calls)
    }

    fn write_log(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("content_log.txt");
        std::fs::write(&path, content).expect("write log");
        path
    }

    #[test]
    fn completes_after_configured_checks() {
        let tmp = TempDir::new().expect("temp dir");
        let log = write_log(
            &tmp,
            "AppID 42\nApp update changed : Downloading\nCurrent download rate: 12.50 Mbps\n",
        );
        let (mut monitor, calls) = monitor(
            plan(log, 3, Duration::from_millis(10)),
            Arc::new(AtomicBool::new(false)),
        );

        let outcome = monitor.run();

        assert_eq!(outcome.state, MonitorState::Completed);
        assert_eq!(outcome.checks_run, 3);
        assert_eq!(monitor.state(), MonitorState::Completed);
        let reporter = monitor.reporter();
        assert!(reporter.started);
        assert_eq!(reporter.reports.len(), 3);
        assert_eq!(reporter.outcome, Some(outcome));
        let active = reporter.reports[2].active.as_ref().expect("active");
        assert_eq!(active.name, "Half-Life");
        assert_eq!(active.status, DownloadStatus::Downloading);
        assert_eq!(active.rate_mbps, Some(12.5));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn name_is_resolved_again_only_when_identifier_changes() {
        let tmp = TempDir::new().expect("temp dir");
        let log = write_log(&tmp, "AppID 1\n");
        let (mut monitor, calls) = monitor(
            plan(log.clone(), 5, Duration::ZERO),
            Arc::new(AtomicBool::new(false)),
        );

        monitor.tick(1).expect("tick").expect("report");
        monitor.tick(2).expect("tick").expect("report");
        assert_eq!(calls.get(), 1);

        std::fs::write(&log, "AppID 1\nAppID 2\n").expect("rewrite");
        monitor.tick(3).expect("tick").expect("report");
        assert_eq!(calls.get(), 2);

        std::fs::write(&log, "unrelated\n").expect("rewrite");
        let report = monitor.tick(4).expect("tick").expect("report");
        assert!(report.active.is_none());

        std::fs::write(&log, "AppID 2\n").expect("rewrite");
        monitor.tick(5).expect("tick").expect("report");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn missing_log_degrades_to_no_session() {
        let tmp = TempDir::new().expect("temp dir");
        let log = tmp.path().join("logs").join("content_log.txt");
        let (mut monitor, _calls) = monitor(
            plan(log.clone(), 1, Duration::ZERO),
            Arc::new(AtomicBool::new(false)),
        );

        let outcome = monitor.run();
        assert_eq!(outcome.state, MonitorState::Completed);
        let report = &monitor.reporter().reports[0];
        assert_eq!(report.missing_log.as_ref(), Some(&log));
        assert!(report.active.is_none());
    }

    #[test]
    fn failing_tick_is_reported_and_loop_continues() {
        let tmp = TempDir::new().expect("temp dir");
        // A directory where the log should be cannot be read as a file.
        let log = tmp.path().join("content_log.txt");
        std::fs::create_dir_all(&log).expect("mkdir");
        let interval = Duration::from_millis(40);
        let (mut monitor, _calls) = monitor(
            plan(log, 2, interval),
            Arc::new(AtomicBool::new(false)),
        );

        let started = Instant::now();
        let outcome = monitor.run();

        assert_eq!(outcome.state, MonitorState::Completed);
        assert_eq!(outcome.checks_run, 2);
        assert_eq!(monitor.reporter().failures, vec![1, 2]);
        assert!(monitor.reporter().reports.is_empty());
        // The failed first check still waits a full interval before retrying.
        assert!(started.elapsed() >= interval);
        assert_eq!(monitor.reporter().countdowns.first(), Some(&interval));
    }

    #[test]
    fn stop_before_start_cancels_without_reports() {
        let tmp = TempDir::new().expect("temp dir");
        let log = write_log(&tmp, "AppID 42\n");
        let (mut monitor, _calls) = monitor(
            plan(log, 3, Duration::from_millis(10)),
            Arc::new(AtomicBool::new(true)),
        );

        let outcome = monitor.run();
        assert_eq!(outcome.state, MonitorState::Cancelled);
        assert_eq!(outcome.checks_run, 0);
        assert!(monitor.reporter().reports.is_empty());
    }

    #[test]
    fn cancelled_tick_is_not_rendered() {
        let tmp = TempDir::new().expect("temp dir");
        let log = write_log(&tmp, "AppID 42\n");
        let stop = Arc::new(AtomicBool::new(false));
        let (mut monitor, _calls) = monitor(plan(log, 1, Duration::ZERO), Arc::clone(&stop));

        stop.store(true, Ordering::Relaxed);
        assert!(monitor.tick(1).expect("tick").is_none());
    }

    #[test]
    fn interrupt_during_sleep_stops_within_one_segment() {
        let tmp = TempDir::new().expect("temp dir");
        let log = write_log(&tmp, "AppID 42\n");
        let stop = Arc::new(AtomicBool::new(false));
        let (mut monitor, _calls) =
            monitor(plan(log, 3, Duration::from_secs(30)), Arc::clone(&stop));

        let trigger = Arc::clone(&stop);
        let interrupter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.store(true, Ordering::Relaxed);
        });

        let started = Instant::now();
        let outcome = monitor.run();
        interrupter.join().expect("join interrupter");

        assert_eq!(outcome.state, MonitorState::Cancelled);
        assert_eq!(outcome.checks_run, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(monitor.reporter().reports.len(), 1);
        assert_eq!(
            monitor.reporter().countdowns.first(),
            Some(&Duration::from_secs(30))
        );
    }

    #[test]
    fn countdown_announces_half_minutes_and_tail() {
        let total = Duration::from_secs(60);
        assert!(should_announce(total, total));
        assert!(should_announce(Duration::from_secs(30), total));
        assert!(!should_announce(Duration::from_secs(50), total));
        assert!(should_announce(Duration::from_secs(10), total));
        assert!(should_announce(Duration::from_secs(3), total));
    }
}
