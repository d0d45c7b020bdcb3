use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const STATUS_CHANGE_MARKER: &str = "App update changed";
const UPDATE_STARTED_MARKER: &str = "update started";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    #[default]
    Unknown,
    Downloading,
    Paused,
    Verifying,
    Preallocating,
    Staging,
}

impl DownloadStatus {
    // First keyword present wins.
    const KEYWORDS: [(&'static str, DownloadStatus); 5] = [
        ("Downloading", DownloadStatus::Downloading),
        ("Paused", DownloadStatus::Paused),
        ("Verifying", DownloadStatus::Verifying),
        ("Preallocating", DownloadStatus::Preallocating),
        ("Staging", DownloadStatus::Staging),
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Verifying => "verifying files",
            Self::Preallocating => "preallocating disk space",
            Self::Staging => "staging",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

impl DownloadProgress {
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.downloaded_bytes as f64 / self.total_bytes as f64) * 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionSnapshot {
    pub item_id: Option<String>,
    pub status: DownloadStatus,
    pub rate_mbps: Option<f64>,
    pub progress: Option<DownloadProgress>,
}

impl SessionSnapshot {
    pub fn is_active(&self) -> bool {
        self.item_id.is_some()
    }

    pub fn visible_rate(&self) -> Option<f64> {
        match self.status {
            DownloadStatus::Downloading => self.rate_mbps,
            _ => None,
        }
    }
}

/// Scans newest to oldest; every field keeps the first value it sees.
pub fn parse_window<S: AsRef<str>>(lines: &[S]) -> SessionSnapshot {
    let mut accumulator = SnapshotAccumulator::default();
    for line in lines.iter().rev() {
        accumulator.observe(line.as_ref());
    }
    accumulator.finish()
}

#[derive(Debug, Default)]
struct SnapshotAccumulator {
    item_id: Option<String>,
    status: Option<DownloadStatus>,
    rate_mbps: Option<f64>,
    progress: Option<DownloadProgress>,
}

impl SnapshotAccumulator {
    fn observe(&mut self, line: &str) {
        if self.item_id.is_none() {
            self.item_id = match_app_id(line).map(ToString::to_string);
        }

        if self.rate_mbps.is_none() {
            self.rate_mbps = match_download_rate(line);
        }

        if self.status.is_none() {
            self.status = match_status_change(line);
        }

        // A size record only counts once the session it belongs to is known.
        if self.progress.is_none() && self.item_id.is_some() {
            self.progress = match_update_started(line);
        }
    }

    fn finish(self) -> SessionSnapshot {
        SessionSnapshot {
            item_id: self.item_id,
            status: self.status.unwrap_or_default(),
            rate_mbps: self.rate_mbps,
            progress: self.progress,
        }
    }
}

pub fn match_app_id(line: &str) -> Option<&str> {
    static APP_ID_RE: OnceLock<Regex> = OnceLock::new();
    let re = APP_ID_RE.get_or_init(|| Regex::new(r"AppID\s+(\d+)").expect("app id regex"));
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn match_download_rate(line: &str) -> Option<f64> {
    static RATE_RE: OnceLock<Regex> = OnceLock::new();
    let re = RATE_RE.get_or_init(|| {
        Regex::new(r"Current download rate:\s+([\d.]+)\s+Mbps").expect("download rate regex")
    });
    let raw = re.captures(line)?.get(1)?.as_str();
    raw.parse::<f64>().ok().filter(|rate| rate.is_finite())
}

pub fn match_status_change(line: &str) -> Option<DownloadStatus> {
    if !line.contains(STATUS_CHANGE_MARKER) {
        return None;
    }
    DownloadStatus::KEYWORDS
        .iter()
        .find(|(keyword, _)| line.contains(keyword))
        .map(|(_, status)| *status)
}

pub fn match_update_started(line: &str) -> Option<DownloadProgress> {
    static SIZE_PAIR_RE: OnceLock<Regex> = OnceLock::new();
    if !line.contains(UPDATE_STARTED_MARKER) {
        return None;
    }
    let re = SIZE_PAIR_RE
        .get_or_init(|| Regex::new(r"download\s+(\d+)/(\d+)").expect("size pair regex"));
    let caps = re.captures(line)?;
    let downloaded_bytes = caps.get(1)?.as_str().parse::<u64>().ok()?;
    let total_bytes = caps.get(2)?.as_str().parse::<u64>().ok()?;
    if total_bytes == 0 {
        return None;
    }
    Some(DownloadProgress {
        downloaded_bytes,
        total_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_end_to_end_window() {
        let snapshot = parse_window(&[
            "update started : download 1000/2000",
            "AppID 42",
            "App update changed : Downloading",
            "Current download rate: 12.50 Mbps",
        ]);

        assert_eq!(snapshot.item_id.as_deref(), Some("42"));
        assert_eq!(snapshot.status, DownloadStatus::Downloading);
        assert_eq!(snapshot.rate_mbps, Some(12.5));
        assert_eq!(
            snapshot.progress,
            Some(DownloadProgress {
                downloaded_bytes: 1000,
                total_bytes: 2000,
            })
        );
        assert_eq!(snapshot.visible_rate(), Some(12.5));
    }

    #[test]
    fn empty_window_yields_default_snapshot() {
        let lines: [&str; 0] = [];
        let snapshot = parse_window(&lines);
        assert_eq!(snapshot, SessionSnapshot::default());
        assert!(!snapshot.is_active());
    }

    #[test]
    fn latest_phase_change_wins() {
        let snapshot = parse_window(&[
            "AppID 10 App update changed : Running Update,Downloading,",
            "AppID 10 App update changed : Paused",
            "noise",
            "AppID 10 App update changed : Running Update,Verifying,",
            "unrelated line",
        ]);
        assert_eq!(snapshot.status, DownloadStatus::Verifying);
    }

    #[test]
    fn same_phase_repeated_still_resolves() {
        let snapshot = parse_window(&[
            "App update changed : Paused",
            "App update changed : Paused",
        ]);
        assert_eq!(snapshot.status, DownloadStatus::Paused);
    }

    #[test]
    fn phase_change_without_keyword_falls_through_to_older_line() {
        let snapshot = parse_window(&[
            "App update changed : Staging",
            "App update changed : Reconfiguring",
        ]);
        assert_eq!(snapshot.status, DownloadStatus::Staging);
    }

    #[test]
    fn latest_identifier_and_rate_win() {
        let snapshot = parse_window(&[
            "AppID 100",
            "Current download rate: 5.00 Mbps",
            "AppID 200",
            "Current download rate: 80.25 Mbps",
        ]);
        assert_eq!(snapshot.item_id.as_deref(), Some("200"));
        assert_eq!(snapshot.rate_mbps, Some(80.25));
    }

    #[test]
    fn progress_requires_identifier() {
        let snapshot = parse_window(&[
            "update started : download 10/20",
            "App update changed : Downloading",
        ]);
        assert_eq!(snapshot.item_id, None);
        assert_eq!(snapshot.progress, None);
    }

    #[test]
    fn size_line_newer_than_identifier_is_dropped() {
        let snapshot = parse_window(&["AppID 7", "update started : download 10/20"]);
        assert_eq!(snapshot.item_id.as_deref(), Some("7"));
        assert_eq!(snapshot.progress, None);
    }

    #[test]
    fn identifier_and_size_on_same_line_resolve_together() {
        let snapshot = parse_window(&["AppID 570 update started : download 0/24012859376"]);
        assert_eq!(snapshot.item_id.as_deref(), Some("570"));
        assert_eq!(
            snapshot.progress,
            Some(DownloadProgress {
                downloaded_bytes: 0,
                total_bytes: 24_012_859_376,
            })
        );
    }

    #[test]
    fn zero_total_never_populates_progress() {
        let snapshot = parse_window(&["update started : download 500/0", "AppID 9"]);
        assert_eq!(snapshot.progress, None);
        assert_eq!(match_update_started("update started : download 0/0"), None);
    }

    #[test]
    fn zero_total_falls_back_to_older_size_record() {
        let snapshot = parse_window(&[
            "update started : download 1/4",
            "update started : download 500/0",
            "AppID 9",
        ]);
        assert_eq!(
            snapshot.progress,
            Some(DownloadProgress {
                downloaded_bytes: 1,
                total_bytes: 4,
            })
        );

        let snapshot = parse_window(&[
            "AppID 9 update started : download 1/4",
            "update started : download 500/0",
        ]);
        assert_eq!(
            snapshot.progress,
            Some(DownloadProgress {
                downloaded_bytes: 1,
                total_bytes: 4,
            })
        );
    }

    #[test]
    fn newest_size_record_is_kept() {
        let snapshot = parse_window(&[
            "update started : download 1/4",
            "update started : download 3/4",
            "AppID 5",
        ]);
        assert_eq!(
            snapshot.progress,
            Some(DownloadProgress {
                downloaded_bytes: 3,
                total_bytes: 4,
            })
        );
    }

    #[test]
    fn malformed_rate_skips_only_that_match() {
        let snapshot = parse_window(&[
            "Current download rate: 3.50 Mbps",
            "AppID 11",
            "Current download rate: 1.2.3 Mbps",
        ]);
        assert_eq!(snapshot.item_id.as_deref(), Some("11"));
        assert_eq!(snapshot.rate_mbps, Some(3.5));
    }

    #[test]
    fn oversized_byte_counts_are_skipped() {
        assert_eq!(
            match_update_started("update started : download 1/99999999999999999999999"),
            None
        );
    }

    #[test]
    fn rate_hidden_unless_downloading() {
        let snapshot = parse_window(&[
            "AppID 3",
            "Current download rate: 40.00 Mbps",
            "App update changed : Paused",
        ]);
        assert_eq!(snapshot.rate_mbps, Some(40.0));
        assert_eq!(snapshot.status, DownloadStatus::Paused);
        assert_eq!(snapshot.visible_rate(), None);
    }

    #[test]
    fn status_keyword_order_prefers_downloading() {
        assert_eq!(
            match_status_change("App update changed : Running Update,Downloading,Staging,"),
            Some(DownloadStatus::Downloading)
        );
        assert_eq!(match_status_change("Downloading without marker"), None);
    }

    #[test]
    fn progress_percent_uses_total() {
        let progress = DownloadProgress {
            downloaded_bytes: 1000,
            total_bytes: 2000,
        };
        assert_eq!(progress.percent(), 50.0);
    }
}
