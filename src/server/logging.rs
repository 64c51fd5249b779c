//! Usage metrics and JSONL access logging.

use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::patient::RiskLabel;

/// Maximum number of rotated access log files to keep.
const MAX_ACCESS_LOG_ROTATIONS: usize = 5;

/// One completed prediction, as recorded in counters and the access log.
pub struct RecordEvent<'a> {
    pub endpoint: &'a str,
    pub label: RiskLabel,
    pub probability: f64,
    pub converged: bool,
    pub processing_time_ms: u64,
}

pub struct UsageMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,

    pub high_risk: AtomicU64,
    pub low_risk: AtomicU64,
    pub not_converged: AtomicU64,

    pub ep_form: AtomicU64,
    pub ep_predict: AtomicU64,
    pub ep_dataset: AtomicU64,
    pub ep_stats: AtomicU64,

    access_log: std::sync::Mutex<Option<File>>,
    access_log_path: String,
    access_log_bytes: AtomicU64,
    max_access_log_bytes: u64,
}

impl UsageMetrics {
    pub fn new(access_log_path: &str, max_access_log_bytes: u64) -> Self {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(access_log_path)
            .ok();
        if file.is_none() {
            warn!(path = access_log_path, "could not open access log");
        }
        let current_size = std::fs::metadata(access_log_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Self {
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            high_risk: AtomicU64::new(0),
            low_risk: AtomicU64::new(0),
            not_converged: AtomicU64::new(0),
            ep_form: AtomicU64::new(0),
            ep_predict: AtomicU64::new(0),
            ep_dataset: AtomicU64::new(0),
            ep_stats: AtomicU64::new(0),
            access_log: std::sync::Mutex::new(file),
            access_log_path: access_log_path.to_string(),
            access_log_bytes: AtomicU64::new(current_size),
            max_access_log_bytes,
        }
    }

    pub fn record(&self, event: &RecordEvent<'_>) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match event.label {
            RiskLabel::Disease => self.high_risk.fetch_add(1, Ordering::Relaxed),
            RiskLabel::NoDisease => self.low_risk.fetch_add(1, Ordering::Relaxed),
        };
        if !event.converged {
            self.not_converged.fetch_add(1, Ordering::Relaxed);
        }

        // Vitals are deliberately left out of the access log.
        let entry = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "endpoint": event.endpoint,
            "label": event.label.index(),
            "probability": event.probability,
            "converged": event.converged,
            "processing_time_ms": event.processing_time_ms,
        });
        self.append_line(entry.to_string());
    }

    pub fn record_error(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn append_line(&self, mut line: String) {
        let Ok(mut guard) = self.access_log.try_lock() else {
            return;
        };
        let Some(ref mut file) = *guard else {
            return;
        };

        line.push('\n');
        let line_len = line.len() as u64;
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!(error = %e, "failed to write access log entry");
        }
        let new_size = self.access_log_bytes.fetch_add(line_len, Ordering::Relaxed) + line_len;

        // Rotate if over size limit (0 = no limit)
        if self.max_access_log_bytes > 0 && new_size >= self.max_access_log_bytes {
            for i in (1..MAX_ACCESS_LOG_ROTATIONS).rev() {
                let from = format!("{}.{}", self.access_log_path, i);
                let to = format!("{}.{}", self.access_log_path, i + 1);
                if std::path::Path::new(&from).exists() {
                    if let Err(e) = std::fs::rename(&from, &to) {
                        warn!(from = %from, to = %to, error = %e, "log rotation rename failed");
                    }
                }
            }
            let rotated = format!("{}.1", self.access_log_path);
            if let Err(e) = std::fs::rename(&self.access_log_path, &rotated) {
                warn!(from = %self.access_log_path, to = %rotated, error = %e, "log rotation rename failed");
            }
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.access_log_path)
            {
                Ok(new_file) => {
                    *file = new_file;
                    self.access_log_bytes.store(0, Ordering::Relaxed);
                }
                Err(e) => warn!(path = %self.access_log_path, error = %e, "could not reopen access log"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(label: RiskLabel, converged: bool) -> RecordEvent<'static> {
        RecordEvent {
            endpoint: "predict",
            label,
            probability: 0.7,
            converged,
            processing_time_ms: 3,
        }
    }

    #[test]
    fn test_counters() {
        let tmpdir = tempfile::tempdir().expect("failed to create temp dir");
        let log = tmpdir.path().join("access.jsonl");
        let metrics = UsageMetrics::new(log.to_str().unwrap(), 0);

        metrics.record(&event(RiskLabel::Disease, true));
        metrics.record(&event(RiskLabel::NoDisease, false));
        metrics.record_error();

        assert_eq!(metrics.total_requests.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.total_errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.high_risk.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.low_risk.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.not_converged.load(Ordering::Relaxed), 1);

        let content = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["endpoint"], "predict");
        assert_eq!(first["label"], 1);
    }

    #[test]
    fn test_access_log_rotates_at_size_limit() {
        let tmpdir = tempfile::tempdir().expect("failed to create temp dir");
        let log = tmpdir.path().join("access.jsonl");
        let metrics = UsageMetrics::new(log.to_str().unwrap(), 10);

        metrics.record(&event(RiskLabel::Disease, true));
        assert!(tmpdir.path().join("access.jsonl.1").exists());
        assert_eq!(std::fs::metadata(&log).unwrap().len(), 0);
    }
}
