use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use crate::dispatch::Scan;
use crate::error::HistoryError;

/// One dispatched scan as the host keeps it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub scanned_at: DateTime<Local>,
    pub value: String,
    pub profile: String,
    pub completion: String,
    pub duration_ms: u64,
    pub mean_gap_ms: f64,
    pub gap_jitter_ms: f64,
}

impl ScanRecord {
    pub fn from_scan(scan: &Scan, scanned_at: DateTime<Local>) -> Self {
        Self {
            scanned_at,
            value: scan.value.clone(),
            profile: scan.profile.to_string(),
            completion: scan.completion.to_string(),
            duration_ms: scan.duration().as_millis() as u64,
            mean_gap_ms: scan.gaps.mean_ms,
            gap_jitter_ms: scan.gaps.jitter_ms,
        }
    }
}

/// Most recent scans, newest last, bounded to `capacity` entries.
#[derive(Debug, Clone)]
pub struct ScanHistory {
    records: VecDeque<ScanRecord>,
    capacity: usize,
}

impl Default for ScanHistory {
    fn default() -> Self {
        Self::with_capacity(500)
    }
}

impl ScanHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, scan: &Scan) {
        self.push(ScanRecord::from_scan(scan, Local::now()));
    }

    pub fn push(&mut self, record: ScanRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn records(&self) -> &VecDeque<ScanRecord> {
        &self.records
    }

    pub fn latest(&self) -> Option<&ScanRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes every record to `path` as CSV with a header row.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<usize, HistoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(self.records.len())
    }
}
