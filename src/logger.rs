use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::metrics::TransferRecord;
use crate::runner::Role;

pub trait Logger: Send + Sync {
    fn start(&self, _role: Role, _target: &str) {}
    fn completed(&self, _record: &TransferRecord, _seconds: f64) {}
    fn failed(&self, _role: Role, _msg: &str) {}
    fn cleared(&self, _records: usize) {}
    fn exported(&self, _path: &Path, _rows: usize) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn start(&self, role: Role, target: &str) {
        self.line(&format!("START role={} target={}", role, target));
    }
    fn completed(&self, record: &TransferRecord, seconds: f64) {
        self.line(&format!(
            "DONE role={} bytes={} seconds={:.3} kbps={:.2} cpu={:.2}",
            record.role(),
            record.byte_count(),
            seconds,
            record.throughput_kbps(),
            record.cpu_percent()
        ));
    }
    fn failed(&self, role: Role, msg: &str) {
        self.line(&format!("ERROR role={} msg={}", role, msg));
    }
    fn cleared(&self, records: usize) {
        self.line(&format!("CLEAR records={records}"));
    }
    fn exported(&self, path: &Path, rows: usize) {
        self.line(&format!("EXPORT path={} rows={}", path.display(), rows));
    }
}

/// Pick the logger once at startup; an unopenable log file falls back to no logging.
pub fn open_logger(path: Option<&Path>) -> Arc<dyn Logger> {
    match path {
        Some(p) => match TextLogger::new(p) {
            Ok(l) => Arc::new(l),
            Err(_) => Arc::new(NoopLogger),
        },
        None => Arc::new(NoopLogger),
    }
}
