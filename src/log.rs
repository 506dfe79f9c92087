use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::TransferError;
use crate::metrics::TransferRecord;

pub const CSV_HEADER: [&str; 4] = ["Time", "Bytes Transferred", "Throughput (KB/s)", "CPU (%)"];

/// Completed transfers in completion order. Only the session controller appends.
#[derive(Clone, Debug, Default)]
pub struct TransferLog {
    records: Vec<TransferRecord>,
}

impl TransferLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TransferRecord) {
        self.records.push(record);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TransferRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TransferRecord> {
        self.records.last()
    }

    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.byte_count()).sum()
    }

    /// Write the log as CSV: header row, then one row per record.
    pub fn write_csv<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "{}", CSV_HEADER.map(csv_field).join(","))?;
        for r in &self.records {
            writeln!(
                w,
                "{},{},{},{}",
                r.time_label(),
                r.byte_count(),
                format_real(r.throughput_kbps()),
                format_real(f64::from(r.cpu_percent())),
            )?;
        }
        w.flush()
    }

    /// Export to `path`, returning the number of data rows written.
    pub fn export_csv(&self, path: &Path) -> Result<usize, TransferError> {
        if self.is_empty() {
            return Err(TransferError::InvalidInput(
                "no transfer data to export".to_string(),
            ));
        }
        let file = File::create(path).map_err(|e| TransferError::filesystem(path, e))?;
        self.write_csv(BufWriter::new(file))
            .map_err(|e| TransferError::filesystem(path, e))?;
        Ok(self.len())
    }
}

/// Two decimals with trailing zeros dropped, keeping one (`10.0`, `1.25`).
/// Always plain decimal notation, never exponent form.
pub fn format_real(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    let mut s = format!("{:.2}", v);
    while s.ends_with('0') && !s.ends_with(".0") {
        s.pop();
    }
    s
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
