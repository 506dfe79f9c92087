//! Terminal spinner for headless transfers

use crossterm::style::{Color, Stylize};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

use crate::log::format_real;
use crate::metrics::TransferRecord;

pub struct TransferSpinner {
    spinner: ProgressBar,
    start_time: Instant,
}

impl TransferSpinner {
    pub fn new(msg: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(msg.to_string());
        Self {
            spinner,
            start_time: Instant::now(),
        }
    }

    /// Hidden spinner, for `--json` and non-interactive output
    pub fn hidden() -> Self {
        Self {
            spinner: ProgressBar::hidden(),
            start_time: Instant::now(),
        }
    }

    pub fn finish_success(&self, record: &TransferRecord) {
        self.spinner.finish_with_message(format!(
            "{} {} bytes in {:.1}s ({} KB/s, CPU {}%)",
            "Completed".with(Color::Green).bold(),
            record.byte_count(),
            self.start_time.elapsed().as_secs_f64(),
            format_real(record.throughput_kbps()),
            format_real(f64::from(record.cpu_percent())),
        ));
    }

    pub fn finish_error(&self, msg: &str) {
        self.spinner
            .finish_with_message(format!("{} {}", "Failed".with(Color::Red).bold(), msg));
    }
}
