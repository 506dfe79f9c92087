//! Throughput and CPU metrics for completed transfers.

use std::time::Instant;

use chrono::{Local, NaiveTime};
use serde::Serialize;
use sysinfo::System;

use crate::runner::Role;

/// Floor applied to elapsed seconds so instant transfers still give a finite rate.
pub const ELAPSED_EPSILON_SECS: f64 = 0.001;

/// One completed transfer. Built only by the recorder or `TransferRecord::new`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransferRecord {
    role: Role,
    #[serde(serialize_with = "serialize_hms")]
    timestamp: NaiveTime,
    byte_count: u64,
    throughput_kbps: f64,
    cpu_percent: f32,
}

impl TransferRecord {
    pub fn new(
        role: Role,
        timestamp: NaiveTime,
        byte_count: u64,
        throughput_kbps: f64,
        cpu_percent: f32,
    ) -> Self {
        Self {
            role,
            timestamp,
            byte_count,
            throughput_kbps,
            cpu_percent: cpu_percent.clamp(0.0, 100.0),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn timestamp(&self) -> NaiveTime {
        self.timestamp
    }

    /// `HH:MM:SS`
    pub fn time_label(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    pub fn throughput_kbps(&self) -> f64 {
        self.throughput_kbps
    }

    pub fn cpu_percent(&self) -> f32 {
        self.cpu_percent
    }
}

fn serialize_hms<S: serde::Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&t.format("%H:%M:%S"))
}

/// KB/s for `byte_count` bytes moved in `elapsed_secs`, with the epsilon floor.
pub fn throughput_kbps(byte_count: u64, elapsed_secs: f64) -> f64 {
    let elapsed = if elapsed_secs.is_nan() {
        ELAPSED_EPSILON_SECS
    } else {
        elapsed_secs.max(ELAPSED_EPSILON_SECS)
    };
    (byte_count as f64 / 1024.0) / elapsed
}

/// Source of the system-wide CPU utilization figure.
pub trait CpuSampler: Send {
    /// Utilization in percent since the previous call.
    fn sample(&mut self) -> f32;
}

/// Reads global CPU usage through sysinfo.
pub struct SystemCpuSampler {
    sys: System,
}

impl SystemCpuSampler {
    pub fn new() -> Self {
        let mut sys = System::new();
        // Prime the counters so the first sample covers the time since startup
        sys.refresh_cpu_usage();
        Self { sys }
    }
}

impl Default for SystemCpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSampler for SystemCpuSampler {
    fn sample(&mut self) -> f32 {
        self.sys.refresh_cpu_usage();
        let usage = self.sys.global_cpu_usage();
        if usage.is_finite() {
            usage.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

/// Always reports the same figure.
#[derive(Clone, Copy, Debug)]
pub struct FixedCpuSampler(pub f32);

impl CpuSampler for FixedCpuSampler {
    fn sample(&mut self) -> f32 {
        self.0
    }
}

pub struct MetricsRecorder {
    cpu: Box<dyn CpuSampler>,
}

impl MetricsRecorder {
    pub fn new(cpu: Box<dyn CpuSampler>) -> Self {
        Self { cpu }
    }

    pub fn with_system_cpu() -> Self {
        Self::new(Box::new(SystemCpuSampler::new()))
    }

    /// Build the record for a transfer that ran from `start` to `end`,
    /// stamped with the current local time.
    pub fn record(
        &mut self,
        role: Role,
        byte_count: u64,
        start: Instant,
        end: Instant,
    ) -> TransferRecord {
        let elapsed = end.saturating_duration_since(start).as_secs_f64();
        let rate = throughput_kbps(byte_count, elapsed);
        let cpu = self.cpu.sample();
        TransferRecord::new(role, Local::now().time(), byte_count, rate, cpu)
    }
}
