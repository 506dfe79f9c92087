//! ncmeter library
//!
//! Runs file transfers through an external copy program (netcat by default)
//! and records throughput and CPU usage for each completed transfer.

pub mod cli;
pub mod config;
pub mod error;
pub mod log;
pub mod logger;
pub mod metrics;
pub mod progress;
pub mod runner;
pub mod session;

pub use error::TransferError;
pub use log::TransferLog;
pub use metrics::{MetricsRecorder, TransferRecord};
pub use runner::{ByteTransport, CommandTransport, Role, TransportCommand};
pub use session::{SessionController, SessionEvent, SessionState, TransferRequest};
