//! Error type for transfer sessions.

use std::path::PathBuf;

use thiserror::Error;

use crate::runner::Role;

/// Everything that can go wrong between pressing send/receive and getting a record.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Missing or unusable user input (no file selected, nothing to export).
    #[error("{0}")]
    InvalidInput(String),

    /// The external copy program could not be started.
    #[error("failed to start {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external copy program ran but reported failure.
    #[error("{program} exited with {}", describe_code(.code))]
    ProcessExit { program: String, code: Option<i32> },

    /// Source unreadable, destination unwritable, or a size query failed.
    #[error("{}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A transfer for this role is still in flight.
    #[error("a {0} is already running")]
    Busy(Role),

    /// The OS refused to start the worker thread for a transfer.
    #[error("failed to start {role} worker thread: {source}")]
    WorkerSpawn {
        role: Role,
        #[source]
        source: std::io::Error,
    },

    /// The worker stopped (for example by panicking) before reporting an outcome.
    #[error("worker exited without a result")]
    WorkerLost,

    /// The transport was shut down while the program was still running.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match *code {
        Some(c) => format!("exit code {}", c),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
