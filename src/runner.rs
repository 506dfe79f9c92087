//! Transfer runner: one blocking send or receive through an external copy program.
//!
//! The network protocol belongs to the external program (netcat by default).
//! This module only spawns it with the right arguments, wires the file to its
//! stdin or stdout, and turns the exit status into a `Result`.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransferError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Send,
    Receive,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Send => f.write_str("send"),
            Role::Receive => f.write_str("receive"),
        }
    }
}

/// Point-to-point byte transport. Both calls block until the peer side is done.
pub trait ByteTransport: Send + Sync + 'static {
    /// Push the whole of `source` to `host:port`.
    fn send(&self, host: &str, port: &str, source: &Path) -> Result<(), TransferError>;

    /// Listen on `port` and write everything received into `destination`.
    fn receive(&self, port: &str, destination: &Path) -> Result<(), TransferError>;

    /// Abort running transfers and refuse new ones. Blocked calls should
    /// return promptly afterwards.
    fn shutdown(&self) {}
}

/// Program and argument templates for the external copy program.
///
/// `{host}` and `{port}` inside an argument are replaced at spawn time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportCommand {
    pub program: String,
    pub send_args: Vec<String>,
    pub receive_args: Vec<String>,
}

impl Default for TransportCommand {
    fn default() -> Self {
        // netcat: `nc -q 1 HOST PORT < file` and `nc -l -p PORT > file`
        TransportCommand {
            program: "nc".to_string(),
            send_args: vec!["-q".into(), "1".into(), "{host}".into(), "{port}".into()],
            receive_args: vec!["-l".into(), "-p".into(), "{port}".into()],
        }
    }
}

/// Substitute `{host}` and `{port}` in every template argument.
pub fn expand_args(templates: &[String], host: &str, port: &str) -> Vec<String> {
    templates
        .iter()
        .map(|t| t.replace("{host}", host).replace("{port}", port))
        .collect()
}

/// How often a running child is checked for exit or shutdown.
const EXIT_POLL: Duration = Duration::from_millis(5);

/// `ByteTransport` backed by a subprocess.
#[derive(Clone, Debug, Default)]
pub struct CommandTransport {
    command: TransportCommand,
    stopped: Arc<AtomicBool>,
}

impl CommandTransport {
    pub fn new(command: TransportCommand) -> Self {
        Self {
            command,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn command(&self) -> &TransportCommand {
        &self.command
    }

    fn run(&self, args: Vec<String>, stdin: Stdio, stdout: Stdio) -> Result<(), TransferError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(TransferError::Cancelled);
        }
        let program = &self.command.program;
        let mut child = Command::new(program)
            .args(&args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| TransferError::ProcessSpawn {
                program: program.clone(),
                source,
            })?;
        // Poll rather than block so shutdown can kill the child
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if self.stopped.load(Ordering::SeqCst) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(TransferError::Cancelled);
                }
                Ok(None) => thread::sleep(EXIT_POLL),
                Err(source) => {
                    let _ = child.kill();
                    return Err(TransferError::ProcessSpawn {
                        program: program.clone(),
                        source,
                    });
                }
            }
        };
        if status.success() {
            Ok(())
        } else {
            Err(TransferError::ProcessExit {
                program: program.clone(),
                code: status.code(),
            })
        }
    }
}

impl ByteTransport for CommandTransport {
    fn send(&self, host: &str, port: &str, source: &Path) -> Result<(), TransferError> {
        let file = File::open(source).map_err(|e| TransferError::filesystem(source, e))?;
        let args = expand_args(&self.command.send_args, host, port);
        self.run(args, Stdio::from(file), Stdio::null())
    }

    fn receive(&self, port: &str, destination: &Path) -> Result<(), TransferError> {
        let file =
            File::create(destination).map_err(|e| TransferError::filesystem(destination, e))?;
        let args = expand_args(&self.command.receive_args, "", port);
        self.run(args, Stdio::null(), Stdio::from(file))
    }

    fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
