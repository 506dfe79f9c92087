//! Session controller: runs transfers on worker threads and owns the transfer log.
//!
//! Workers never touch session state. Each one posts a single `WorkerDone`
//! message on a channel, and the thread that owns the controller applies it
//! in `poll` or `wait`. That keeps every log append, state change and
//! progress update on one thread.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::error::TransferError;
use crate::log::TransferLog;
use crate::logger::{Logger, NoopLogger};
use crate::metrics::{MetricsRecorder, TransferRecord};
use crate::runner::{ByteTransport, Role};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferRequest {
    Send {
        host: String,
        port: String,
        source: Option<PathBuf>,
    },
    Receive {
        port: String,
        destination: PathBuf,
    },
}

impl TransferRequest {
    pub fn role(&self) -> Role {
        match self {
            TransferRequest::Send { .. } => Role::Send,
            TransferRequest::Receive { .. } => Role::Receive,
        }
    }

    /// Human-readable peer description, e.g. `10.0.0.2:50000`.
    pub fn target(&self) -> String {
        match self {
            TransferRequest::Send { host, port, .. } => format!("{}:{}", host, port),
            TransferRequest::Receive { port, .. } => format!("port {}", port),
        }
    }
}

/// Notifications for presentation collaborators.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Started { role: Role, target: String },
    Completed(TransferRecord),
    Failed { role: Role, message: String },
    Cleared,
}

struct WorkerDone {
    role: Role,
    started: Instant,
    finished: Instant,
    outcome: Result<u64, TransferError>,
}

pub struct SessionController {
    transport: Arc<dyn ByteTransport>,
    recorder: MetricsRecorder,
    logger: Arc<dyn Logger>,
    log: TransferLog,
    state: SessionState,
    progress: u8,
    in_flight: Vec<Role>,
    tx: Sender<WorkerDone>,
    rx: Receiver<WorkerDone>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn ByteTransport>, recorder: MetricsRecorder) -> Self {
        let (tx, rx) = channel();
        Self {
            transport,
            recorder,
            logger: Arc::new(NoopLogger),
            log: TransferLog::new(),
            state: SessionState::Idle,
            progress: 0,
            in_flight: Vec::new(),
            tx,
            rx,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 0 until the first completion, 100 after any success, 0 again after `clear`.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn log(&self) -> &TransferLog {
        &self.log
    }

    pub fn is_running(&self, role: Role) -> bool {
        self.in_flight.contains(&role)
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Validate `request` and hand it to a worker thread.
    ///
    /// Errors found before spawning (no file selected, unreadable source)
    /// move the session to `Failed`. `Busy` leaves everything as it was.
    pub fn start(&mut self, request: TransferRequest) -> Result<SessionEvent, TransferError> {
        let role = request.role();
        if self.is_running(role) {
            return Err(TransferError::Busy(role));
        }
        let target = request.target();
        let job = match self.prepare(request) {
            Ok(job) => job,
            Err(e) => {
                self.logger.failed(role, &e.to_string());
                self.state = SessionState::Failed;
                return Err(e);
            }
        };

        self.logger.start(role, &target);
        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("ncmeter-{}", role))
            .spawn(move || {
                let mut done = Completion {
                    tx,
                    role,
                    started: Instant::now(),
                    outcome: None,
                };
                done.outcome = Some(job.run(transport.as_ref()));
            });
        if let Err(source) = spawned {
            let err = TransferError::WorkerSpawn { role, source };
            self.logger.failed(role, &err.to_string());
            self.state = SessionState::Failed;
            return Err(err);
        }

        self.in_flight.push(role);
        self.state = SessionState::Running;
        Ok(SessionEvent::Started { role, target })
    }

    fn prepare(&self, request: TransferRequest) -> Result<Job, TransferError> {
        match request {
            TransferRequest::Send { host, port, source } => {
                let source = source.ok_or_else(|| {
                    TransferError::InvalidInput("Please select a file to send.".to_string())
                })?;
                let size = source_size(&source)?;
                Ok(Job::Send {
                    host,
                    port,
                    source,
                    size,
                })
            }
            TransferRequest::Receive { port, destination } => {
                Ok(Job::Receive { port, destination })
            }
        }
    }

    /// Apply every completion that has arrived, without blocking.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(done) = self.rx.try_recv() {
            events.push(self.finish(done));
        }
        events
    }

    /// Block until the next in-flight transfer finishes.
    /// Returns `None` when nothing is running.
    pub fn wait(&mut self) -> Option<SessionEvent> {
        if self.in_flight.is_empty() {
            return None;
        }
        // The controller holds a sender itself, so recv only fails if that is gone
        let done = self.rx.recv().ok()?;
        Some(self.finish(done))
    }

    fn finish(&mut self, done: WorkerDone) -> SessionEvent {
        self.in_flight.retain(|r| *r != done.role);
        match done.outcome {
            Ok(bytes) => {
                let record = self
                    .recorder
                    .record(done.role, bytes, done.started, done.finished);
                let secs = done
                    .finished
                    .saturating_duration_since(done.started)
                    .as_secs_f64();
                self.logger.completed(&record, secs);
                self.log.push(record.clone());
                self.progress = 100;
                self.state = SessionState::Completed;
                SessionEvent::Completed(record)
            }
            Err(e) => {
                let message = e.to_string();
                self.logger.failed(done.role, &message);
                self.state = SessionState::Failed;
                SessionEvent::Failed {
                    role: done.role,
                    message,
                }
            }
        }
    }

    /// Completed/Failed back to Idle, or Running while another role is still busy.
    pub fn acknowledge(&mut self) {
        if matches!(self.state, SessionState::Completed | SessionState::Failed) {
            self.state = if self.in_flight.is_empty() {
                SessionState::Idle
            } else {
                SessionState::Running
            };
        }
    }

    pub fn clear(&mut self) -> SessionEvent {
        self.logger.cleared(self.log.len());
        self.log.clear();
        self.progress = 0;
        SessionEvent::Cleared
    }

    pub fn export_csv(&self, path: &Path) -> Result<usize, TransferError> {
        let rows = self.log.export_csv(path)?;
        self.logger.exported(path, rows);
        Ok(rows)
    }

    /// Shut the transport down and apply every outstanding completion.
    /// Blocks until each worker has returned.
    pub fn shutdown(&mut self) -> Vec<SessionEvent> {
        self.transport.shutdown();
        let mut events = Vec::new();
        while let Some(ev) = self.wait() {
            events.push(ev);
        }
        events
    }
}

/// Posts the worker's outcome when dropped, so a worker that unwinds
/// still reports and frees its role.
struct Completion {
    tx: Sender<WorkerDone>,
    role: Role,
    started: Instant,
    outcome: Option<Result<u64, TransferError>>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let finished = Instant::now();
        let outcome = self.outcome.take().unwrap_or_else(|| Err(TransferError::WorkerLost));
        let _ = self.tx.send(WorkerDone {
            role: self.role,
            started: self.started,
            finished,
            outcome,
        });
    }
}

enum Job {
    Send {
        host: String,
        port: String,
        source: PathBuf,
        size: u64,
    },
    Receive {
        port: String,
        destination: PathBuf,
    },
}

impl Job {
    /// Run the transfer and report the byte count on success.
    fn run(&self, transport: &dyn ByteTransport) -> Result<u64, TransferError> {
        match self {
            Job::Send {
                host,
                port,
                source,
                size,
            } => {
                transport.send(host, port, source)?;
                Ok(*size)
            }
            Job::Receive { port, destination } => {
                transport.receive(port, destination)?;
                written_size(destination)
            }
        }
    }
}

/// Size of a send source. Must be a regular file.
fn source_size(path: &Path) -> Result<u64, TransferError> {
    let meta = std::fs::metadata(path).map_err(|e| TransferError::filesystem(path, e))?;
    if !meta.is_file() {
        return Err(TransferError::filesystem(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    Ok(meta.len())
}

/// Bytes in a receive destination after the program exits. Devices and
/// pipes report whatever length the OS gives them, usually 0.
fn written_size(path: &Path) -> Result<u64, TransferError> {
    std::fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|e| TransferError::filesystem(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::FixedCpuSampler;
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Transport scripted by the test: each call pops the next outcome.
    /// Receives write `payload` bytes to the destination on success.
    struct Scripted {
        outcomes: Mutex<Vec<Result<(), i32>>>,
        payload: usize,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<(), i32>>, payload: usize) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                payload,
                gate: Mutex::new(None),
            }
        }

        /// The first call to take the gate reports on `entered` and then
        /// blocks until `release` fires.
        fn gated(self) -> (Self, mpsc::Sender<()>, mpsc::Receiver<()>) {
            let (release, wait) = mpsc::channel();
            let (entered_tx, entered) = mpsc::channel();
            *self.gate.lock() = Some((entered_tx, wait));
            (self, release, entered)
        }

        fn next(&self) -> Result<(), TransferError> {
            let gate = self.gate.lock().take();
            if let Some((entered, wait)) = gate {
                let _ = entered.send(());
                let _ = wait.recv_timeout(Duration::from_secs(5));
            }
            let mut o = self.outcomes.lock();
            let r = if o.is_empty() { Ok(()) } else { o.remove(0) };
            r.map_err(|code| TransferError::ProcessExit {
                program: "nc".into(),
                code: Some(code),
            })
        }
    }

    impl ByteTransport for Scripted {
        fn send(&self, _host: &str, _port: &str, _source: &Path) -> Result<(), TransferError> {
            self.next()
        }

        fn receive(&self, _port: &str, destination: &Path) -> Result<(), TransferError> {
            self.next()?;
            std::fs::write(destination, vec![7u8; self.payload])
                .map_err(|e| TransferError::filesystem(destination, e))
        }
    }

    fn controller(t: Scripted) -> SessionController {
        SessionController::new(
            Arc::new(t),
            MetricsRecorder::new(Box::new(FixedCpuSampler(5.0))),
        )
    }

    fn send_req(source: Option<PathBuf>) -> TransferRequest {
        TransferRequest::Send {
            host: "127.0.0.1".into(),
            port: "50000".into(),
            source,
        }
    }

    #[test]
    fn send_without_file_is_invalid_input() {
        let mut c = controller(Scripted::new(vec![], 0));
        let err = c.start(send_req(None)).unwrap_err();
        assert!(matches!(err, TransferError::InvalidInput(_)));
        assert_eq!(err.to_string(), "Please select a file to send.");
        assert_eq!(c.state(), SessionState::Failed);
        assert!(c.log().is_empty());
        c.acknowledge();
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn send_of_missing_file_is_filesystem_error() {
        let mut c = controller(Scripted::new(vec![], 0));
        let err = c
            .start(send_req(Some(PathBuf::from("/no/such/file.bin"))))
            .unwrap_err();
        assert!(matches!(err, TransferError::Filesystem { .. }));
        assert!(!c.has_in_flight());
    }

    #[test]
    fn successful_send_records_file_size() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("payload.bin");
        std::fs::write(&src, vec![0u8; 2048]).unwrap();
        let mut c = controller(Scripted::new(vec![Ok(())], 0));

        let started = c.start(send_req(Some(src))).unwrap();
        assert_eq!(
            started,
            SessionEvent::Started {
                role: Role::Send,
                target: "127.0.0.1:50000".into()
            }
        );
        assert_eq!(c.state(), SessionState::Running);
        assert_eq!(c.progress(), 0);

        match c.wait() {
            Some(SessionEvent::Completed(r)) => {
                assert_eq!(r.byte_count(), 2048);
                assert_eq!(r.cpu_percent(), 5.0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(c.state(), SessionState::Completed);
        assert_eq!(c.progress(), 100);
        assert_eq!(c.log().len(), 1);
        c.acknowledge();
        assert_eq!(c.state(), SessionState::Idle);
        assert!(c.wait().is_none());
    }

    #[test]
    fn failed_receive_appends_nothing_and_keeps_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = controller(Scripted::new(vec![Ok(()), Err(1)], 16));
        let recv = || TransferRequest::Receive {
            port: "50000".into(),
            destination: tmp.path().join("received_file"),
        };

        c.start(recv()).unwrap();
        assert!(matches!(c.wait(), Some(SessionEvent::Completed(_))));
        c.acknowledge();
        assert_eq!(c.log().len(), 1);
        assert_eq!(c.log().records()[0].byte_count(), 16);

        c.start(recv()).unwrap();
        match c.wait() {
            Some(SessionEvent::Failed { role, message }) => {
                assert_eq!(role, Role::Receive);
                assert!(message.contains("exit code 1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(c.state(), SessionState::Failed);
        assert_eq!(c.log().len(), 1);
        assert_eq!(c.progress(), 100);
        c.acknowledge();
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn n_successes_give_n_records_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = controller(Scripted::new(vec![], 64));
        for _ in 0..4 {
            c.start(TransferRequest::Receive {
                port: "1".into(),
                destination: tmp.path().join("out"),
            })
            .unwrap();
            c.wait().unwrap();
            c.acknowledge();
        }
        assert_eq!(c.log().len(), 4);
        assert_eq!(c.log().total_bytes(), 256);
    }

    #[test]
    fn same_role_twice_is_busy() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a.bin");
        std::fs::write(&src, b"abc").unwrap();
        let (t, release, _entered) = Scripted::new(vec![Ok(())], 0).gated();
        let mut c = controller(t);

        c.start(send_req(Some(src.clone()))).unwrap();
        let err = c.start(send_req(Some(src))).unwrap_err();
        assert!(matches!(err, TransferError::Busy(Role::Send)));
        assert_eq!(c.state(), SessionState::Running);
        assert!(c.poll().is_empty());

        release.send(()).unwrap();
        assert!(matches!(c.wait(), Some(SessionEvent::Completed(_))));
        assert_eq!(c.log().len(), 1);
    }

    #[test]
    fn acknowledge_returns_to_running_while_other_role_busy() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a.bin");
        std::fs::write(&src, b"abc").unwrap();
        let (t, release, entered) = Scripted::new(vec![], 8).gated();
        let mut c = controller(t);

        // The send takes the gate and blocks; the receive runs straight through
        c.start(send_req(Some(src))).unwrap();
        entered.recv_timeout(Duration::from_secs(5)).unwrap();
        c.start(TransferRequest::Receive {
            port: "1".into(),
            destination: tmp.path().join("out"),
        })
        .unwrap();
        match c.wait() {
            Some(SessionEvent::Completed(r)) => assert_eq!(r.role(), Role::Receive),
            other => panic!("unexpected event: {other:?}"),
        }
        c.acknowledge();
        assert_eq!(c.state(), SessionState::Running);
        assert!(c.is_running(Role::Send));

        release.send(()).unwrap();
        assert!(matches!(c.wait(), Some(SessionEvent::Completed(_))));
        c.acknowledge();
        assert_eq!(c.state(), SessionState::Idle);
    }

    struct Panicking;

    impl ByteTransport for Panicking {
        fn send(&self, _host: &str, _port: &str, _source: &Path) -> Result<(), TransferError> {
            panic!("transport blew up");
        }

        fn receive(&self, _port: &str, _destination: &Path) -> Result<(), TransferError> {
            panic!("transport blew up");
        }
    }

    #[test]
    fn panicking_transport_fails_and_frees_the_role() {
        let mut c = SessionController::new(
            Arc::new(Panicking),
            MetricsRecorder::new(Box::new(FixedCpuSampler(0.0))),
        );
        let recv = || TransferRequest::Receive {
            port: "1".into(),
            destination: PathBuf::from("unused"),
        };

        c.start(recv()).unwrap();
        match c.wait() {
            Some(SessionEvent::Failed { role, message }) => {
                assert_eq!(role, Role::Receive);
                assert_eq!(message, "worker exited without a result");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!c.is_running(Role::Receive));
        assert_eq!(c.state(), SessionState::Failed);
        assert!(c.log().is_empty());
        c.acknowledge();
        assert_eq!(c.state(), SessionState::Idle);

        // The role is free again
        c.start(recv()).unwrap();
        assert!(matches!(c.wait(), Some(SessionEvent::Failed { .. })));
        assert!(c.wait().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn receive_into_a_device_is_recorded() {
        let mut c = controller(Scripted::new(vec![Ok(())], 3));
        c.start(TransferRequest::Receive {
            port: "1".into(),
            destination: PathBuf::from("/dev/null"),
        })
        .unwrap();
        match c.wait() {
            Some(SessionEvent::Completed(r)) => assert_eq!(r.byte_count(), 0),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(c.log().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn send_of_a_directory_is_still_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = controller(Scripted::new(vec![], 0));
        let err = c
            .start(send_req(Some(tmp.path().to_path_buf())))
            .unwrap_err();
        assert!(matches!(err, TransferError::Filesystem { .. }));
        assert!(!c.has_in_flight());
    }

    #[test]
    fn clear_resets_log_and_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = controller(Scripted::new(vec![], 4));
        c.start(TransferRequest::Receive {
            port: "1".into(),
            destination: tmp.path().join("out"),
        })
        .unwrap();
        c.wait().unwrap();
        assert_eq!(c.progress(), 100);

        assert_eq!(c.clear(), SessionEvent::Cleared);
        assert_eq!(c.log().len(), 0);
        assert_eq!(c.progress(), 0);
    }
}
