//! Child process worker
//!
//! Runs a worker as a local child process speaking JSON lines: requests go
//! to stdin, results come back on stdout, anything else is diagnostics.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::process::{ExitStatus, WorkerEvent, WorkerProcess};
use super::IpcError;
use crate::models::TestResult;

/// Command line used to launch a worker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the worker
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self::new("test-worker")
    }
}

/// Worker backed by a child process
pub struct ChildWorker {
    id: usize,
    pid: Option<u32>,
    input: Option<mpsc::UnboundedSender<Vec<u8>>>,
    running: Arc<AtomicBool>,
}

impl ChildWorker {
    /// Launch a worker and return it with the receiving end of its event
    /// stream. Events are delivered in order on that one channel; `Exit` is
    /// always last and only sent once both output streams are drained.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        id: usize,
        command: &WorkerCommand,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WorkerEvent>), IpcError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .env("WORKER_DISPATCH_WORKER_ID", id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| IpcError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(IpcError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(IpcError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(IpcError::MissingPipe("stderr"))?;
        let pid = child.id();

        debug!("Worker{} started ({:?}, pid {:?})", id, command.program, pid);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));

        tokio::spawn(write_input(id, stdin, input_rx));
        let readers = [
            tokio::spawn(read_lines(id, stdout, event_tx.clone(), decode_output_line)),
            tokio::spawn(read_lines(id, stderr, event_tx.clone(), decode_stderr_line)),
        ];
        tokio::spawn(wait_for_exit(id, child, readers, running.clone(), event_tx));

        let worker = Self {
            id,
            pid,
            input: Some(input_tx),
            running,
        };

        Ok((worker, event_rx))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl WorkerProcess for ChildWorker {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn write(&mut self, bytes: &[u8]) {
        match &self.input {
            Some(input) => {
                if input.send(bytes.to_vec()).is_err() {
                    debug!("Worker{} input is gone, dropping {} bytes", self.id, bytes.len());
                }
            }
            None => warn!("Worker{} written to after close", self.id),
        }
    }

    fn close(&mut self) {
        if self.input.take().is_some() {
            debug!("Worker{} input closed", self.id);
        }
    }
}

/// Decode one line of worker stdout.
///
/// A line that parses as a result is a result; any other non-empty line is
/// stray output and is treated as diagnostics.
fn decode_output_line(line: &str) -> Option<WorkerEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<TestResult>(trimmed) {
        Ok(result) => Some(WorkerEvent::TestResult(result)),
        Err(e) => {
            warn!("Unparseable worker output ({}): {}", e, trimmed);
            Some(WorkerEvent::StdErr(line.to_string()))
        }
    }
}

fn decode_stderr_line(line: &str) -> Option<WorkerEvent> {
    Some(WorkerEvent::StdErr(line.to_string()))
}

async fn write_input(
    id: usize,
    mut stdin: ChildStdin,
    mut input: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(bytes) = input.recv().await {
        if let Err(e) = stdin.write_all(&bytes).await {
            debug!("Worker{} stdin write failed: {}", id, e);
            break;
        }
        if let Err(e) = stdin.flush().await {
            debug!("Worker{} stdin flush failed: {}", id, e);
            break;
        }
    }
    // dropping stdin delivers EOF to the worker
}

async fn read_lines<R>(
    id: usize,
    stream: R,
    events: mpsc::UnboundedSender<WorkerEvent>,
    decode: fn(&str) -> Option<WorkerEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(strip_line_ending(&buf));
                trace!("Worker{} > {}", id, line);
                if let Some(event) = decode(&line) {
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("Worker{} output read failed: {}", id, e);
                break;
            }
        }
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

async fn wait_for_exit(
    id: usize,
    mut child: Child,
    readers: [JoinHandle<()>; 2],
    running: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    futures::future::join_all(readers).await;

    let status = match child.wait().await {
        Ok(status) => ExitStatus::from(status),
        Err(e) => {
            warn!("Worker{} exit status unavailable: {}", id, e);
            ExitStatus::Terminated
        }
    };

    running.store(false, Ordering::SeqCst);
    debug!("Worker{} exited: {}", id, status);
    let _ = events.send(WorkerEvent::Exit(status));
}
