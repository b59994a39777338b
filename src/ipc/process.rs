//! Worker process contract
//!
//! The executor only needs to know whether its worker is alive and how to
//! hand it bytes. Everything the worker says back arrives as a [`WorkerEvent`].

#![allow(dead_code)]

use std::fmt;

use crate::models::TestResult;

/// Handle to a running worker
pub trait WorkerProcess {
    fn is_running(&self) -> bool;

    /// Queue bytes for the worker's input. Transport failures are not
    /// reported here; they show up later as an [`WorkerEvent::Exit`].
    fn write(&mut self, bytes: &[u8]);

    /// Signal that no more requests will be written
    fn close(&mut self) {}
}

/// How a worker process ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    /// Killed by a signal, or the exit status could not be collected
    Terminated,
}

impl ExitStatus {
    pub fn is_graceful(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitStatus::Code(code),
            None => ExitStatus::Terminated,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit code {code}"),
            ExitStatus::Terminated => write!(f, "terminated"),
        }
    }
}

/// Something a worker reported, already decoded by the transport
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    TestResult(TestResult),
    StdErr(String),
    Exit(ExitStatus),
}
