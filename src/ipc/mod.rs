//! Worker process plumbing
//!
//! The worker handle contract, the events a worker produces, and a child
//! process implementation of both.

mod child;
mod process;

use thiserror::Error;

pub use child::{ChildWorker, WorkerCommand};
pub use process::{ExitStatus, WorkerEvent, WorkerProcess};

/// Errors starting a worker
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Failed to spawn worker {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {0} pipe was not captured")]
    MissingPipe(&'static str),
}
