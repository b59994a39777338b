//! Test execution engine
//!
//! The per-worker executor, its state machine, and the pool that feeds it.

mod pool;
mod state;
mod worker;

use thiserror::Error;

pub use pool::{PoolConfig, WorkerPool};
pub use worker::WorkerTestExecutor;

/// Misuse of an executor by its scheduler
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Worker{worker} is already running #{active}, refusing #{requested}")]
    AlreadyRunning {
        worker: usize,
        active: u64,
        requested: u64,
    },

    #[error("Worker{worker} is not running, cannot run #{requested}")]
    WorkerNotRunning { worker: usize, requested: u64 },
}
