//! Result distribution
//!
//! Executors hand every settled result to a [`TestDistributor`]. One
//! distributor is shared by all executors of a run.

#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::models::{CompletedTest, TestResult};

/// Sink for settled results
pub trait TestDistributor: Send + Sync {
    /// Called at most once per dispatched request, possibly from many
    /// executors at the same time.
    fn test_completed(&self, executor: usize, result: TestResult);
}

/// Distributor that keeps every result it receives
#[derive(Debug, Default)]
pub struct ResultCollector {
    completed: Mutex<Vec<CompletedTest>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CompletedTest>> {
        // a panicking reporter must not hide the results gathered so far
        self.completed.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of everything collected so far, in arrival order
    pub fn snapshot(&self) -> Vec<CompletedTest> {
        self.lock().clone()
    }

    /// Take the collected results, leaving the collector empty
    pub fn take(&self) -> Vec<CompletedTest> {
        std::mem::take(&mut *self.lock())
    }
}

impl TestDistributor for ResultCollector {
    fn test_completed(&self, executor: usize, result: TestResult) {
        debug!("Worker{} completed #{}: {}", executor, result.id, result.status());
        self.lock().push(CompletedTest {
            worker: executor,
            result,
        });
    }
}
