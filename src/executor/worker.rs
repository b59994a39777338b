//! Per-worker test executor
//!
//! Binds one worker handle to the shared distributor and turns the worker's
//! events into one reported result per dispatched request.

#![allow(dead_code)]

use std::sync::Arc;
use tracing::{debug, error, warn};

use super::state::ExecutorState;
use super::ExecutorError;
use crate::distributor::TestDistributor;
use crate::ipc::{ExitStatus, WorkerEvent, WorkerProcess};
use crate::models::{TestRequest, TestResult};

/// Executor driving a single worker
///
/// Handlers take `&mut self`; whoever owns the executor must deliver one
/// worker's events one at a time, in order.
pub struct WorkerTestExecutor<W> {
    id: usize,
    distributor: Arc<dyn TestDistributor>,
    process: W,
    state: ExecutorState,
}

impl<W: WorkerProcess> WorkerTestExecutor<W> {
    pub fn new(id: usize, distributor: Arc<dyn TestDistributor>, process: W) -> Self {
        Self {
            id,
            distributor,
            process,
            state: ExecutorState::Idle,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn process(&self) -> &W {
        &self.process
    }

    pub fn process_mut(&mut self) -> &mut W {
        &mut self.process
    }

    pub fn state(&self) -> &ExecutorState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    pub fn current_request(&self) -> Option<&TestRequest> {
        self.state.active_request()
    }

    /// Dispatch `request` to the worker. Does not wait for an answer.
    pub fn run(&mut self, request: TestRequest) -> Result<(), ExecutorError> {
        if let Some(active) = self.state.active_request() {
            return Err(ExecutorError::AlreadyRunning {
                worker: self.id,
                active: active.id,
                requested: request.id,
            });
        }
        if !self.process.is_running() {
            return Err(ExecutorError::WorkerNotRunning {
                worker: self.id,
                requested: request.id,
            });
        }

        debug!("Worker{} running {}", self.id, request);
        let bytes = request.encode();
        self.state = ExecutorState::start(request);
        self.process.write(&bytes);
        Ok(())
    }

    /// Take back the active request without reporting anything, for a
    /// request the worker never got to read.
    pub fn withdraw(&mut self) -> Option<TestRequest> {
        match std::mem::take(&mut self.state) {
            ExecutorState::Running(run) => Some(run.request),
            ExecutorState::Idle => None,
        }
    }

    pub fn on_test_result(&mut self, result: TestResult) {
        self.handle(WorkerEvent::TestResult(result));
    }

    pub fn on_std_err(&mut self, text: impl Into<String>) {
        self.handle(WorkerEvent::StdErr(text.into()));
    }

    pub fn on_exit(&mut self, status: ExitStatus) {
        self.handle(WorkerEvent::Exit(status));
    }

    /// Apply one worker event, reporting the result if it settled the
    /// active request.
    pub fn handle(&mut self, event: WorkerEvent) {
        self.trace_event(&event);

        let state = std::mem::take(&mut self.state);
        let (next, outcome) = state.apply(self.id, event);
        self.state = next;

        if let Some(result) = outcome {
            self.distributor.test_completed(self.id, result);
        }
    }

    fn trace_event(&self, event: &WorkerEvent) {
        let Some(active) = self.state.active_request() else {
            debug!("Worker{} idle, ignoring {:?}", self.id, event);
            return;
        };

        match event {
            WorkerEvent::TestResult(result) if result.id != active.id => {
                warn!(
                    "Worker{} answered #{} while running {}",
                    self.id, result.id, active
                );
            }
            WorkerEvent::Exit(status) if !status.is_graceful() => {
                error!("Worker{} died ({}) while running {}", self.id, status, active);
            }
            WorkerEvent::Exit(status) => {
                warn!(
                    "Worker{} exited ({}) without answering {}",
                    self.id, status, active
                );
            }
            _ => debug!("Worker{} event {:?}", self.id, event),
        }
    }
}
