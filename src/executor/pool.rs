//! Worker pool
//!
//! Spreads a queue of requests over a fixed number of worker slots. Each
//! slot owns one executor and is the only consumer of its worker's events,
//! which keeps the executor's handlers strictly serialized.

use anyhow::{bail, Result};
use chrono::Utc;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::WorkerTestExecutor;
use crate::distributor::{ResultCollector, TestDistributor};
use crate::ipc::{ChildWorker, IpcError, WorkerCommand, WorkerEvent, WorkerProcess};
use crate::models::{RunSummary, TestRequest};
use crate::utils::timer::Timer;

/// Pending requests shared by all slots
#[derive(Clone, Debug, Default)]
pub struct RequestQueue {
    inner: Arc<Mutex<VecDeque<TestRequest>>>,
}

impl RequestQueue {
    pub fn new(requests: impl IntoIterator<Item = TestRequest>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(requests.into_iter().collect())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TestRequest>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pop(&self) -> Option<TestRequest> {
        self.lock().pop_front()
    }

    /// Put a request back at the head of the queue
    pub fn push_front(&self, request: TestRequest) {
        self.lock().push_front(request);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn drain(&self) -> Vec<TestRequest> {
        self.lock().drain(..).collect()
    }
}

/// Pool settings
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub workers: usize,
    pub command: WorkerCommand,
    /// Replacement workers a slot may start after its worker dies
    pub max_restarts: u32,
}

impl PoolConfig {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            workers: 4,
            command,
            max_restarts: 3,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }
}

/// Runs requests on a pool of child process workers
pub struct WorkerPool {
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    /// Run every request and wait until all workers are done
    pub async fn run(&self, requests: Vec<TestRequest>) -> Result<RunSummary> {
        if self.config.workers == 0 {
            bail!("Worker pool needs at least one worker");
        }

        let started_at = Utc::now();
        let timer = Timer::start("dispatch run");
        let slots = self.config.workers.min(requests.len());

        info!(
            "Dispatching {} request(s) to {} worker(s) ({:?})",
            requests.len(),
            slots,
            self.config.command.program
        );

        let queue = RequestQueue::new(requests.iter().cloned());
        let collector = Arc::new(ResultCollector::new());

        let handles: Vec<_> = (1..=slots)
            .map(|id| {
                let command = self.config.command.clone();
                let queue = queue.clone();
                let distributor: Arc<dyn TestDistributor> = collector.clone();
                let max_restarts = self.config.max_restarts;

                tokio::spawn(run_slot(id, command, max_restarts, queue, distributor))
            })
            .collect();

        let mut unreported = Vec::new();
        let mut failures = Vec::new();

        for outcome in join_all(handles).await {
            match outcome {
                Ok(Ok(mut unresolved)) => unreported.append(&mut unresolved),
                Ok(Err(e)) => failures.push(e),
                Err(e) => error!("Worker slot panicked: {}", e),
            }
        }

        if slots > 0 && failures.len() == slots {
            let first = failures.swap_remove(0);
            return Err(anyhow::Error::new(first).context("No worker could be started"));
        }
        for e in &failures {
            warn!("Worker slot never started: {}", e);
        }

        let leftover = queue.drain();
        if !leftover.is_empty() {
            warn!("{} request(s) never dispatched", leftover.len());
        }
        unreported.extend(leftover);

        let summary = RunSummary::new(
            started_at,
            slots,
            &requests,
            collector.take(),
            unreported,
            timer.elapsed_ms(),
        );

        info!(
            "Run completed in {}ms - Pass: {}/{} ({:.1}%)",
            summary.duration_ms,
            summary.passed,
            summary.total,
            summary.pass_rate()
        );

        Ok(summary)
    }
}

/// Keep one slot busy until the queue is empty, replacing its worker when
/// it dies. Returns requests left without a result.
async fn run_slot(
    id: usize,
    command: WorkerCommand,
    max_restarts: u32,
    queue: RequestQueue,
    distributor: Arc<dyn TestDistributor>,
) -> Result<Vec<TestRequest>, IpcError> {
    let mut unresolved = Vec::new();
    let mut restarts = 0;

    loop {
        let (process, events) = match ChildWorker::spawn(id, &command) {
            Ok(spawned) => spawned,
            Err(e) if restarts == 0 => return Err(e),
            Err(e) => {
                error!("Worker{} could not be restarted: {}", id, e);
                break;
            }
        };

        let executor = WorkerTestExecutor::new(id, distributor.clone(), process);
        if let Some(request) = drive(executor, events, &queue).await {
            unresolved.push(request);
        }

        if queue.is_empty() {
            break;
        }
        if restarts >= max_restarts {
            warn!(
                "Worker{} gave up after {} restart(s), {} request(s) still queued",
                id,
                restarts,
                queue.len()
            );
            break;
        }

        restarts += 1;
        info!("Restarting Worker{} ({}/{})", id, restarts, max_restarts);
    }

    Ok(unresolved)
}

/// Feed one worker's events to its executor, dispatching queued requests
/// whenever it goes idle. Returns the request still active when the worker
/// went away, if any.
///
/// A request written after the worker already answered one, followed by an
/// exit with no output in between, was never read. It goes back on the
/// queue for another worker instead of being reported as a crash.
pub async fn drive<W: WorkerProcess>(
    mut executor: WorkerTestExecutor<W>,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    queue: &RequestQueue,
) -> Option<TestRequest> {
    let mut answered = false;
    dispatch_next(&mut executor, queue);
    let mut quiet = true;

    while let Some(event) = events.recv().await {
        if let WorkerEvent::Exit(status) = &event {
            if answered && quiet {
                if let Some(request) = executor.withdraw() {
                    info!(
                        "Worker{} exited ({}) before reading {}, requeueing",
                        executor.id(),
                        status,
                        request
                    );
                    queue.push_front(request);
                }
            }
            executor.handle(event);
            break;
        }

        answered |= matches!(event, WorkerEvent::TestResult(_));
        quiet = false;
        executor.handle(event);

        if executor.is_idle() {
            dispatch_next(&mut executor, queue);
            quiet = true;
        }
    }

    let unresolved = executor.current_request().cloned();
    if let Some(request) = &unresolved {
        warn!("Worker{} went away without answering {}", executor.id(), request);
    }
    unresolved
}

fn dispatch_next<W: WorkerProcess>(executor: &mut WorkerTestExecutor<W>, queue: &RequestQueue) {
    if !executor.process().is_running() {
        return;
    }

    match queue.pop() {
        Some(request) => {
            if let Err(e) = executor.run(request.clone()) {
                error!("{}", e);
                queue.push_front(request);
            }
        }
        None => executor.process_mut().close(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ExitStatus;
    use crate::models::TestResult;

    #[derive(Default)]
    struct FakeWorker {
        written: Vec<Vec<u8>>,
        closed: bool,
    }

    impl WorkerProcess for FakeWorker {
        fn is_running(&self) -> bool {
            true
        }

        fn write(&mut self, bytes: &[u8]) {
            self.written.push(bytes.to_vec());
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn requests(n: u64) -> Vec<TestRequest> {
        (1..=n)
            .map(|id| TestRequest::new(id, format!("Class{id}"), "test", format!("t{id}.php")))
            .collect()
    }

    /// Worker that answers each request line with a passing result
    fn echo_worker() -> WorkerCommand {
        WorkerCommand::new("sh").arg("-c").arg(
            r#"while read line; do id=$(echo "$line" | sed 's/^{"id":\([0-9]*\),.*/\1/'); echo "{\"id\":$id}"; done"#,
        )
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new(WorkerCommand::new("w"))
            .workers(8)
            .max_restarts(0);
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_restarts, 0);
    }

    #[tokio::test]
    async fn test_drive_dispatches_until_queue_empty() {
        let requests = requests(2);
        let queue = RequestQueue::new(requests.clone());
        let collector = Arc::new(ResultCollector::new());
        let executor = WorkerTestExecutor::new(1, collector.clone(), FakeWorker::default());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(WorkerEvent::TestResult(TestResult::from_request(&requests[0])))
            .unwrap();
        tx.send(WorkerEvent::TestResult(TestResult::from_request(&requests[1])))
            .unwrap();
        tx.send(WorkerEvent::Exit(ExitStatus::Code(0))).unwrap();

        let unresolved = drive(executor, rx, &queue).await;

        assert!(unresolved.is_none());
        assert!(queue.is_empty());
        assert_eq!(collector.len(), 2);
    }

    #[tokio::test]
    async fn test_drive_stops_on_crash() {
        let requests = requests(2);
        let queue = RequestQueue::new(requests.clone());
        let collector = Arc::new(ResultCollector::new());
        let executor = WorkerTestExecutor::new(4, collector.clone(), FakeWorker::default());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(WorkerEvent::StdErr("segfault".to_string())).unwrap();
        tx.send(WorkerEvent::Exit(ExitStatus::Code(139))).unwrap();

        let unresolved = drive(executor, rx, &queue).await;

        assert!(unresolved.is_none());
        assert_eq!(queue.len(), 1);
        let completed = collector.take();
        assert_eq!(completed[0].result.id, 1);
        assert_eq!(completed[0].result.errors[0].message, "Worker4 died\nsegfault");
    }

    #[tokio::test]
    async fn test_drive_requeues_request_sent_to_exiting_worker() {
        let requests = requests(2);
        let queue = RequestQueue::new(requests.clone());
        let collector = Arc::new(ResultCollector::new());
        let executor = WorkerTestExecutor::new(1, collector.clone(), FakeWorker::default());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(WorkerEvent::TestResult(TestResult::from_request(&requests[0])))
            .unwrap();
        tx.send(WorkerEvent::Exit(ExitStatus::Code(1))).unwrap();

        let unresolved = drive(executor, rx, &queue).await;

        assert!(unresolved.is_none());
        assert_eq!(collector.len(), 1);
        assert!(collector.take()[0].result.is_success());
        assert_eq!(queue.pop().map(|r| r.id), Some(2));
    }

    #[tokio::test]
    async fn test_drive_silent_crash_on_first_request_is_reported() {
        let queue = RequestQueue::new(requests(2));
        let collector = Arc::new(ResultCollector::new());
        let executor = WorkerTestExecutor::new(2, collector.clone(), FakeWorker::default());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(WorkerEvent::Exit(ExitStatus::Terminated)).unwrap();

        assert!(drive(executor, rx, &queue).await.is_none());
        let completed = collector.take();
        assert_eq!(completed[0].result.id, 1);
        assert_eq!(completed[0].result.errors[0].message, "Worker2 died");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_drive_reports_unanswered_request() {
        let queue = RequestQueue::new(requests(1));
        let collector = Arc::new(ResultCollector::new());
        let executor = WorkerTestExecutor::new(1, collector.clone(), FakeWorker::default());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(WorkerEvent::Exit(ExitStatus::Code(0))).unwrap();

        let unresolved = drive(executor, rx, &queue).await;

        assert_eq!(unresolved.map(|r| r.id), Some(1));
        assert!(collector.is_empty());
    }

    #[tokio::test]
    async fn test_drive_ends_when_stream_closes() {
        let queue = RequestQueue::new(requests(1));
        let collector = Arc::new(ResultCollector::new());
        let executor = WorkerTestExecutor::new(1, collector.clone(), FakeWorker::default());

        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);

        assert_eq!(drive(executor, rx, &queue).await.map(|r| r.id), Some(1));
    }

    #[tokio::test]
    async fn test_pool_runs_all_requests() {
        let pool = WorkerPool::new(PoolConfig::new(echo_worker()).workers(2));
        let summary = pool.run(requests(5)).await.unwrap();

        assert_eq!(summary.total, 5);
        assert_eq!(summary.passed, 5);
        assert!(summary.unreported.is_empty());
        assert!(summary.is_all_passed());
        assert_eq!(summary.workers, 2);
    }

    #[tokio::test]
    async fn test_pool_restarts_crashed_workers() {
        let crashing = WorkerCommand::new("sh")
            .arg("-c")
            .arg("read line; echo dying >&2; exit 2");
        let pool = WorkerPool::new(PoolConfig::new(crashing).workers(1).max_restarts(1));

        let summary = pool.run(requests(3)).await.unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(
            summary.results[0].result.errors[0].message,
            "Worker1 died\ndying"
        );
        assert_eq!(summary.unreported.len(), 1);
        assert_eq!(summary.unreported[0].id, 3);
    }

    #[tokio::test]
    async fn test_pool_one_shot_workers_run_every_request() {
        let one_shot = WorkerCommand::new("sh").arg("-c").arg(
            r#"read line; id=$(echo "$line" | sed 's/^{"id":\([0-9]*\),.*/\1/'); echo "{\"id\":$id}"; sleep 0.2; exit 1"#,
        );
        let pool = WorkerPool::new(PoolConfig::new(one_shot).workers(1).max_restarts(10));

        let summary = pool.run(requests(4)).await.unwrap();

        assert_eq!(summary.passed, 4);
        assert_eq!(summary.failed, 0);
        assert!(summary.unreported.is_empty());
        let ids: Vec<_> = summary.results.iter().map(|r| r.result.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_pool_fails_when_no_worker_starts() {
        let pool = WorkerPool::new(PoolConfig::new(WorkerCommand::new(
            "/nonexistent/worker-dispatch-test-worker",
        )));
        assert!(pool.run(requests(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_pool_with_no_requests() {
        let pool = WorkerPool::new(PoolConfig::new(echo_worker()));
        let summary = pool.run(Vec::new()).await.unwrap();
        assert_eq!(summary.total, 0);
        assert!(summary.results.is_empty());
    }
}
