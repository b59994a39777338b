//! Executor state machine
//!
//! An executor is either idle or running exactly one request. Every worker
//! event moves it through [`ExecutorState::apply`], which is a pure function
//! of the current state and the event. Leaving `Running` always produces the
//! one result to report for that request; once idle, events are ignored, so
//! nothing can be reported twice.

#![allow(dead_code)]

use crate::ipc::WorkerEvent;
use crate::models::{TestError, TestRequest, TestResult};

/// Marker prepended to diagnostic lines appended to a completed result
pub const STDERR_PREFIX: &str = "STDERR: ";

/// The request a worker is currently busy with
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveRun {
    pub request: TestRequest,
    /// Diagnostic text seen since the request was written, in arrival order
    pub diagnostics: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ExecutorState {
    #[default]
    Idle,
    Running(ActiveRun),
}

impl ExecutorState {
    /// Running state for a freshly dispatched request
    pub fn start(request: TestRequest) -> Self {
        ExecutorState::Running(ActiveRun {
            request,
            diagnostics: Vec::new(),
        })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ExecutorState::Idle)
    }

    pub fn active_request(&self) -> Option<&TestRequest> {
        match self {
            ExecutorState::Idle => None,
            ExecutorState::Running(run) => Some(&run.request),
        }
    }

    pub fn diagnostics(&self) -> &[String] {
        match self {
            ExecutorState::Idle => &[],
            ExecutorState::Running(run) => &run.diagnostics,
        }
    }

    /// Feed one event. Returns the next state and, when the active request
    /// settled, the result to hand to the distributor.
    pub fn apply(self, worker: usize, event: WorkerEvent) -> (Self, Option<TestResult>) {
        let ExecutorState::Running(mut run) = self else {
            return (ExecutorState::Idle, None);
        };

        match event {
            WorkerEvent::StdErr(text) => {
                run.diagnostics.push(text);
                (ExecutorState::Running(run), None)
            }
            WorkerEvent::TestResult(result) => (ExecutorState::Idle, Some(run.settle(result))),
            WorkerEvent::Exit(status) if status.is_graceful() => (ExecutorState::Running(run), None),
            WorkerEvent::Exit(_) => (ExecutorState::Idle, Some(run.crashed(worker))),
        }
    }
}

impl ActiveRun {
    /// Final result once the worker answered
    fn settle(self, mut result: TestResult) -> TestResult {
        if result.id == self.request.id {
            result.add_errors(
                self.diagnostics
                    .into_iter()
                    .map(|line| TestError::new(format!("{STDERR_PREFIX}{line}"))),
            );
        } else {
            let message = mismatch_message(&self.request, &result);
            result.add_errors([TestError::new(message)]);
        }
        result
    }

    /// Final result when the worker died mid-request. Diagnostics are part of
    /// the crash message rather than separate errors.
    fn crashed(self, worker: usize) -> TestResult {
        let mut message = format!("Worker{worker} died");
        if !self.diagnostics.is_empty() {
            message.push('\n');
            message.push_str(&self.diagnostics.join("\n"));
        }
        TestResult::error_from_request(&self.request, message)
    }
}

/// Error text for a worker answering a different request than it was sent
pub fn mismatch_message(expected: &TestRequest, got: &TestResult) -> String {
    format!(
        "An unexpected test was run, this could be a naming issue:\n  Expected {}\n  Got #{} - {}\n",
        expected,
        got.id,
        got.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ExitStatus;

    fn request() -> TestRequest {
        TestRequest::new(1, "a", "b", "c")
    }

    fn messages(result: &TestResult) -> Vec<&str> {
        result.errors().iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_idle_ignores_everything() {
        let events = [
            WorkerEvent::StdErr("noise".to_string()),
            WorkerEvent::TestResult(TestResult::new(1)),
            WorkerEvent::Exit(ExitStatus::Code(1)),
            WorkerEvent::Exit(ExitStatus::Terminated),
        ];

        for event in events {
            let (state, outcome) = ExecutorState::Idle.apply(1, event);
            assert!(state.is_idle());
            assert!(outcome.is_none());
        }
    }

    #[test]
    fn test_start_is_clean() {
        let state = ExecutorState::start(request());
        assert_eq!(state.active_request(), Some(&request()));
        assert!(state.diagnostics().is_empty());
    }

    #[test]
    fn test_stderr_buffers_without_result() {
        let (state, outcome) =
            ExecutorState::start(request()).apply(1, WorkerEvent::StdErr("one".to_string()));
        let (state, outcome2) = state.apply(1, WorkerEvent::StdErr("two".to_string()));

        assert!(outcome.is_none() && outcome2.is_none());
        assert_eq!(state.diagnostics(), &["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_matching_result_passes_through() {
        let result = TestResult::from_request(&request());
        let (state, outcome) =
            ExecutorState::start(request()).apply(1, WorkerEvent::TestResult(result.clone()));

        assert!(state.is_idle());
        assert_eq!(outcome, Some(result));
    }

    #[test]
    fn test_matching_result_gets_diagnostics_appended() {
        let (state, _) =
            ExecutorState::start(request()).apply(1, WorkerEvent::StdErr("a message".to_string()));
        let result = TestResult::error_from_request(&request(), "Testing");
        let (_, outcome) = state.apply(1, WorkerEvent::TestResult(result));

        let outcome = outcome.unwrap();
        assert_eq!(messages(&outcome), vec!["Testing", "STDERR: a message"]);
    }

    #[test]
    fn test_mismatched_result_names_both_requests() {
        let expected = TestRequest::new(1, "foo", "oo", "footest.php");
        let got = TestRequest::new(2, "b", "ar", "bartest.php");

        let (state, _) =
            ExecutorState::start(expected).apply(1, WorkerEvent::StdErr("ignored".to_string()));
        let (state, outcome) = state.apply(
            1,
            WorkerEvent::TestResult(TestResult::error_from_request(&got, "Didn't bar!")),
        );

        assert!(state.is_idle());
        let outcome = outcome.unwrap();
        assert_eq!(outcome.id, 2);
        assert_eq!(
            messages(&outcome),
            vec![
                "Didn't bar!",
                "An unexpected test was run, this could be a naming issue:\n  Expected #1 - foo::footest.php\n  Got #2 - b::bartest.php\n",
            ]
        );
    }

    #[test]
    fn test_crash_merges_diagnostics() {
        let (state, _) =
            ExecutorState::start(request()).apply(1, WorkerEvent::StdErr("a message".to_string()));
        let (state, outcome) = state.apply(1, WorkerEvent::Exit(ExitStatus::Code(1)));

        assert!(state.is_idle());
        let outcome = outcome.unwrap();
        assert_eq!(outcome.id, 1);
        assert_eq!(messages(&outcome), vec!["Worker1 died\na message"]);
    }

    #[test]
    fn test_crash_without_diagnostics() {
        let (_, outcome) =
            ExecutorState::start(request()).apply(7, WorkerEvent::Exit(ExitStatus::Terminated));
        assert_eq!(messages(&outcome.unwrap()), vec!["Worker7 died"]);
    }

    #[test]
    fn test_graceful_exit_keeps_running() {
        let (state, outcome) =
            ExecutorState::start(request()).apply(1, WorkerEvent::Exit(ExitStatus::Code(0)));
        assert!(outcome.is_none());
        assert_eq!(state.active_request(), Some(&request()));
    }
}
