//! Test result models
//!
//! Defines results reported by workers and the summary of a whole run.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::TestRequest;

/// A single error entry attached to a result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestError {
    pub message: String,
}

impl TestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Test execution status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Pass)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Outcome of attempting a request
///
/// Carries the identity of the request it answers so that a result can be
/// described even when it does not match what was asked for. Errors keep
/// emission order: whatever the worker reported first, then anything
/// appended while the result was being settled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: u64,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub errors: Vec<TestError>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl TestResult {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            class: String::new(),
            name: String::new(),
            file: String::new(),
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Successful result for `request`
    pub fn from_request(request: &TestRequest) -> Self {
        Self {
            id: request.id,
            class: request.class.clone(),
            name: request.name.clone(),
            file: request.file.clone(),
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Result representing an error for `request` with `message`
    pub fn error_from_request(request: &TestRequest, message: impl Into<String>) -> Self {
        let mut result = Self::from_request(request);
        result.errors.push(TestError::new(message));
        result
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn errors(&self) -> &[TestError] {
        &self.errors
    }

    /// `class::file` label, matching [`TestRequest::label`]
    pub fn label(&self) -> String {
        format!("{}::{}", self.class, self.file)
    }

    /// Append errors after any existing ones
    pub fn add_errors<I>(&mut self, errors: I)
    where
        I: IntoIterator<Item = TestError>,
    {
        self.errors.extend(errors);
    }

    pub fn status(&self) -> TestStatus {
        if self.errors.is_empty() {
            TestStatus::Pass
        } else {
            TestStatus::Fail
        }
    }

    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} [{}ms]",
            self.status().symbol(),
            self.id,
            self.duration_ms
        )?;
        if let Some(first) = self.errors.first() {
            write!(f, " - {first}")?;
        }
        Ok(())
    }
}

/// A result as it reached the distributor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTest {
    /// Executor (worker) that reported it
    pub worker: usize,
    pub result: TestResult,
}

/// A completed test joined with the request it belongs to
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportedTest {
    pub worker: usize,
    /// None when the worker reported an id nobody asked for
    pub request: Option<TestRequest>,
    pub result: TestResult,
}

impl ReportedTest {
    pub fn label(&self) -> String {
        match &self.request {
            Some(request) => request.label(),
            None if !self.result.class.is_empty() => self.result.label(),
            None => format!("<unknown #{}>", self.result.id),
        }
    }
}

/// Summary of one dispatch run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub workers: usize,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ReportedTest>,
    /// Requests that never produced a result
    pub unreported: Vec<TestRequest>,
}

impl RunSummary {
    pub fn new(
        started_at: DateTime<Utc>,
        workers: usize,
        requests: &[TestRequest],
        completed: Vec<CompletedTest>,
        unreported: Vec<TestRequest>,
        duration_ms: u64,
    ) -> Self {
        let by_id: HashMap<u64, &TestRequest> = requests.iter().map(|r| (r.id, r)).collect();

        let mut results: Vec<ReportedTest> = completed
            .into_iter()
            .map(|c| ReportedTest {
                worker: c.worker,
                request: by_id.get(&c.result.id).map(|r| (*r).clone()),
                result: c.result,
            })
            .collect();
        results.sort_by_key(|r| r.result.id);

        let passed = results.iter().filter(|r| r.result.is_success()).count();
        let failed = results.len() - passed;

        Self {
            started_at,
            workers,
            total: requests.len(),
            passed,
            failed,
            duration_ms,
            results,
            unreported,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    /// Every request produced a passing result
    pub fn is_all_passed(&self) -> bool {
        self.failed == 0 && self.unreported.is_empty() && self.passed == self.total
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run on {} worker(s)", self.workers)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for reported in &self.results {
            writeln!(f, "  [w{}] {} {}", reported.worker, reported.result, reported.label())?;
        }
        for request in &self.unreported {
            writeln!(f, "  ? {request} (no result)")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Unreported: {}",
            self.total,
            self.passed,
            self.failed,
            self.unreported.len()
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.duration_ms
        )
    }
}
