//! Data models for test dispatch
//!
//! Requests sent to workers, results coming back, and run summaries.

mod request;
mod test_result;

pub use request::{load_requests, TestRequest};
pub use test_result::{CompletedTest, ReportedTest, RunSummary, TestError, TestResult, TestStatus};
