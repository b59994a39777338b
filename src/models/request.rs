//! Test request model
//!
//! A request identifies one unit of work handed to a worker process.

#![allow(dead_code)]

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// One unit of work dispatched to a worker
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestRequest {
    /// Identifier, unique within a run
    pub id: u64,

    /// Logical group (test class) name
    pub class: String,

    /// Secondary label (test name or namespace)
    pub name: String,

    /// Source file the test lives in
    pub file: String,
}

impl TestRequest {
    pub fn new(
        id: u64,
        class: impl Into<String>,
        name: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            id,
            class: class.into(),
            name: name.into(),
            file: file.into(),
        }
    }

    /// Encode as a single JSON line for the worker's stdin.
    ///
    /// Field order follows the struct, so the same request always encodes
    /// to the same bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Decode a request previously produced by [`TestRequest::encode`]
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes.trim_ascii_end())
    }

    /// `class::file` label used in diagnostics
    pub fn label(&self) -> String {
        format!("{}::{}", self.class, self.file)
    }
}

impl fmt::Display for TestRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} - {}", self.id, self.label())
    }
}

/// Load a request list from a JSON or YAML file (chosen by extension).
///
/// Ids must be unique, since results are matched to requests by id.
pub fn load_requests(path: impl AsRef<Path>) -> Result<Vec<TestRequest>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;

    let is_yaml = path
        .extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false);

    let requests: Vec<TestRequest> = if is_yaml {
        serde_yaml::from_str(&content).context("Failed to parse YAML requests")?
    } else {
        serde_json::from_str(&content).context("Failed to parse JSON requests")?
    };

    let mut seen = HashSet::new();
    for request in &requests {
        if !seen.insert(request.id) {
            bail!("Duplicate request id {} in {}", request.id, path.display());
        }
    }

    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_single_line() {
        let request = TestRequest::new(1, "a", "b", "c");
        let bytes = request.encode();

        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|&&b| b == b'\n').count(), 1);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\"id\":1,\"class\":\"a\",\"name\":\"b\",\"file\":\"c\"}\n"
        );
    }

    #[test]
    fn test_encode_is_deterministic() {
        let request = TestRequest::new(7, "FooTest", "testBar", "tests/FooTest.php");
        assert_eq!(request.encode(), request.clone().encode());
    }

    #[test]
    fn test_decode_encoded() {
        let request = TestRequest::new(3, "Foo\nBar", "baz", "dir/with \"quotes\".php");
        let decoded = TestRequest::decode(&request.encode()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_display() {
        let request = TestRequest::new(1, "foo", "oo", "footest.php");
        assert_eq!(request.to_string(), "#1 - foo::footest.php");
    }

    #[test]
    fn test_load_requests_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.yaml");
        std::fs::write(
            &path,
            "- id: 1\n  class: FooTest\n  name: testFoo\n  file: tests/FooTest.php\n\
             - id: 2\n  class: BarTest\n  name: testBar\n  file: tests/BarTest.php\n",
        )
        .unwrap();

        let requests = load_requests(&path).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].label(), "BarTest::tests/BarTest.php");
    }

    #[test]
    fn test_load_requests_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.json");
        std::fs::write(
            &path,
            r#"[{"id":1,"class":"A","name":"a","file":"a.php"},{"id":1,"class":"B","name":"b","file":"b.php"}]"#,
        )
        .unwrap();

        let err = load_requests(&path).unwrap_err();
        assert!(err.to_string().contains("Duplicate request id 1"));
    }
}
