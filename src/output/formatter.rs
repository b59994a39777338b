//! Output formatters for run summaries
//!
//! Provides table, JSON, CSV and one-line summary formats.

use anyhow::{Context, Result};
use std::io::Write;

use crate::models::{ReportedTest, RunSummary, TestStatus};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a whole run
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Csv => self.format_summary_csv(summary),
            OutputFormat::Summary => self.format_summary_brief(summary),
        }
    }

    fn status_label(&self, status: TestStatus) -> &'static str {
        match (status, self.colorize) {
            (TestStatus::Pass, true) => "\x1b[32m✓ PASS\x1b[0m",
            (TestStatus::Fail, true) => "\x1b[31m✗ FAIL\x1b[0m",
            (TestStatus::Pass, false) => "✓ PASS",
            (TestStatus::Fail, false) => "✗ FAIL",
        }
    }

    fn format_reported(&self, reported: &ReportedTest) -> String {
        let mut line = format!(
            "{:>5}  w{:<3} {} {:40} [{:>6}ms]",
            reported.result.id,
            reported.worker,
            self.status_label(reported.result.status()),
            reported.label(),
            reported.result.duration_ms
        );

        for error in reported.result.errors() {
            for (i, text) in error.message.lines().enumerate() {
                let marker = if i == 0 { "-" } else { " " };
                line.push_str(&format!("\n         {marker} {text}"));
            }
        }

        line
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str("\n══════════════════════════════════════════════════════════════════\n");
        output.push_str(&format!(
            "  Test run started {} on {} worker(s)\n",
            summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            summary.workers
        ));
        output.push_str("══════════════════════════════════════════════════════════════════\n");

        for reported in &summary.results {
            output.push_str(&self.format_reported(reported));
            output.push('\n');
        }

        if !summary.unreported.is_empty() {
            output.push_str("──────────────────────────────────────────────────────────────────\n");
            output.push_str("  No result received for:\n");
            for request in &summary.unreported {
                output.push_str(&format!("    {request}\n"));
            }
        }

        output.push_str("══════════════════════════════════════════════════════════════════\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&format!(
            "  Total: {} | Pass: {} | Fail: {} | Unreported: {}\n",
            summary.total,
            pass_str,
            fail_str,
            summary.unreported.len()
        ));
        output.push_str(&format!(
            "  Pass Rate: {:5.1}% | Duration: {}ms\n",
            summary.pass_rate(),
            summary.duration_ms
        ));

        output
    }

    fn format_summary_csv(&self, summary: &RunSummary) -> String {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let _ = writer.write_record(["id", "worker", "class", "file", "status", "duration_ms", "errors"]);
        for reported in &summary.results {
            let (class, file) = match &reported.request {
                Some(request) => (request.class.as_str(), request.file.as_str()),
                None => (reported.result.class.as_str(), reported.result.file.as_str()),
            };
            let errors: Vec<&str> = reported
                .result
                .errors()
                .iter()
                .map(|e| e.message.as_str())
                .collect();

            let _ = writer.write_record([
                reported.result.id.to_string(),
                reported.worker.to_string(),
                class.to_string(),
                file.to_string(),
                reported.result.status().to_string(),
                reported.result.duration_ms.to_string(),
                errors.join("\n"),
            ]);
        }
        for request in &summary.unreported {
            let _ = writer.write_record([
                request.id.to_string(),
                String::new(),
                request.class.clone(),
                request.file.clone(),
                "UNREPORTED".to_string(),
                String::new(),
                String::new(),
            ]);
        }

        writer
            .into_inner()
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_default()
    }

    fn format_summary_brief(&self, summary: &RunSummary) -> String {
        format!(
            "{}/{} passed ({:.1}%), {} failed, {} unreported on {} worker(s) in {}ms",
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.failed,
            summary.unreported.len(),
            summary.workers,
            summary.duration_ms
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a summary to a file
pub fn write_summary_to_file(path: &str, summary: &RunSummary, format: OutputFormat) -> Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_summary(summary);

    let mut file =
        std::fs::File::create(path).with_context(|| format!("Failed to create {path}"))?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
