//! Emits per-test outcomes somewhere a caller can consume, mirroring the original's
//! `TraceInfoCommand`-style pattern of building a `#[derive(Serialize)]` struct and handing it
//! to `serde_json::to_string` -- the teacher's own reporting convention, generalized from "one
//! fixed trace header" to "one event stream per run".

use serde::Serialize;

use crate::test_registry::{ExpectationRecord, TestContext, TestMetadata};

/// One test's final outcome, the summary a [`Reporter::end_test`] call receives.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub assignment_name: String,
    pub test_name: String,
    pub passed: bool,
    pub failed_expectation_count: usize,
    pub total_expectation_count: usize,
}

impl TestReport {
    pub fn from_context(ctx: &TestContext) -> Self {
        TestReport {
            assignment_name: ctx.assignment_name.clone(),
            test_name: ctx.test_name.clone(),
            passed: ctx.failed_count() == 0,
            failed_expectation_count: ctx.failed_count(),
            total_expectation_count: ctx.expectations().len(),
        }
    }
}

/// The boundary a front end implements to observe a run as it happens. Every method has a
/// no-op default except [`Reporter::end_test`], so a minimal reporter only needs to care about
/// final per-test outcomes; a richer one (colorized terminal output, live progress) can hook
/// every event.
pub trait Reporter {
    fn begin_run(&mut self) {}
    fn begin_assignment(&mut self, _name: &str) {}
    fn begin_test(&mut self, _name: &str, _metadata: &TestMetadata) {}
    fn record_expectation(&mut self, _record: &ExpectationRecord) {}
    fn end_test(&mut self, report: &TestReport);
    fn end_assignment(&mut self) {}
    fn end_run(&mut self) {}

    /// Freeform output, e.g. a test body's own diagnostic messages.
    fn write(&mut self, _text: &str) {}
    fn flush(&mut self) {}
}

/// Discards every event. Useful when a caller only cares about the aggregate exit code.
#[derive(Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn end_test(&mut self, _report: &TestReport) {}
}

/// Prints one human-readable line per test as it finishes, the default for interactive runs.
#[derive(Default)]
pub struct TextReporter {
    passed: usize,
    failed: usize,
}

impl Reporter for TextReporter {
    fn end_test(&mut self, report: &TestReport) {
        if report.passed {
            self.passed += 1;
            println!("[PASS] {}::{}", report.assignment_name, report.test_name);
        } else {
            self.failed += 1;
            println!(
                "[FAIL] {}::{} ({}/{} expectations failed)",
                report.assignment_name, report.test_name, report.failed_expectation_count, report.total_expectation_count
            );
        }
    }

    fn end_run(&mut self) {
        println!("{} passed, {} failed", self.passed, self.failed);
    }

    fn write(&mut self, text: &str) {
        print!("{text}");
    }
}

/// Collects reports and prints them as a JSON array on [`Reporter::end_run`], the same way
/// `TraceInfoCommand` serializes its `TraceHeader`.
#[derive(Default)]
pub struct JsonReporter {
    reports: Vec<TestReport>,
}

impl Reporter for JsonReporter {
    fn end_test(&mut self, report: &TestReport) {
        self.reports.push(report.clone());
    }

    fn end_run(&mut self) {
        match serde_json::to_string(&self.reports) {
            Ok(json) => println!("{json}"),
            Err(e) => log::error!("failed to serialize test reports: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_from_context_counts_failures() {
        let mut ctx = TestContext::new("thing", "t", crate::test_registry::StopOption::Never);
        ctx.record(true, "a == a", true);
        ctx.record(false, "a == b", true);
        let report = TestReport::from_context(&ctx);
        assert_eq!(report.total_expectation_count, 2);
        assert_eq!(report.failed_expectation_count, 1);
        assert!(!report.passed);
    }

    #[test]
    fn json_reporter_accumulates_reports() {
        let mut reporter = JsonReporter::default();
        let ctx = TestContext::new("thing", "t", crate::test_registry::StopOption::Never);
        reporter.end_test(&TestReport::from_context(&ctx));
        assert_eq!(reporter.reports.len(), 1);
    }
}
