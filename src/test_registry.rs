//! Static-init test registration and the per-test execution context.
//!
//! Grounded on the original's `Assignment`/`GlobalRegistrar`/`TestAutoRegistrar` trio
//! (`include/asmgrader/api/assignment.hpp`, `src/registrars/global_registrar.cpp`,
//! `include/asmgrader/registrars/auto_registrars.hpp`): a process-wide Meyer's-singleton
//! registrar, assignments found-or-created by name, and tests appended to their owning
//! assignment in declaration order. Rust has no static-init-order guarantee across translation
//! units either, so like the original, cross-module ordering is left unspecified; within one
//! module, `TEST!` invocations register in source order because each one expands to its own
//! `#[ctor::ctor]` function, and `ctor` runs same-module constructors in declaration order.

use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::error::{ErrorKind, GraderError, Result};
use crate::program::Program;

/// Where a test run should stop, mirroring the original's `ProgramOptions::StopOpt`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StopOption {
    /// Keep running every test regardless of failures.
    Never,
    /// Abort the entire run at the first failed expectation.
    FirstError,
    /// Abort only the current test body at its first failed expectation, but continue with the
    /// next test.
    EachTestError,
}

/// Static, per-file information a `FILE_METADATA!` invocation attaches to every `TEST!` in its
/// module.
#[derive(Clone, Debug)]
pub struct TestMetadata {
    pub assignment_name: String,
    pub exec_path: String,
    /// Explicit ordering hint for callers that need deterministic cross-module ordering; `None`
    /// falls back to whatever order modules happen to initialize in.
    pub sequence: Option<u64>,
}

/// One registered test body plus the metadata it was declared with.
pub struct Test {
    pub name: String,
    pub metadata: TestMetadata,
    pub body: Box<dyn Fn(&mut TestContext, &mut Program) + Send + Sync>,
}

/// A named collection of tests sharing one executable under test, mirroring the original's
/// `Assignment`.
pub struct Assignment {
    name: String,
    exec_path: String,
    tests: Vec<Test>,
}

impl Assignment {
    pub fn new(name: impl Into<String>, exec_path: impl Into<String>) -> Self {
        Assignment {
            name: name.into(),
            exec_path: exec_path.into(),
            tests: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exec_path(&self) -> &str {
        &self.exec_path
    }

    pub fn set_exec_path(&mut self, path: impl Into<String>) {
        self.exec_path = path.into();
    }

    pub fn add_test(&mut self, test: Test) {
        self.tests.push(test);
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    pub fn test_names(&self) -> Vec<&str> {
        self.tests.iter().map(|t| t.name.as_str()).collect()
    }
}

/// The process-wide registrar. Populated before `main` runs by `TEST!`/`FILE_METADATA!`
/// expansions, via [`GlobalRegistrar::find_or_create_assignment`] -- the preferred registration
/// pathway (the original's alternative, `AssignmentAutoRegistrar`, was commented out dead code
/// and has no equivalent here).
pub struct GlobalRegistrar {
    assignments: Vec<Assignment>,
}

impl GlobalRegistrar {
    fn new() -> Self {
        GlobalRegistrar { assignments: Vec::new() }
    }

    pub fn get() -> &'static Mutex<GlobalRegistrar> {
        &REGISTRAR
    }

    /// Returns the index of the assignment named `metadata.assignment_name`, creating it (with
    /// `metadata.exec_path`) if it doesn't exist yet.
    pub fn find_or_create_assignment(&mut self, metadata: &TestMetadata) -> usize {
        if let Some(i) = self.assignments.iter().position(|a| a.name == metadata.assignment_name) {
            return i;
        }
        self.assignments.push(Assignment::new(metadata.assignment_name.clone(), metadata.exec_path.clone()));
        self.assignments.len() - 1
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn assignments_mut(&mut self) -> &mut [Assignment] {
        &mut self.assignments
    }

    pub fn assignment_names(&self) -> Vec<&str> {
        self.assignments.iter().map(|a| a.name()).collect()
    }

    pub fn num_registered(&self) -> usize {
        self.assignments.iter().map(|a| a.tests().len()).sum()
    }
}

lazy_static! {
    static ref REGISTRAR: Mutex<GlobalRegistrar> = Mutex::new(GlobalRegistrar::new());
}

/// Best-effort operand rendering for expectation records, mirroring the original's reliance on
/// `fmt::formattable<T>` with a `<unformattable>` fallback.
pub trait Renderable {
    fn render(&self) -> String;
}

impl<T: std::fmt::Debug> Renderable for T {
    fn render(&self) -> String {
        format!("{:?}", self)
    }
}

/// The rendered operands of a top-level comparison a `REQUIRE!`/`CHECK!` condition was split on
/// (see `$crate::__cmp_munch!`), so a reporter can show actual values instead of source text.
#[derive(Clone, Debug)]
pub struct ComparisonRender {
    pub op: &'static str,
    pub lhs: String,
    pub rhs: String,
}

/// A single `REQUIRE!`/`CHECK!` outcome.
#[derive(Clone, Debug)]
pub struct ExpectationRecord {
    pub passed: bool,
    pub expression: String,
    /// Present when the condition was recognized as a top-level `==`/`!=`/`<=`/`>=` comparison.
    pub comparison: Option<ComparisonRender>,
    pub location: String,
    pub fatal: bool,
}

/// Per-test state threaded through a test body: accumulated expectations, the stop policy, and
/// a flag helpers check before doing further work once a fatal expectation has fired.
pub struct TestContext {
    pub assignment_name: String,
    pub test_name: String,
    stop_option: StopOption,
    expectations: Vec<ExpectationRecord>,
    stopped: bool,
}

impl TestContext {
    pub fn new(assignment_name: impl Into<String>, test_name: impl Into<String>, stop_option: StopOption) -> Self {
        TestContext {
            assignment_name: assignment_name.into(),
            test_name: test_name.into(),
            stop_option,
            expectations: Vec::new(),
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn stop_option(&self) -> StopOption {
        self.stop_option
    }

    pub fn expectations(&self) -> &[ExpectationRecord] {
        &self.expectations
    }

    pub fn failed_count(&self) -> usize {
        self.expectations.iter().filter(|e| !e.passed).count()
    }

    /// Records one `REQUIRE!`/`CHECK!` outcome. `fatal` distinguishes `REQUIRE!` (aborts on
    /// failure, subject to `stop_option`) from `CHECK!` (always just records and continues).
    #[track_caller]
    pub fn record(&mut self, passed: bool, expression: impl Into<String>, fatal: bool) {
        self.push_expectation(passed, expression.into(), None, fatal);
    }

    /// Like [`Self::record`], but for a condition `$crate::__cmp_munch!` recognized as a
    /// top-level comparison: carries the operator and each side's rendered value alongside the
    /// plain source text.
    #[track_caller]
    #[allow(clippy::too_many_arguments)]
    pub fn record_comparison(
        &mut self,
        passed: bool,
        expression: impl Into<String>,
        op: &'static str,
        lhs: String,
        rhs: String,
        fatal: bool,
    ) {
        self.push_expectation(passed, expression.into(), Some(ComparisonRender { op, lhs, rhs }), fatal);
    }

    #[track_caller]
    fn push_expectation(&mut self, passed: bool, expression: String, comparison: Option<ComparisonRender>, fatal: bool) {
        let location = std::panic::Location::caller();
        self.expectations.push(ExpectationRecord {
            passed,
            expression,
            comparison,
            location: format!("{}:{}", location.file(), location.line()),
            fatal,
        });

        if !passed && fatal && !matches!(self.stop_option, StopOption::Never) {
            self.stopped = true;
        }
    }

    pub fn error_result<T>(&self, kind: ErrorKind, context: impl Into<String>) -> Result<T> {
        Err(GraderError::new(kind, context.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_or_create_is_idempotent_by_name() {
        let mut reg = GlobalRegistrar::new();
        let meta = TestMetadata {
            assignment_name: "thing".to_owned(),
            exec_path: "/bin/true".to_owned(),
            sequence: None,
        };
        let i1 = reg.find_or_create_assignment(&meta);
        let i2 = reg.find_or_create_assignment(&meta);
        assert_eq!(i1, i2);
        assert_eq!(reg.assignments().len(), 1);
    }

    #[test]
    fn first_error_stops_on_failed_require() {
        let mut ctx = TestContext::new("thing", "sum function", StopOption::FirstError);
        ctx.record(true, "sum(0, 0) == 0", true);
        assert!(!ctx.is_stopped());
        ctx.record(false, "sum(1, 1) == 3", true);
        assert!(ctx.is_stopped());
        assert_eq!(ctx.failed_count(), 1);
    }

    #[test]
    fn never_stop_option_keeps_running() {
        let mut ctx = TestContext::new("thing", "t", StopOption::Never);
        ctx.record(false, "x == y", true);
        assert!(!ctx.is_stopped());
    }

    #[test]
    fn check_never_sets_stop_flag() {
        let mut ctx = TestContext::new("thing", "t", StopOption::FirstError);
        ctx.record(false, "x == y", false);
        assert!(!ctx.is_stopped());
    }
}
