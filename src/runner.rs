//! Drives registered assignments/tests to completion against the configured reporter.
//!
//! Per-test lifecycle follows the spec directly: spawn a fresh `Program`, run the test body
//! with a fresh `TestContext`, collect expectation records, report, then drop the `Program` so
//! its child is reaped before the next test starts.

use log::{info, warn};

use crate::config::RunConfig;
use crate::program::Program;
use crate::reporter::{Reporter, TestReport};
use crate::test_registry::{Assignment, GlobalRegistrar, StopOption, TestContext};

/// Process exit codes, matching the conventional 0 (all passed) / 1 (some failed) / 2 (harness
/// error) split.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExitCode {
    AllPassed = 0,
    SomeFailed = 1,
    HarnessError = 2,
}

pub struct Runner<'a> {
    config: RunConfig,
    reporter: &'a mut dyn Reporter,
}

impl<'a> Runner<'a> {
    pub fn new(config: RunConfig, reporter: &'a mut dyn Reporter) -> Self {
        Runner { config, reporter }
    }

    /// Runs every assignment the caller's config selects (or all registered assignments, if
    /// `assignment_name` is empty), returning the process exit code to use.
    pub fn run_all(&mut self) -> ExitCode {
        self.reporter.begin_run();

        let mut registrar = GlobalRegistrar::get().lock().unwrap();
        let mut any_failed = false;
        let mut harness_error = false;

        let assignments: Vec<usize> = registrar
            .assignments()
            .iter()
            .enumerate()
            .filter(|(_, a)| self.config.assignment_name.is_empty() || a.name() == self.config.assignment_name)
            .map(|(i, _)| i)
            .collect();

        'assignments: for idx in assignments {
            let assignment = &registrar.assignments_mut()[idx];
            let exec_path = self
                .config
                .file_name
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| assignment.exec_path().to_owned());

            info!("running assignment '{}' ({} tests)", assignment.name(), assignment.tests().len());
            self.reporter.begin_assignment(assignment.name());

            for test in assignment.tests() {
                self.reporter.begin_test(test.name.as_str(), &test.metadata);
                match self.run_one(assignment, &exec_path, test.name.as_str(), &test.body) {
                    RunOutcome::Passed => {}
                    RunOutcome::Failed => any_failed = true,
                    RunOutcome::HarnessError => {
                        harness_error = true;
                        if matches!(self.config.stop_option, StopOption::FirstError) {
                            self.reporter.end_assignment();
                            break 'assignments;
                        }
                    }
                }

                if matches!(self.config.stop_option, StopOption::FirstError) && any_failed {
                    self.reporter.end_assignment();
                    break 'assignments;
                }
            }

            self.reporter.end_assignment();
        }

        self.reporter.end_run();

        if harness_error {
            ExitCode::HarnessError
        } else if any_failed {
            ExitCode::SomeFailed
        } else {
            ExitCode::AllPassed
        }
    }

    fn run_one(
        &mut self,
        assignment: &Assignment,
        exec_path: &str,
        test_name: &str,
        body: &(dyn Fn(&mut TestContext, &mut Program) + Send + Sync),
    ) -> RunOutcome {
        let mut program = match Program::launch(exec_path, &[], self.config.default_call_timeout) {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to launch '{exec_path}' for test '{test_name}': {e}");
                return RunOutcome::HarnessError;
            }
        };

        let mut ctx = TestContext::new(assignment.name(), test_name, self.config.stop_option);
        body(&mut ctx, &mut program);

        for record in ctx.expectations() {
            self.reporter.record_expectation(record);
        }

        let report = TestReport::from_context(&ctx);
        let passed = report.passed;
        self.reporter.end_test(&report);

        // `program` is dropped here: its `TracedSubprocess` reaps the child on drop.
        if passed {
            RunOutcome::Passed
        } else {
            RunOutcome::Failed
        }
    }
}

enum RunOutcome {
    Passed,
    Failed,
    HarnessError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NullReporter;

    #[test]
    fn exit_code_values_match_convention() {
        assert_eq!(ExitCode::AllPassed as i32, 0);
        assert_eq!(ExitCode::SomeFailed as i32, 1);
        assert_eq!(ExitCode::HarnessError as i32, 2);
    }

    #[test]
    fn run_all_with_no_assignments_passes_trivially() {
        let mut reporter = NullReporter::default();
        let config = RunConfig {
            assignment_name: "__nonexistent_test_sentinel__".to_owned(),
            ..RunConfig::default()
        };
        let mut runner = Runner::new(config, &mut reporter);
        assert_eq!(runner.run_all(), ExitCode::AllPassed);
    }
}
