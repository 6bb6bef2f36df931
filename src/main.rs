use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;
use std::time::Duration;

use structopt::StructOpt;

use asmgrader::config::{ColorizeOption, RunConfig};
use asmgrader::reporter::{JsonReporter, Reporter, TextReporter};
use asmgrader::runner::{ExitCode, Runner};
use asmgrader::test_registry::StopOption;

#[derive(StructOpt)]
#[structopt(name = "asmgrader", about = "Runs registered assignment tests against a student binary")]
struct Opt {
    /// Only run the named assignment; omit to run every registered assignment.
    #[structopt(long, default_value = "")]
    assignment: String,

    /// Override the executable path every assignment is run against.
    #[structopt(long)]
    exec_path: Option<PathBuf>,

    /// Stop the whole run at the first failing expectation, instead of finishing each test.
    #[structopt(long)]
    stop_on_first_error: bool,

    /// Emit a JSON report on stdout instead of human-readable text.
    #[structopt(long)]
    json: bool,

    /// Per-call timeout, in milliseconds, for synthetic function invocations.
    #[structopt(long, default_value = "2000")]
    call_timeout_ms: u64,

    #[structopt(short, long)]
    verbose: bool,
}

fn main() -> ProcessExitCode {
    let opt = Opt::from_args();
    asmgrader::logging::init(opt.verbose);

    let config = RunConfig {
        verbose: opt.verbose,
        assignment_name: opt.assignment,
        file_name: opt.exec_path,
        stop_option: if opt.stop_on_first_error { StopOption::FirstError } else { StopOption::EachTestError },
        colorize_option: ColorizeOption::Auto,
        default_call_timeout: Duration::from_millis(opt.call_timeout_ms),
    };

    let mut json_reporter;
    let mut text_reporter;
    let reporter: &mut dyn Reporter = if opt.json {
        json_reporter = JsonReporter::default();
        &mut json_reporter
    } else {
        text_reporter = TextReporter::default();
        &mut text_reporter
    };

    let mut runner = Runner::new(config, reporter);
    match runner.run_all() {
        ExitCode::AllPassed => ProcessExitCode::from(0),
        ExitCode::SomeFailed => ProcessExitCode::from(1),
        ExitCode::HarnessError => ProcessExitCode::from(2),
    }
}
