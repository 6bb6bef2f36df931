//! Run-wide configuration, grounded on the original's `ProgramOptions`.

use std::path::PathBuf;
use std::time::Duration;

use crate::test_registry::StopOption;

/// Whether reporter output should be colorized, mirroring `ProgramOptions::ColorizeOpt`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColorizeOption {
    Auto,
    Always,
    Never,
}

/// The full set of knobs a run is configured with, assembled once (typically from CLI
/// arguments) and threaded down into [`crate::runner::Runner`].
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub verbose: bool,
    /// Run only the named assignment; empty runs every registered assignment.
    pub assignment_name: String,
    /// Override the executable path every assignment resolves against; `None` uses each
    /// assignment's own `exec_path`.
    pub file_name: Option<PathBuf>,
    pub stop_option: StopOption,
    /// Passed through to the reporter only; the core never touches a terminal directly.
    pub colorize_option: ColorizeOption,
    pub default_call_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            verbose: false,
            assignment_name: String::new(),
            file_name: None,
            stop_option: StopOption::EachTestError,
            colorize_option: ColorizeOption::Auto,
            default_call_timeout: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stop_option_is_each_test_error() {
        assert_eq!(RunConfig::default().stop_option, StopOption::EachTestError);
    }

    #[test]
    fn default_assignment_name_selects_everything() {
        assert_eq!(RunConfig::default().assignment_name, "");
    }
}
