//! Unified error taxonomy for the grading harness.
//!
//! Every fallible operation in this crate returns a [`Result`], which carries a closed
//! [`ErrorKind`] plus a short context string describing what was being attempted. The set of
//! kinds is intentionally small and enumerable, so we reach for `thiserror` rather than
//! `anyhow`: callers frequently want to match on *which* kind of failure occurred (e.g. a test
//! body asserting that a call returned `ErrorKind::UnexpectedReturn`), not just print it.

use std::fmt;

use thiserror::Error;

/// A closed enumeration of the ways an operation against a traced child can fail.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The operation (a function call, a `run`, a stdio read) exceeded its timeout.
    TimedOut,
    /// A named symbol could not be found in the executable's symbol table.
    UnresolvedSymbol,
    /// A callee terminated the process (or otherwise never returned) instead of returning.
    UnexpectedReturn,
    /// An argument could not be marshaled: wrong arity, or a value too large for its
    /// scratch-memory slot.
    BadArgument,
    /// An underlying Linux syscall (`ptrace`, `waitpid`, `mmap`, ...) failed.
    SyscallFailure,
    /// A caught-all for conditions that don't fit the other categories. Use sparingly.
    UnknownError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::TimedOut => "timed out",
            ErrorKind::UnresolvedSymbol => "unresolved symbol",
            ErrorKind::UnexpectedReturn => "unexpected return",
            ErrorKind::BadArgument => "bad argument",
            ErrorKind::SyscallFailure => "syscall failure",
            ErrorKind::UnknownError => "unknown error",
        };
        f.write_str(s)
    }
}

/// A user-visible failure: an [`ErrorKind`] plus the context in which it occurred.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {context}")]
pub struct GraderError {
    pub kind: ErrorKind,
    pub context: String,
}

impl GraderError {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        GraderError {
            kind,
            context: context.into(),
        }
    }
}

impl From<ErrorKind> for GraderError {
    fn from(kind: ErrorKind) -> Self {
        GraderError {
            kind,
            context: kind.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GraderError>;

/// Attaches context to a bare [`ErrorKind`] result without pulling in `anyhow`: the error set
/// here is closed, so a generic "error chain" abstraction would be more machinery than the
/// problem needs.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, ErrorKind> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|kind| GraderError::new(kind, context))
    }
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| GraderError::new(e.kind, format!("{}: {}", context.into(), e.context)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = GraderError::new(ErrorKind::TimedOut, "calling sum()");
        assert_eq!(err.to_string(), "timed out: calling sum()");
    }

    #[test]
    fn context_wraps_bare_errorkind() {
        let res: std::result::Result<(), ErrorKind> = Err(ErrorKind::BadArgument);
        let wrapped = res.context("marshaling arg 2");
        assert_eq!(wrapped.unwrap_err().context, "marshaling arg 2");
    }
}
