//! `asmgrader`: a traced-process substrate for grading student assembly assignments.
//!
//! A test launches the student's executable under a ptrace-based [`tracer`], pokes and peeks
//! its memory through [`memory_io`] and the typed [`value_serde`] boundary, resolves symbols
//! from its ELF symbol table ([`symbol`]), and invokes functions inside it with an
//! ABI-conformant synthetic call ([`asm_function`]). Tests are authored with the [`TEST!`]
//! family of macros and collected into a process-wide registry ([`test_registry`]), then driven
//! by [`runner::Runner`] and reported through a [`reporter::Reporter`].

#[macro_use]
pub mod macros;

pub mod arch;
pub mod asm_data;
pub mod asm_function;
pub mod byte_block;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory_io;
pub mod program;
pub mod registers;
pub mod reporter;
pub mod runner;
pub mod subprocess;
pub mod symbol;
pub mod test_registry;
pub mod tracer;
pub mod value_serde;

/// Re-exported so `$crate::ctor::ctor` resolves from the `TEST!` macro expansion without every
/// downstream crate having to depend on `ctor` directly.
pub use ctor;
/// Re-exported for the same reason, in case future macro expansions need `$crate::lazy_static`.
pub use lazy_static;

/// Convenience re-export of the small set of names a test file needs in scope.
pub mod prelude {
    pub use crate::asm_function::AsmFunction;
    pub use crate::error::{ErrorKind, GraderError, Result};
    pub use crate::program::Program;
    pub use crate::test_registry::{StopOption, TestContext, TestMetadata};
    pub use crate::{CHECK, FILE_METADATA, REQUIRE, TEST};
}
