//! The top-level handle a test body interacts with: the traced executable plus its symbol
//! table, scratch-memory allocator, and captured stdio/syscall history.
//!
//! Grounded on the original's `Program` (umbrella owner of a `TracedSubprocess` plus a symbol
//! table) together with `init_scratch_memory` from `replay_syscall.rs` for the allocator, which
//! here is a simple bump allocator backed by one injected `mmap` rather than rr's
//! mapping-recreation machinery -- a grading harness only ever needs a modest, short-lived
//! scratch region, not a faithful replay of the tracee's original address space.

use std::time::Duration;

use crate::arch::SupportedArch;
use crate::byte_block::ByteBlock;
use crate::error::{ErrorKind, Result, ResultExt};
use crate::subprocess::TracedSubprocess;
use crate::symbol::{SymbolInfo, SymbolTable};
use crate::tracer::SyscallRecord;

const SCRATCH_SIZE: usize = 64 * 1024;

/// A bump allocator over one `mmap`-backed scratch page, reset for each `Program` instance. A
/// grading session typically allocates a handful of small buffers per test; there's no need for
/// a free-list since the whole region is torn down with the process.
struct ScratchAllocator {
    base: Option<u64>,
    next_offset: usize,
}

impl ScratchAllocator {
    fn new() -> Self {
        ScratchAllocator {
            base: None,
            next_offset: 0,
        }
    }
}

/// Owns a traced child executable: its process, symbol table, and scratch-memory bookkeeping.
/// This is the handle every [`crate::asm_data::AsmData`] / [`crate::asm_function::AsmFunction`]
/// borrows from, so they can never outlive it.
pub struct Program {
    subprocess: TracedSubprocess,
    symbols: SymbolTable,
    scratch: ScratchAllocator,
    reentry_point: Option<u64>,
    default_call_timeout: Duration,
}

impl Program {
    /// Launches `exec_path`, applying `default_call_timeout` to every [`crate::asm_function::AsmFunction`]
    /// [`Program::find_function`] hands back, unless the caller overrides it with
    /// [`crate::asm_function::AsmFunction::with_timeout`].
    pub fn launch(exec_path: &str, args: &[String], default_call_timeout: Duration) -> Result<Self> {
        let symbols = SymbolTable::load(std::path::Path::new(exec_path))?;
        let subprocess = TracedSubprocess::new(exec_path, args, symbols.arch())?;

        Ok(Program {
            subprocess,
            symbols,
            scratch: ScratchAllocator::new(),
            reentry_point: None,
            default_call_timeout,
        })
    }

    /// The single breakpoint-trapping instruction [`crate::asm_function::AsmFunction`] parks
    /// the child at between calls, lazily mapped into an executable scratch page on first use.
    pub fn reentry_point(&mut self) -> Result<u64> {
        if let Some(addr) = self.reentry_point {
            return Ok(addr);
        }

        let prot = (libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC) as u64;
        let flags = (libc::MAP_PRIVATE | libc::MAP_ANONYMOUS) as u64;
        let addr = self
            .subprocess
            .tracer_mut()
            .inject_syscall(libc::SYS_mmap as i64, [0, 4096, prot, flags, u64::MAX, 0])?;
        if addr < 0 {
            return Err(ErrorKind::SyscallFailure).context("mapping the function re-entry page");
        }
        let addr = addr as u64;

        let trap = trap_instruction(self.arch());
        self.write_memory(addr, &ByteBlock::from(trap.as_slice()))?;

        self.reentry_point = Some(addr);
        Ok(addr)
    }

    pub fn arch(&self) -> SupportedArch {
        self.symbols.arch()
    }

    pub fn resolve_symbol(&self, name: &str) -> Result<SymbolInfo> {
        self.symbols.resolve(name)
    }

    /// Resolves `name` and returns a callable handle, the Rust equivalent of the original's
    /// `ctx.find_function<Sig>(name)`. Unlike [`Program::find_symbol`], a missing function is
    /// reported immediately here rather than deferred, since a call site always needs a
    /// concrete address up front.
    pub fn find_function<R: crate::asm_function::AsmScalar>(
        &self,
        name: &str,
    ) -> Result<crate::asm_function::AsmFunction<R>> {
        let info = self.resolve_symbol(name)?;
        Ok(crate::asm_function::AsmFunction::new(name, info.address).with_timeout(self.default_call_timeout))
    }

    /// Resolves `name` as a data symbol, deferring any resolution failure until the returned
    /// handle is actually read -- mirroring the original's `AsmSymbol`, which stores a
    /// resolution error rather than failing at construction.
    pub fn find_symbol<T: crate::value_serde::MemorySerde>(&self, name: &str) -> crate::asm_data::AsmSymbol<'_, T> {
        match self.resolve_symbol(name) {
            Ok(info) => crate::asm_data::AsmSymbol::resolved(name, self, info.address),
            Err(e) => crate::asm_data::AsmSymbol::unresolved(name, e.kind),
        }
    }

    pub fn subprocess(&self) -> &TracedSubprocess {
        &self.subprocess
    }

    pub fn subprocess_mut(&mut self) -> &mut TracedSubprocess {
        &mut self.subprocess
    }

    /// A [`MemoryIo`] handle onto this program's address space, for callers (namely
    /// [`crate::asm_data::AsmData`]) that need the lower-level chunked/scanning reads
    /// [`crate::value_serde::MemorySerde::read`] offers rather than [`Program::read_memory`]'s
    /// fixed-length convenience wrapper.
    pub fn memory_io(&self) -> crate::memory_io::PtraceMemoryIo {
        self.subprocess.tracer().memory_io()
    }

    pub fn read_memory(&self, address: u64, len: usize) -> Result<ByteBlock> {
        use crate::memory_io::MemoryIo;
        self.subprocess.tracer().memory_io().read_block(address, len)
    }

    pub fn write_memory(&self, address: u64, data: &ByteBlock) -> Result<()> {
        use crate::memory_io::MemoryIo;
        self.subprocess.tracer().memory_io().write_block(address, data)
    }

    /// Hands back `len` bytes of scratch space in the child's address space, lazily mapping a
    /// fresh page the first time it's needed (via [`crate::tracer::Tracer::inject_syscall`]),
    /// then bumping a cursor into it on every subsequent call.
    pub fn alloc_mem(&mut self, len: usize) -> Result<u64> {
        if len > SCRATCH_SIZE {
            return Err(ErrorKind::BadArgument).context("requested scratch allocation exceeds the scratch region size");
        }

        if self.scratch.base.is_none() {
            let prot = (libc::PROT_READ | libc::PROT_WRITE) as u64;
            let flags = (libc::MAP_PRIVATE | libc::MAP_ANONYMOUS) as u64;
            let addr = self.subprocess.tracer_mut().inject_syscall(
                libc::SYS_mmap as i64,
                [0, SCRATCH_SIZE as u64, prot, flags, u64::MAX, 0],
            )?;
            if addr < 0 {
                return Err(ErrorKind::SyscallFailure).context("injected mmap failed");
            }
            self.scratch.base = Some(addr as u64);
        }

        let base = self.scratch.base.unwrap();
        if self.scratch.next_offset + len > SCRATCH_SIZE {
            return Err(ErrorKind::BadArgument).context("scratch region exhausted");
        }

        let addr = base + self.scratch.next_offset as u64;
        self.scratch.next_offset += len;
        Ok(addr)
    }

    /// Drains and returns everything the child has written to stdout so far, as raw bytes --
    /// a test binary can legitimately write non-UTF-8 data, which a `String`-typed result would
    /// have to reject. Destructive: a second call only sees output written after the first.
    pub fn stdout(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.subprocess.read_stdout(timeout)
    }

    /// Drains and returns everything the child has written to stderr so far, the stderr
    /// counterpart of [`Program::stdout`].
    pub fn stderr(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.subprocess.read_stderr(timeout)
    }

    pub fn send_stdin(&mut self, s: &str) -> Result<()> {
        self.subprocess.send_stdin(s)
    }

    pub fn syscall_records(&self) -> &[SyscallRecord] {
        self.subprocess.tracer().syscall_records()
    }

    pub fn wait_for_exit(&mut self, timeout: Duration) -> Result<i32> {
        self.subprocess.wait_for_exit(timeout)
    }
}

/// A single trap instruction: `int3` on `x86_64`, `brk #0` on `aarch64`.
fn trap_instruction(arch: SupportedArch) -> Vec<u8> {
    match arch {
        SupportedArch::X86_64 => vec![0xcc],
        SupportedArch::Aarch64 => vec![0x00, 0x00, 0x20, 0xd4],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_allocator_bumps_within_one_page() {
        let mut alloc = ScratchAllocator::new();
        alloc.base = Some(0x4000);
        alloc.next_offset += 8;
        assert_eq!(alloc.base.unwrap() + alloc.next_offset as u64, 0x4008);
    }
}
