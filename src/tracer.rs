//! The debugger-style process tracer: attach, single-step, continue-to-syscall, and read/write
//! registers, built on `nix::sys::ptrace` and `nix::sys::wait`.
//!
//! The continue-and-wait loop below plays the same role as the teacher's `__ptrace_cont` in
//! `replay_syscall.rs` (assert a syscall-stop actually landed on the syscall we expected, retry
//! on spurious group-stops), generalized to also serve plain single-stepping and the
//! run-to-breakpoint mode `AsmFunction` needs.

use std::time::{Duration, Instant};

use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::byte_block::ByteBlock;
use crate::error::{ErrorKind, Result, ResultExt};
use crate::memory_io::{MemoryIo, PtraceMemoryIo};
use crate::registers::{Aarch64Regs, Registers, X86_64Regs};

/// A single syscall the traced task made while a [`Tracer`] was driving it, recorded for
/// later inspection by a test body (`ctx.get_syscall_records()` in the usage scenarios).
#[derive(Clone, Debug)]
pub struct SyscallRecord {
    pub number: i64,
    pub args: [u64; 6],
    pub result: i64,
}

/// The outcome of letting a traced task run under [`Tracer::run`] / [`Tracer::run_until`].
#[derive(Clone, Debug)]
pub enum RunResult {
    /// The task hit the stop condition the caller was waiting for (a breakpoint trap, a
    /// matching syscall, or the predicate in [`Tracer::run_until`] returning `true`).
    Stopped,
    /// The task exited normally with the given status code.
    Exited(i32),
    /// The task was killed by a signal.
    Signaled(Signal),
    /// Neither condition was reached before the timeout elapsed.
    TimedOut,
}

/// A syscall-entry stop's register state, held until the matching exit stop supplies a result.
struct PendingSyscall {
    number: i64,
    args: [u64; 6],
}

/// Drives a single traced task via `ptrace`.
pub struct Tracer {
    pid: Pid,
    arch: crate::arch::SupportedArch,
    syscalls: Vec<SyscallRecord>,
    /// Set by `translate_status` on every stop; true only for a genuine syscall-entry/exit stop
    /// (`PTRACE_O_TRACESYSGOOD` set), false for anything else (e.g. the `AsmFunction` re-entry
    /// breakpoint), so `continue_to_syscall` knows when entry/exit pairing actually applies.
    last_stop_was_syscall: bool,
    pending_syscall: Option<PendingSyscall>,
}

impl Tracer {
    /// Wraps an already-stopped, already-`PTRACE_TRACEME`d child. Callers (namely
    /// [`crate::subprocess::TracedSubprocess`]) are responsible for the fork/exec/SIGSTOP
    /// dance; the tracer only takes over once the child is known to be stopped.
    pub fn new(pid: Pid, arch: crate::arch::SupportedArch) -> Self {
        Tracer {
            pid,
            arch,
            syscalls: Vec::new(),
            last_stop_was_syscall: false,
            pending_syscall: None,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn memory_io(&self) -> PtraceMemoryIo {
        PtraceMemoryIo::new(self.pid)
    }

    pub fn syscall_records(&self) -> &[SyscallRecord] {
        &self.syscalls
    }

    /// Applies `PTRACE_SETOPTIONS` with the flags this harness always wants: exit tracing so a
    /// callee that calls `exit`/`exit_group` is observed rather than silently reaped, and
    /// `PTRACE_O_TRACESYSGOOD` so a syscall-stop's status carries the high bit that tells it
    /// apart from an ordinary `SIGTRAP` (the `AsmFunction` re-entry breakpoint, most notably).
    pub fn set_default_options(&self) -> Result<()> {
        ptrace::setoptions(
            self.pid,
            ptrace::Options::PTRACE_O_TRACEEXIT | ptrace::Options::PTRACE_O_TRACESYSGOOD,
        )
        .map_err(|_| ErrorKind::SyscallFailure)
        .context("PTRACE_SETOPTIONS")
    }

    pub fn read_registers(&self) -> Result<Registers> {
        match self.arch {
            crate::arch::SupportedArch::X86_64 => {
                let raw = ptrace::getregs(self.pid)
                    .map_err(|_| ErrorKind::SyscallFailure)
                    .context("PTRACE_GETREGS")?;
                Ok(Registers::X86_64(unsafe {
                    std::mem::transmute_copy::<_, X86_64Regs>(&raw)
                }))
            }
            crate::arch::SupportedArch::Aarch64 => {
                let raw = ptrace::getregs(self.pid)
                    .map_err(|_| ErrorKind::SyscallFailure)
                    .context("PTRACE_GETREGS")?;
                Ok(Registers::Aarch64(unsafe {
                    std::mem::transmute_copy::<_, Aarch64Regs>(&raw)
                }))
            }
        }
    }

    pub fn write_registers(&self, regs: &Registers) -> Result<()> {
        match regs {
            Registers::X86_64(r) => {
                let raw = unsafe { std::mem::transmute_copy::<_, libc::user_regs_struct>(r) };
                ptrace::setregs(self.pid, raw)
                    .map_err(|_| ErrorKind::SyscallFailure)
                    .context("PTRACE_SETREGS")
            }
            Registers::Aarch64(r) => {
                let raw = unsafe { std::mem::transmute_copy::<_, libc::user_regs_struct>(r) };
                ptrace::setregs(self.pid, raw)
                    .map_err(|_| ErrorKind::SyscallFailure)
                    .context("PTRACE_SETREGS")
            }
        }
    }

    /// Single-steps one machine instruction and waits for the resulting stop.
    pub fn single_step(&mut self) -> Result<RunResult> {
        ptrace::step(self.pid, None)
            .map_err(|_| ErrorKind::SyscallFailure)
            .context("PTRACE_SINGLESTEP")?;
        self.wait_for_stop(None)
    }

    /// Runs until the task stops for any reason (signal-delivery-stop, syscall-stop, or exit),
    /// with an optional deadline.
    pub fn run(&mut self, timeout: Option<Duration>) -> Result<RunResult> {
        ptrace::cont(self.pid, None)
            .map_err(|_| ErrorKind::SyscallFailure)
            .context("PTRACE_CONT")?;
        self.wait_for_stop(timeout)
    }

    /// Runs with `PTRACE_SYSCALL`, stopping at the next syscall-entry or syscall-exit boundary
    /// (or at any other trap, e.g. a breakpoint). A syscall-stop's register state looks the same
    /// at entry and exit (same `orig_rax`/args), so with `PTRACE_O_TRACESYSGOOD` set we rely on
    /// the stop alternating: the first stop of a pair is recorded as pending, the second fills in
    /// the result register and completes one [`SyscallRecord`].
    ///
    /// This is the generalization of the teacher's `__ptrace_cont`: rather than asserting a
    /// specific expected syscall number (which only makes sense replaying a fixed trace), we
    /// record whatever syscall actually happened and let the caller decide what to do with it.
    pub fn continue_to_syscall(&mut self, timeout: Option<Duration>) -> Result<RunResult> {
        ptrace::syscall(self.pid, None)
            .map_err(|_| ErrorKind::SyscallFailure)
            .context("PTRACE_SYSCALL")?;
        let result = self.wait_for_stop(timeout)?;

        if matches!(result, RunResult::Stopped) && self.last_stop_was_syscall {
            let regs = self.read_registers()?;
            match self.pending_syscall.take() {
                None => {
                    self.pending_syscall = Some(PendingSyscall {
                        number: regs.syscallno(),
                        args: [
                            regs.syscall_arg(0),
                            regs.syscall_arg(1),
                            regs.syscall_arg(2),
                            regs.syscall_arg(3),
                            regs.syscall_arg(4),
                            regs.syscall_arg(5),
                        ],
                    });
                }
                Some(pending) => {
                    self.syscalls.push(SyscallRecord {
                        number: pending.number,
                        args: pending.args,
                        result: regs.syscall_result_signed(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// Repeatedly continues the task with `PTRACE_SYSCALL` (so syscalls made along the way are
    /// observed and recorded, see [`Self::continue_to_syscall`]), re-armed on every non-terminal
    /// stop, until `pred` returns `true` for the current register state, the task exits, or
    /// `timeout` elapses.
    pub fn run_until(
        &mut self,
        timeout: Duration,
        mut pred: impl FnMut(&Registers) -> bool,
    ) -> Result<RunResult> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(RunResult::TimedOut);
            }

            match self.continue_to_syscall(Some(remaining))? {
                RunResult::Stopped => {
                    let regs = self.read_registers()?;
                    if pred(&regs) {
                        return Ok(RunResult::Stopped);
                    }
                    // Not our stop condition: re-arm and keep going. A concrete harness would
                    // also need to re-inject the delivered signal here; omitted since no
                    // in-repo scenario relies on signal passthrough.
                }
                other => return Ok(other),
            }
        }
    }

    /// Waits for the next `waitpid` event for this task, translating it into a [`RunResult`].
    /// `timeout` of `None` waits indefinitely (via a blocking `waitpid`); `Some(d)` polls with
    /// `WNOHANG` until `d` elapses.
    fn wait_for_stop(&mut self, timeout: Option<Duration>) -> Result<RunResult> {
        match timeout {
            None => self.translate_status(
                waitpid(self.pid, None)
                    .map_err(|_| ErrorKind::SyscallFailure)
                    .context("waitpid")?,
            ),
            Some(d) => {
                let deadline = Instant::now() + d;
                loop {
                    match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                        Ok(WaitStatus::StillAlive) => {
                            if Instant::now() >= deadline {
                                return Ok(RunResult::TimedOut);
                            }
                            std::thread::sleep(Duration::from_millis(1));
                        }
                        Ok(status) => return self.translate_status(status),
                        Err(_) => {
                            return Err(ErrorKind::SyscallFailure).context("waitpid");
                        }
                    }
                }
            }
        }
    }

    fn translate_status(&mut self, status: WaitStatus) -> Result<RunResult> {
        self.last_stop_was_syscall = matches!(status, WaitStatus::PtraceSyscall(_));

        match status {
            WaitStatus::Exited(_, code) => Ok(RunResult::Exited(code)),
            WaitStatus::Signaled(_, sig, _) => Ok(RunResult::Signaled(sig)),
            WaitStatus::Stopped(_, _) | WaitStatus::PtraceSyscall(_) | WaitStatus::PtraceEvent(_, _, _) => {
                Ok(RunResult::Stopped)
            }
            WaitStatus::StillAlive | WaitStatus::Continued(_) => Ok(RunResult::Stopped),
        }
    }

    /// Injects and executes a single synthetic syscall in the traced task, the same way the
    /// teacher's `AutoRemoteSyscalls` does for `init_scratch_memory`'s `mmap` call: save the
    /// task's registers and the bytes currently at its instruction pointer, splice in a
    /// `syscall; trap` sequence, run it to completion, then restore both the original code and
    /// registers so the task's own execution is left undisturbed.
    ///
    /// Used by [`crate::program::Program::alloc_mem`] to carve scratch space for arguments
    /// (strings, buffers) that a synthetic [`crate::asm_function::AsmFunction`] call needs
    /// somewhere to live.
    pub fn inject_syscall(&mut self, no: i64, args: [u64; 6]) -> Result<i64> {
        let saved_regs = self.read_registers()?;
        let ip = saved_regs.ip();

        let (code, trap_offset) = trap_sequence(self.arch);
        let io = self.memory_io();
        let saved_code = io.read_block(ip, code.len())?;
        io.write_block(ip, &ByteBlock::from(code.as_slice()))?;

        let mut call_regs = saved_regs;
        call_regs.set_ip(ip);
        call_regs.set_syscallno(no);
        for (i, arg) in args.iter().enumerate() {
            call_regs.set_syscall_arg(i, *arg);
        }
        self.write_registers(&call_regs)?;

        let result = loop {
            match self.run(None)? {
                RunResult::Stopped => {
                    let regs = self.read_registers()?;
                    if regs.ip() == ip + trap_offset as u64 {
                        break regs.syscall_result_signed();
                    }
                    // A stop that isn't our own trap (e.g. a delivered signal unrelated to the
                    // injection); keep going until the trap is hit.
                }
                RunResult::Exited(_) | RunResult::Signaled(_) => {
                    return Err(ErrorKind::SyscallFailure).context("task exited during syscall injection");
                }
                RunResult::TimedOut => unreachable!("run(None) never times out"),
            }
        };

        io.write_block(ip, &saved_code)?;
        self.write_registers(&saved_regs)?;

        Ok(result)
    }
}

/// The raw machine code this harness injects to perform one syscall and trap back to the
/// tracer: `syscall; int3` on `x86_64`, `svc #0; brk #0` on `aarch64`. Returns the bytes and
/// the offset of the trap instruction from the start of the sequence (i.e. where `rip`/`pc`
/// lands once the syscall itself has completed).
fn trap_sequence(arch: crate::arch::SupportedArch) -> (Vec<u8>, usize) {
    match arch {
        crate::arch::SupportedArch::X86_64 => (vec![0x0f, 0x05, 0xcc], 2),
        crate::arch::SupportedArch::Aarch64 => {
            // svc #0 = 0xd4000001, brk #0 = 0xd4200000, both little-endian.
            (vec![0x01, 0x00, 0x00, 0xd4, 0x00, 0x00, 0x20, 0xd4], 4)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_record_stores_args_in_order() {
        let rec = SyscallRecord {
            number: 1,
            args: [1, 2, 3, 4, 5, 6],
            result: 0,
        };
        assert_eq!(rec.args[3], 4);
    }
}
