//! An architecture-generic snapshot of a traced task's general-purpose registers.
//!
//! This plays the same role as the teacher's `Registers` type (a `repr(C)` union keyed by
//! architecture, with `rd_get_reg!`/`rd_set_reg!` macros dispatching to the right field) but
//! over our two *64-bit* architectures, so there's no narrow/widen step, only a different
//! register mapping -- which the match arms below encode directly.

use crate::arch::SupportedArch;

/// Raw general-purpose registers for `x86_64`, laid out exactly as `PTRACE_GETREGS` returns
/// them (see `sys/user.h` / `libc::user_regs_struct`).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct X86_64Regs {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub orig_rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    pub rsp: u64,
    pub ss: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

/// Raw general-purpose registers for `aarch64`, matching `struct user_pt_regs` (see
/// `asm/ptrace.h`): 31 general registers, stack pointer, program counter, and pstate.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct Aarch64Regs {
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64,
}

// The tracer transmutes between these structs and `libc::user_regs_struct` on the matching
// native architecture; a size mismatch there would be silent memory corruption rather than a
// compile error, so pin it down the same way the teacher pins down its own register-union
// layout assumptions.
#[cfg(target_arch = "x86_64")]
static_assertions::assert_eq_size!(X86_64Regs, libc::user_regs_struct);
#[cfg(target_arch = "aarch64")]
static_assertions::assert_eq_size!(Aarch64Regs, libc::user_regs_struct);

impl Default for Aarch64Regs {
    fn default() -> Self {
        Aarch64Regs {
            regs: [0; 31],
            sp: 0,
            pc: 0,
            pstate: 0,
        }
    }
}

/// An architecture-tagged register snapshot.
///
/// Reading or writing an individual field always goes through an accessor below rather than
/// the raw struct, so [`crate::asm_function::AsmFunction`] doesn't need to know which
/// architecture it's targeting in order to read a syscall number or marshal a call.
#[derive(Copy, Clone, Debug)]
pub enum Registers {
    X86_64(X86_64Regs),
    Aarch64(Aarch64Regs),
}

impl Registers {
    pub fn arch(&self) -> SupportedArch {
        match self {
            Registers::X86_64(_) => SupportedArch::X86_64,
            Registers::Aarch64(_) => SupportedArch::Aarch64,
        }
    }

    /// The syscall number the child is currently entering/exiting (meaningful only at a
    /// syscall stop).
    pub fn syscallno(&self) -> i64 {
        match self {
            Registers::X86_64(r) => r.orig_rax as i64,
            Registers::Aarch64(r) => r.regs[8] as i64,
        }
    }

    pub fn set_syscallno(&mut self, no: i64) {
        match self {
            Registers::X86_64(r) => {
                r.orig_rax = no as u64;
                r.rax = no as u64;
            }
            Registers::Aarch64(r) => r.regs[8] = no as u64,
        }
    }

    /// The `i`-th (0-based) syscall argument, per the kernel syscall ABI. On `x86_64` this is
    /// `rdi,rsi,rdx,r10,r8,r9` -- argument 4 uses `r10`, not `rcx`, because the `syscall`
    /// instruction clobbers `rcx` with the return address.
    pub fn syscall_arg(&self, i: usize) -> u64 {
        match self {
            Registers::X86_64(r) => match i {
                0 => r.rdi,
                1 => r.rsi,
                2 => r.rdx,
                3 => r.r10,
                4 => r.r8,
                5 => r.r9,
                _ => panic!("syscall_arg index {i} out of range"),
            },
            Registers::Aarch64(r) => r.regs[i],
        }
    }

    pub fn set_syscall_arg(&mut self, i: usize, val: u64) {
        match self {
            Registers::X86_64(r) => {
                *(match i {
                    0 => &mut r.rdi,
                    1 => &mut r.rsi,
                    2 => &mut r.rdx,
                    3 => &mut r.r10,
                    4 => &mut r.r8,
                    5 => &mut r.r9,
                    _ => panic!("syscall_arg index {i} out of range"),
                }) = val;
            }
            Registers::Aarch64(r) => r.regs[i] = val,
        }
    }

    /// The `i`-th (0-based) argument to a normal (non-syscall) function call, per the target's
    /// C calling convention. On `x86_64` System V this is `rdi,rsi,rdx,rcx,r8,r9`; on AArch64
    /// AAPCS64, `x0..x5`.
    pub fn call_arg(&self, i: usize) -> u64 {
        match self {
            Registers::X86_64(r) => match i {
                0 => r.rdi,
                1 => r.rsi,
                2 => r.rdx,
                3 => r.rcx,
                4 => r.r8,
                5 => r.r9,
                _ => panic!("call_arg index {i} out of range"),
            },
            Registers::Aarch64(r) => r.regs[i],
        }
    }

    pub fn set_call_arg(&mut self, i: usize, val: u64) {
        match self {
            Registers::X86_64(r) => {
                *(match i {
                    0 => &mut r.rdi,
                    1 => &mut r.rsi,
                    2 => &mut r.rdx,
                    3 => &mut r.rcx,
                    4 => &mut r.r8,
                    5 => &mut r.r9,
                    _ => panic!("call_arg index {i} out of range"),
                }) = val;
            }
            Registers::Aarch64(r) => r.regs[i] = val,
        }
    }

    /// The return value register after a syscall (`rax`/`x0`), interpreted as signed so
    /// `-errno` results are visible.
    pub fn syscall_result_signed(&self) -> i64 {
        match self {
            Registers::X86_64(r) => r.rax as i64,
            Registers::Aarch64(r) => r.regs[0] as i64,
        }
    }

    pub fn set_syscall_result(&mut self, val: i64) {
        match self {
            Registers::X86_64(r) => r.rax = val as u64,
            Registers::Aarch64(r) => r.regs[0] = val as u64,
        }
    }

    /// The return value register after a function call (`rax`/`x0`).
    pub fn call_result(&self) -> u64 {
        match self {
            Registers::X86_64(r) => r.rax,
            Registers::Aarch64(r) => r.regs[0],
        }
    }

    pub fn ip(&self) -> u64 {
        match self {
            Registers::X86_64(r) => r.rip,
            Registers::Aarch64(r) => r.pc,
        }
    }

    pub fn set_ip(&mut self, addr: u64) {
        match self {
            Registers::X86_64(r) => r.rip = addr,
            Registers::Aarch64(r) => r.pc = addr,
        }
    }

    pub fn sp(&self) -> u64 {
        match self {
            Registers::X86_64(r) => r.rsp,
            Registers::Aarch64(r) => r.sp,
        }
    }

    pub fn set_sp(&mut self, addr: u64) {
        match self {
            Registers::X86_64(r) => r.rsp = addr,
            Registers::Aarch64(r) => r.sp = addr,
        }
    }

    /// Sets the register that carries the return address for a call, on architectures where
    /// the ABI puts it in a register. Returns `None` on `x86_64`, where the return address
    /// instead has to be pushed onto the stack by the caller -- `AsmFunction` handles that case
    /// itself via a memory write.
    pub fn set_link_register(&mut self, addr: u64) -> Option<()> {
        match self {
            Registers::X86_64(_) => None,
            Registers::Aarch64(r) => {
                r.regs[30] = addr;
                Some(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_64_syscall_arg4_uses_r10_not_rcx() {
        let mut regs = Registers::X86_64(X86_64Regs::default());
        regs.set_syscall_arg(3, 0xdead);
        regs.set_call_arg(3, 0xbeef);
        match regs {
            Registers::X86_64(r) => {
                assert_eq!(r.r10, 0xdead);
                assert_eq!(r.rcx, 0xbeef);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn aarch64_link_register_is_settable() {
        let mut regs = Registers::Aarch64(Aarch64Regs::default());
        assert_eq!(regs.set_link_register(0x1000), Some(()));
        assert_eq!(regs.call_arg(0), 0);
    }

    #[test]
    fn x86_64_has_no_link_register() {
        let mut regs = Registers::X86_64(X86_64Regs::default());
        assert_eq!(regs.set_link_register(0x1000), None);
    }

    #[test]
    fn arch_tag_matches_variant() {
        assert_eq!(Registers::X86_64(X86_64Regs::default()).arch(), SupportedArch::X86_64);
        assert_eq!(Registers::Aarch64(Aarch64Regs::default()).arch(), SupportedArch::Aarch64);
    }
}
