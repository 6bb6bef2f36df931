//! Per-architecture ABI facts.
//!
//! Mirrors the teacher's `SupportedArch`/`Arch::CLONE`-style "ABI as an associated-constant
//! bag" pattern, but scoped down to the two architectures this spec supports: both are 64-bit
//! and little-endian, so unlike the teacher's x86/x64 split there is no narrowing step, only a
//! different register mapping.

/// The CPU architectures this harness can attach to and invoke functions on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SupportedArch {
    X86_64,
    Aarch64,
}

impl SupportedArch {
    /// The architecture this binary was built for; used to pick a default when the target
    /// executable's own architecture can't yet be determined (e.g. before it's parsed).
    #[cfg(target_arch = "x86_64")]
    pub const NATIVE: SupportedArch = SupportedArch::X86_64;
    #[cfg(target_arch = "aarch64")]
    pub const NATIVE: SupportedArch = SupportedArch::Aarch64;

    /// Machine word size in bytes. Both supported architectures are 64-bit.
    pub const fn word_size(self) -> usize {
        8
    }

    /// Number of integer/pointer argument registers available to `AsmFunction` before it must
    /// refuse with `BadArgument`. System V AMD64 and AAPCS64 both reserve six.
    pub const fn max_call_arity(self) -> usize {
        6
    }

    /// The ELF `e_machine` value expected for this architecture, used by [`crate::symbol`] to
    /// sanity-check that the executable matches a supported ABI.
    pub const fn elf_machine(self) -> u16 {
        match self {
            SupportedArch::X86_64 => goblin::elf::header::EM_X86_64,
            SupportedArch::Aarch64 => goblin::elf::header::EM_AARCH64,
        }
    }

    pub fn from_elf_machine(machine: u16) -> Option<SupportedArch> {
        match machine {
            m if m == goblin::elf::header::EM_X86_64 => Some(SupportedArch::X86_64),
            m if m == goblin::elf::header::EM_AARCH64 => Some(SupportedArch::Aarch64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elf_machine_round_trips() {
        for arch in [SupportedArch::X86_64, SupportedArch::Aarch64] {
            assert_eq!(SupportedArch::from_elf_machine(arch.elf_machine()), Some(arch));
        }
    }

    #[test]
    fn both_archs_are_64_bit() {
        assert_eq!(SupportedArch::X86_64.word_size(), 8);
        assert_eq!(SupportedArch::Aarch64.word_size(), 8);
    }
}
