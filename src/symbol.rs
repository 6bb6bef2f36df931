//! ELF symbol table resolution, used to translate a function or data symbol's name into its
//! runtime address in the traced child.
//!
//! Parsing is done with `goblin`, the teacher's own ELF crate (see `examples/isgasho-rd`'s
//! `Cargo.toml`); this harness only needs `goblin::elf::Elf::parse`, a far smaller slice of its
//! surface than the teacher's own trace-file format handling used.

use std::cell::RefCell;
use std::collections::HashMap;

use goblin::elf::Elf;

use crate::arch::SupportedArch;
use crate::error::{ErrorKind, Result, ResultExt};

/// A resolved symbol's load address and size, exactly as reported in the symbol table.
#[derive(Copy, Clone, Debug)]
pub struct SymbolInfo {
    pub address: u64,
    pub size: u64,
}

/// Resolves symbol names against a single ELF executable. Built once per [`crate::program::Program`]
/// and reused for every `find_function`/`find_symbol` call a test body makes.
pub struct SymbolTable {
    arch: SupportedArch,
    symbols: HashMap<String, SymbolInfo>,
    /// Negative lookups are cached too: a misspelled symbol name is a common enough grading
    /// failure mode that repeatedly re-scanning the string table for it would be wasteful.
    negative_cache: RefCell<HashMap<String, bool>>,
}

impl SymbolTable {
    /// Parses the ELF file at `path`, keeping only defined (non-undefined) symbols. Where a
    /// weak and a global symbol share a name, the global definition wins -- mirroring normal
    /// linker precedence.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|_| ErrorKind::UnknownError)
            .context(format!("reading executable at {}", path.display()))?;

        let elf = Elf::parse(&bytes)
            .map_err(|_| ErrorKind::UnknownError)
            .context(format!("parsing ELF header of {}", path.display()))?;

        let arch = SupportedArch::from_elf_machine(elf.header.e_machine)
            .ok_or(ErrorKind::UnknownError)
            .context(format!("unsupported target architecture (e_machine={})", elf.header.e_machine))?;

        let mut symbols: HashMap<String, SymbolInfo> = HashMap::new();

        for sym in elf.syms.iter() {
            if sym.st_shndx == goblin::elf::section_header::SHN_UNDEF as usize {
                continue;
            }
            let Some(name) = elf.strtab.get_at(sym.st_name) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }

            let is_weak = sym.st_bind() == goblin::elf::sym::STB_WEAK;
            match symbols.get(name) {
                Some(_) if is_weak => {
                    // a stronger definition was already recorded; keep it
                }
                _ => {
                    symbols.insert(
                        name.to_owned(),
                        SymbolInfo {
                            address: sym.st_value,
                            size: sym.st_size,
                        },
                    );
                }
            }
        }

        Ok(SymbolTable {
            arch,
            symbols,
            negative_cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn arch(&self) -> SupportedArch {
        self.arch
    }

    pub fn resolve(&self, name: &str) -> Result<SymbolInfo> {
        if *self.negative_cache.borrow().get(name).unwrap_or(&false) {
            return Err(ErrorKind::UnresolvedSymbol).context(format!("symbol '{name}' not found"));
        }

        match self.symbols.get(name) {
            Some(info) => Ok(*info),
            None => {
                self.negative_cache.borrow_mut().insert(name.to_owned(), true);
                Err(ErrorKind::UnresolvedSymbol).context(format!("symbol '{name}' not found"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_unknown_error() {
        let err = SymbolTable::load(std::path::Path::new("/nonexistent/path/to/binary")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownError);
    }
}
