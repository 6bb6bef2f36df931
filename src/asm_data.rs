//! Non-owning handles onto typed values living in a traced child's address space.
//!
//! `AsmData<T>` plays the role of the original's `AsmData<T>` template. Rust's borrow checker
//! replaces the original's runtime "the `Program` must outlive every `AsmData` derived from it"
//! contract: every handle here holds a `&'a Program` (or `&'a mut Program` for allocation),
//! which the compiler enforces can't outlive its `Program`.

use log::debug;

use crate::error::{ErrorKind, Result, ResultExt};
use crate::program::Program;
use crate::value_serde::{Buffer, MemoryIoCompatible, MemorySerde};

/// A typed view onto `size_of::<T>()` bytes at a fixed address in a [`Program`]'s address
/// space.
pub struct AsmData<'a, T> {
    program: &'a Program,
    address: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<'a, T: MemorySerde> AsmData<'a, T> {
    pub fn new(program: &'a Program, address: u64) -> Self {
        AsmData {
            program,
            address,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub(crate) fn program(&self) -> &'a Program {
        self.program
    }

    /// Reads the value currently stored at this address.
    pub fn get_value(&self) -> Result<T> {
        let value = T::read(&self.program.memory_io(), self.address)?;
        debug!("read value at {:#x}", self.address);
        Ok(value)
    }

    /// Writes `val` (anything [`MemoryIoCompatible`] with `T`) and returns the value that was
    /// previously stored there.
    pub fn set_value<U: MemoryIoCompatible<T>>(&self, val: U) -> Result<T> {
        let prev = self.get_value().context("could not read previous data value")?;
        let wire = val.into_wire();
        self.program
            .write_memory(self.address, &wire.to_bytes())
            .context("could not set data value")?;
        Ok(prev)
    }
}

impl<'a, T: MemorySerde + Default> AsmData<'a, T> {
    /// Zeros the value at this address, returning its previous contents.
    pub fn zero(&self) -> Result<T> {
        let prev = self.get_value().context("could not read previous data value")?;
        let default = T::default();
        self.program.write_memory(self.address, &default.to_bytes())?;
        Ok(prev)
    }
}

/// An [`AsmData`] whose address was resolved from a named symbol rather than supplied directly,
/// surfacing a resolution failure the first time the value is read rather than at construction.
pub struct AsmSymbol<'a, T> {
    name: String,
    resolved: std::result::Result<AsmData<'a, T>, ErrorKind>,
}

impl<'a, T: MemorySerde> AsmSymbol<'a, T> {
    pub fn resolved(name: impl Into<String>, program: &'a Program, address: u64) -> Self {
        AsmSymbol {
            name: name.into(),
            resolved: Ok(AsmData::new(program, address)),
        }
    }

    pub fn unresolved(name: impl Into<String>, kind: ErrorKind) -> Self {
        AsmSymbol {
            name: name.into(),
            resolved: Err(kind),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_value(&self) -> Result<T> {
        match &self.resolved {
            Ok(data) => data.get_value(),
            Err(kind) => Err(*kind).context(format!("symbol '{}' did not resolve", self.name)),
        }
    }
}

/// A fixed-size, allocate-on-first-use scratch buffer in the child's address space. Mirrors the
/// original's `AsmBuffer<NumBytes>`.
pub struct AsmBuffer<'a, const N: usize> {
    program: &'a mut Program,
    address: Option<u64>,
}

impl<'a, const N: usize> AsmBuffer<'a, N> {
    pub fn new(program: &'a mut Program) -> Self {
        AsmBuffer { program, address: None }
    }

    fn alloced_address(&mut self) -> Result<u64> {
        if let Some(addr) = self.address {
            return Ok(addr);
        }
        let addr = self.program.alloc_mem(N)?;
        self.address = Some(addr);
        Ok(addr)
    }

    pub fn size(&self) -> usize {
        N
    }

    pub fn str(&mut self) -> Result<String> {
        let addr = self.alloced_address()?;
        let bytes = self.program.read_memory(addr, N)?;
        let buf = Buffer::<N>::from_bytes(&bytes)?;
        buf.str()
    }

    /// Fills the buffer with `byte`, returning the previous contents.
    pub fn fill(&mut self, byte: u8) -> Result<Buffer<N>> {
        let addr = self.alloced_address()?;
        let prev_bytes = self.program.read_memory(addr, N)?;
        let prev = Buffer::<N>::from_bytes(&prev_bytes)?;
        self.program.write_memory(addr, &crate::byte_block::ByteBlock::from(vec![byte; N]))?;
        Ok(prev)
    }

    pub fn address(&mut self) -> Result<u64> {
        self.alloced_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asm_symbol_propagates_resolution_failure() {
        let sym: AsmSymbol<'_, u32> = AsmSymbol::unresolved("missing", ErrorKind::UnresolvedSymbol);
        let err = sym.get_value().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnresolvedSymbol);
    }
}
