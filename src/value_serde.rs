//! Typed values that can cross the memory boundary, layered on top of [`crate::byte_block`].
//!
//! The `MemoryIoCompatible<T, U>` marker mirrors the original's C++ concept of the same name:
//! `std::string` is compatible with `char*`, `std::string_view` with `const char*`, `int*` with
//! `uintptr_t`. Here that's expressed as a small set of trait impls rather than a `concept`, but
//! the intent is identical -- let `AsmData<T>::set_value` accept a convenient caller-side type
//! `U` while storing/reading the wire-compatible `T`.

use crate::byte_block::ByteBlock;
use crate::error::{ErrorKind, Result, ResultExt};
use crate::memory_io::MemoryIo;

/// Converts a value to and from the raw bytes written into / read out of a child's address
/// space. Implemented for every concrete type [`crate::asm_data::AsmData`] can be instantiated
/// with.
pub trait MemorySerde: Sized {
    /// The number of bytes this value occupies in the child's memory. Meaningless for
    /// variable-length types such as [`CStringValue`], which override [`Self::read`] instead of
    /// relying on a size known up front.
    fn wire_size() -> usize;

    fn to_bytes(&self) -> ByteBlock;

    fn from_bytes(bytes: &ByteBlock) -> Result<Self>;

    /// Reads a value of this type out of `mio` at `address`. The default implementation is
    /// correct for every fixed-size type: read exactly `wire_size()` bytes and decode them.
    /// [`CStringValue`] overrides this to scan memory a chunk at a time instead, since its
    /// length isn't known until a NUL terminator turns up.
    fn read(mio: &dyn MemoryIo, address: u64) -> Result<Self> {
        let bytes = mio.read_block(address, Self::wire_size())?;
        Self::from_bytes(&bytes)
    }
}

macro_rules! impl_memory_serde_for_int {
    ($($t:ty),* $(,)?) => {
        $(
            impl MemorySerde for $t {
                fn wire_size() -> usize {
                    std::mem::size_of::<$t>()
                }

                fn to_bytes(&self) -> ByteBlock {
                    ByteBlock::from(self.to_ne_bytes().to_vec())
                }

                fn from_bytes(bytes: &ByteBlock) -> Result<Self> {
                    let arr: [u8; std::mem::size_of::<$t>()] = bytes[..std::mem::size_of::<$t>()]
                        .try_into()
                        .map_err(|_| ErrorKind::BadArgument)
                        .context(concat!("decoding ", stringify!($t)))?;
                    Ok(<$t>::from_ne_bytes(arr))
                }
            }
        )*
    };
}

impl_memory_serde_for_int!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize);

impl<const N: usize> MemorySerde for [u8; N] {
    fn wire_size() -> usize {
        N
    }

    fn to_bytes(&self) -> ByteBlock {
        ByteBlock::from(self.to_vec())
    }

    fn from_bytes(bytes: &ByteBlock) -> Result<Self> {
        bytes[..N]
            .try_into()
            .map_err(|_| ErrorKind::BadArgument)
            .context("decoding fixed-size byte array")
    }
}

/// A NUL-terminated string value, mirroring `std::string`/`char*` in the original. The wire
/// size used by [`crate::asm_data::AsmData`] for zero-initialization is the length at
/// construction time plus one byte for the terminator; reading back scans for the terminator
/// rather than trusting that length, since the callee may have written a shorter string.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CStringValue(pub String);

impl CStringValue {
    pub fn wire_size_for(s: &str) -> usize {
        s.len() + 1
    }

    pub fn decode_from_slice(raw: &[u8]) -> Result<Self> {
        let nul_pos = memchr::memchr(0, raw).unwrap_or(raw.len());
        let s = std::str::from_utf8(&raw[..nul_pos])
            .map_err(|_| ErrorKind::BadArgument)
            .context("decoding NUL-terminated string: invalid UTF-8")?;
        Ok(CStringValue(s.to_owned()))
    }
}

/// Chunk size used by [`CStringValue::read`]'s NUL scan; arbitrary, just large enough that short
/// strings (the common case) finish in one round trip.
const STRING_READ_CHUNK: usize = 64;

/// Upper bound on how far [`CStringValue::read`] will scan looking for a terminator, so a callee
/// bug that writes an unterminated buffer can't make a read loop forever.
const STRING_READ_LIMIT: usize = 4096;

impl MemorySerde for CStringValue {
    fn wire_size() -> usize {
        // Only meaningful per-instance via `wire_size_for`; callers allocating scratch space
        // for a `CStringValue` must size it from the string they intend to write.
        0
    }

    fn to_bytes(&self) -> ByteBlock {
        let mut v = self.0.clone().into_bytes();
        v.push(0);
        ByteBlock::from(v)
    }

    fn from_bytes(bytes: &ByteBlock) -> Result<Self> {
        CStringValue::decode_from_slice(bytes)
    }

    /// Reads chunk by chunk until a NUL turns up, rather than trusting a precomputed size --
    /// there isn't one, since the callee may have written a string shorter or longer than
    /// whatever scratch space was allocated for it.
    fn read(mio: &dyn MemoryIo, address: u64) -> Result<Self> {
        let mut buf = Vec::new();

        while buf.len() < STRING_READ_LIMIT {
            let chunk = mio.read_block(address + buf.len() as u64, STRING_READ_CHUNK)?;
            if let Some(pos) = memchr::memchr(0, &chunk) {
                buf.extend_from_slice(&chunk[..pos]);
                let s = std::str::from_utf8(&buf)
                    .map_err(|_| ErrorKind::BadArgument)
                    .context("decoding NUL-terminated string: invalid UTF-8")?;
                return Ok(CStringValue(s.to_owned()));
            }
            buf.extend_from_slice(&chunk);
        }

        Err(ErrorKind::BadArgument).context("NUL-terminated string exceeded the read length limit")
    }
}

/// A fixed-size, *non*-terminated run of bytes, for symbols or buffers whose length is known
/// statically but which aren't guaranteed to carry a trailing NUL. Mirrors the original's
/// `NonTermString<Length>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NonTermString<const N: usize> {
    pub bytes: [u8; N],
}

impl<const N: usize> NonTermString<N> {
    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes)
            .map_err(|_| ErrorKind::BadArgument)
            .context("decoding non-terminated string: invalid UTF-8")
    }
}

impl<const N: usize> MemorySerde for NonTermString<N> {
    fn wire_size() -> usize {
        N
    }

    fn to_bytes(&self) -> ByteBlock {
        ByteBlock::from(self.bytes.to_vec())
    }

    fn from_bytes(bytes: &ByteBlock) -> Result<Self> {
        let arr: [u8; N] = bytes[..N]
            .try_into()
            .map_err(|_| ErrorKind::BadArgument)
            .context("decoding non-terminated string")?;
        Ok(NonTermString { bytes: arr })
    }
}

/// A fixed-capacity scratch buffer, the wire form of [`crate::asm_data::AsmBuffer`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Buffer<const N: usize> {
    pub bytes: [u8; N],
}

impl<const N: usize> Buffer<N> {
    pub fn zeroed() -> Self {
        Buffer { bytes: [0u8; N] }
    }

    /// Interprets the buffer as a NUL-terminated (or buffer-length-terminated) string, the way
    /// the original's `AsmBuffer::str()` does.
    pub fn str(&self) -> Result<String> {
        let nul_pos = memchr::memchr(0, &self.bytes).unwrap_or(N);
        std::str::from_utf8(&self.bytes[..nul_pos])
            .map(str::to_owned)
            .map_err(|_| ErrorKind::BadArgument)
            .context("decoding buffer as string: invalid UTF-8")
    }
}

impl<const N: usize> Default for Buffer<N> {
    fn default() -> Self {
        Buffer::zeroed()
    }
}

impl<const N: usize> MemorySerde for Buffer<N> {
    fn wire_size() -> usize {
        N
    }

    fn to_bytes(&self) -> ByteBlock {
        ByteBlock::from(self.bytes.to_vec())
    }

    fn from_bytes(bytes: &ByteBlock) -> Result<Self> {
        let arr: [u8; N] = bytes[..N]
            .try_into()
            .map_err(|_| ErrorKind::BadArgument)
            .context("decoding buffer")?;
        Ok(Buffer { bytes: arr })
    }
}

/// Marks that a caller-facing type `Self` can be used anywhere a wire type `T` is expected,
/// converting at the boundary. Mirrors `MemoryIOCompatible<U, T>` from the original: `&str` is
/// compatible with [`CStringValue`], `String` likewise, and any fixed-size byte array is
/// compatible with itself.
pub trait MemoryIoCompatible<T: MemorySerde> {
    fn into_wire(self) -> T;
}

impl MemoryIoCompatible<CStringValue> for &str {
    fn into_wire(self) -> CStringValue {
        CStringValue(self.to_owned())
    }
}

impl MemoryIoCompatible<CStringValue> for String {
    fn into_wire(self) -> CStringValue {
        CStringValue(self)
    }
}

impl<const N: usize> MemoryIoCompatible<[u8; N]> for [u8; N] {
    fn into_wire(self) -> [u8; N] {
        self
    }
}

macro_rules! impl_int_self_compat {
    ($($t:ty),* $(,)?) => {
        $(
            impl MemoryIoCompatible<$t> for $t {
                fn into_wire(self) -> $t {
                    self
                }
            }
        )*
    };
}

impl_int_self_compat!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_integers() {
        let bytes = 0x1234_5678u32.to_bytes();
        assert_eq!(u32::from_bytes(&bytes).unwrap(), 0x1234_5678u32);
    }

    #[test]
    fn cstring_decodes_up_to_first_nul() {
        let raw = ByteBlock::from(b"hi\0garbage".to_vec());
        let s = CStringValue::from_bytes(&raw).unwrap();
        assert_eq!(s.0, "hi");
    }

    #[test]
    fn buffer_str_stops_at_nul_or_capacity() {
        let mut buf: Buffer<8> = Buffer::zeroed();
        buf.bytes[..5].copy_from_slice(b"abcde");
        assert_eq!(buf.str().unwrap(), "abcde");
    }

    #[test]
    fn non_term_string_requires_full_width_utf8() {
        let nts = NonTermString { bytes: *b"hello!!!" };
        assert_eq!(nts.as_str().unwrap(), "hello!!!");
    }

    #[test]
    fn str_into_wire_round_trips() {
        let wire: CStringValue = "abc".into_wire();
        assert_eq!(wire.0, "abc");
    }
}
