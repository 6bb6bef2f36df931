//! The [`ByteBlock`]: the one type that ever crosses the host/child boundary.
//!
//! Framing the boundary as a typed serde layer built on top of a single owned-bytes type
//! (rather than ad hoc `memcpy`s of differently-shaped buffers) is what keeps
//! [`crate::asm_function::AsmFunction`] type-safe end to end.

use std::ops::{Deref, DerefMut};

/// An owned, contiguous run of raw bytes read from or destined for the child's address space.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ByteBlock(Vec<u8>);

impl ByteBlock {
    pub fn new(bytes: Vec<u8>) -> Self {
        ByteBlock(bytes)
    }

    pub fn zeroed(len: usize) -> Self {
        ByteBlock(vec![0u8; len])
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for ByteBlock {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for ByteBlock {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl From<Vec<u8>> for ByteBlock {
    fn from(v: Vec<u8>) -> Self {
        ByteBlock(v)
    }
}

impl From<&[u8]> for ByteBlock {
    fn from(v: &[u8]) -> Self {
        ByteBlock(v.to_vec())
    }
}
