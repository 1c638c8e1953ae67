//! Fixed, little-endian wire types for the peer exchange.
//!
//! Query and reply payloads are packed arrays of 32-bit local indices.
//! All multi-byte integers are stored pre-LE and decoded with `from_le`.

use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn cast_slice_from<T: Pod>(v: &[u8]) -> &[T] {
    bytemuck::cast_slice(v)
}

/// One 32-bit local index on the wire; queries carry encoded element
/// positions, replies carry owner-local run ids.
#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireIndex {
    idx_le: u32,
}

impl WireIndex {
    #[inline]
    pub fn of(idx: u32) -> Self {
        Self { idx_le: idx.to_le() }
    }
    #[inline]
    pub fn get(&self) -> u32 {
        u32::from_le(self.idx_le)
    }
}

/// A per-rank owned-node count carried by the collective exchange.
#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    n_le: u32,
}

impl WireCount {
    #[inline]
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    #[inline]
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

// Pod/Zeroable ensures no padding contains uninit when cast to bytes.
const _: () = {
    assert!(size_of::<WireIndex>() == 4);
    assert!(size_of::<WireCount>() == 4);
};
