//! Fixed little-endian wire records for grid exchange, plus byte casts for
//! coefficient payloads.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

use crate::geometry::grid_box::GridBox;
use crate::geometry::index::ZERO;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Decode a received payload; copies so the source needs no alignment.
pub fn collect_from<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A grid box on the wire.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireBox {
    pub ndim_le: u32,
    pub imin_le: [i32; 3],
    pub imax_le: [i32; 3],
}

impl WireBox {
    pub fn of(b: &GridBox) -> Self {
        let (lo, hi) = (b.imin(), b.imax());
        Self {
            ndim_le: (b.ndim() as u32).to_le(),
            imin_le: [lo[0].to_le(), lo[1].to_le(), lo[2].to_le()],
            imax_le: [hi[0].to_le(), hi[1].to_le(), hi[2].to_le()],
        }
    }

    pub fn get(&self) -> GridBox {
        let mut lo = ZERO;
        let mut hi = ZERO;
        for d in 0..3 {
            lo[d] = i32::from_le(self.imin_le[d]);
            hi[d] = i32::from_le(self.imax_le[d]);
        }
        GridBox::new(u32::from_le(self.ndim_le) as usize, lo, hi)
    }
}

const_assert_eq!(size_of::<WireCount>(), 4);
const_assert_eq!(size_of::<WireBox>(), 28);
