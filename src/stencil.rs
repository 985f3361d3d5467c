//! Stencils: the per-row nonzero pattern of a structured matrix.
//!
//! A [`StructStencil`] is an ordered list of offsets. Entry `s` of a matrix
//! row at point `p` couples `p` with `p + shape[s]`.

use serde::{Deserialize, Serialize};

use crate::geometry::index::{self, GhostWidth, Index, MAX_DIM, ZERO};
use crate::struct_error::StructError;

/// Ordered list of stencil offsets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructStencil {
    ndim: usize,
    shape: Vec<Index>,
}

impl StructStencil {
    /// Create a stencil; offset components past `ndim` are dropped.
    pub fn new(ndim: usize, shape: Vec<Index>) -> Result<Self, StructError> {
        if !(1..=MAX_DIM).contains(&ndim) {
            return Err(StructError::InvalidDimension(ndim));
        }
        let shape = shape
            .into_iter()
            .map(|s| index::truncate(s, ndim))
            .collect();
        Ok(Self { ndim, shape })
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn shape(&self) -> &[Index] {
        &self.shape
    }

    #[inline]
    pub fn offset(&self, entry: usize) -> Index {
        self.shape[entry]
    }

    /// Position of `offset` in the stencil, if present.
    pub fn element_rank(&self, offset: Index) -> Option<usize> {
        let offset = index::truncate(offset, self.ndim);
        self.shape.iter().position(|&s| s == offset)
    }

    /// Position of the zero offset, if present.
    pub fn diag_rank(&self) -> Option<usize> {
        self.element_rank(ZERO)
    }

    /// Per-side maximum reach `[lo_0, hi_0, ...]`, never negative.
    pub fn extents(&self) -> GhostWidth {
        let mut out = [0; 2 * MAX_DIM];
        for s in &self.shape {
            for d in 0..self.ndim {
                out[2 * d] = out[2 * d].max(-s[d]);
                out[2 * d + 1] = out[2 * d + 1].max(s[d]);
            }
        }
        out
    }

    /// Complete the stencil with the transpose of every entry.
    ///
    /// Returns the full stencil and, per entry, the index of the stored
    /// entry it mirrors (`None` for stored entries). Entries whose transpose
    /// is already present are paired with it; the zero offset pairs with
    /// itself and stays stored. Missing transposes are appended.
    pub fn symmetrize(&self) -> (StructStencil, Vec<Option<usize>>) {
        let n = self.shape.len();
        let mut shape = self.shape.clone();
        let mut symm: Vec<Option<usize>> = vec![None; n];

        for i in 0..n {
            if symm[i].is_some() {
                continue;
            }
            let mirror = index::neg(shape[i]);
            let mut paired = false;
            for j in i..n {
                if shape[j] == mirror {
                    if j != i {
                        symm[j] = Some(i);
                    }
                    paired = true;
                }
            }
            if !paired {
                shape.push(mirror);
                symm.push(Some(i));
            }
        }

        (
            StructStencil {
                ndim: self.ndim,
                shape,
            },
            symm,
        )
    }
}
