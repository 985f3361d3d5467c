//! Where a stencil entry's coefficients live.

use super::StructMatrix;
use crate::data::scalar::Scalar;
use crate::data::storage::Storage;
use crate::geometry::index::Index;
use crate::struct_error::StructError;

/// Location of one stencil entry's coefficients for one local box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StencilEntry {
    /// Per-point coefficients owned by this entry. The value at point `p`
    /// is at `base + rank(p)` in the box's data space.
    Stored { base: usize },
    /// One coefficient shared by every point.
    Constant { slot: usize },
    /// Per-point coefficients borrowed from the transpose entry `of`,
    /// read at the neighboring point. `base` is already shifted, so the
    /// value at `p` is again `base + rank(p)`.
    Mirror { of: usize, base: isize },
}

impl StencilEntry {
    /// Flat index of the coefficient for the point of rank `rank` in the
    /// box's data space.
    #[inline]
    pub fn index(&self, rank: usize) -> usize {
        match *self {
            StencilEntry::Stored { base } => base + rank,
            StencilEntry::Constant { slot } => slot,
            StencilEntry::Mirror { base, .. } => (base + rank as isize) as usize,
        }
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        matches!(self, StencilEntry::Constant { .. })
    }
}

impl<T: Scalar, S: Storage<T>> StructMatrix<T, S> {
    /// Storage of entry `s` in local box `b`.
    pub fn entry(&self, b: usize, s: usize) -> Result<StencilEntry, StructError> {
        let layout = self.layout()?;
        let size = layout.stencil.size();
        if s >= size {
            return Err(StructError::StencilIndexOutOfRange { entry: s, size });
        }
        let nboxes = layout.data_indices.len();
        let idx = layout
            .data_indices
            .get(b)
            .ok_or(StructError::BoxIndexOutOfRange { boxnum: b, nboxes })?[s];
        Ok(match layout.symm_elements[s] {
            _ if layout.constant[s] => StencilEntry::Constant { slot: idx as usize },
            Some(of) => StencilEntry::Mirror { of, base: idx },
            None => StencilEntry::Stored { base: idx as usize },
        })
    }

    /// Storage of the entry with stencil offset `offset` in local box `b`,
    /// or `None` when the full stencil has no such offset.
    pub fn entry_for_offset(
        &self,
        b: usize,
        offset: Index,
    ) -> Result<Option<StencilEntry>, StructError> {
        let layout = self.layout()?;
        match layout.stencil.element_rank(offset) {
            Some(s) => self.entry(b, s).map(Some),
            None => Ok(None),
        }
    }

    /// All entries of local box `b`, in full-stencil order.
    pub(crate) fn box_entries(&self, b: usize) -> Result<Vec<StencilEntry>, StructError> {
        let size = self.layout()?.stencil.size();
        (0..size).map(|s| self.entry(b, s)).collect()
    }
}
