//! Storage layout of a structured matrix.
//!
//! The flat buffer starts with one slot per stencil entry for constant
//! coefficients, followed by a block per local box holding each stored
//! variable entry over the box's ghosted extent. Mirror entries of a
//! symmetric matrix own no storage: they read their transpose partner at the
//! neighboring point.

use crate::geometry::grid_box::BoxArray;
use crate::geometry::index::{self, GhostWidth, Index};
use crate::grid::StructGrid;
use crate::stencil::StructStencil;
use crate::struct_error::StructError;

/// Whole-matrix constant-coefficient class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConstantCoefficient {
    /// Every entry varies per point.
    #[default]
    None,
    /// Every entry is constant.
    All,
    /// Every entry except the diagonal is constant.
    AllButDiagonal,
}

impl ConstantCoefficient {
    /// Numeric tag used in files (0, 1, 2).
    pub fn tag(self) -> u8 {
        match self {
            ConstantCoefficient::None => 0,
            ConstantCoefficient::All => 1,
            ConstantCoefficient::AllButDiagonal => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ConstantCoefficient::None),
            1 => Some(ConstantCoefficient::All),
            2 => Some(ConstantCoefficient::AllButDiagonal),
            _ => None,
        }
    }

    /// Classify a per-entry constant mask.
    pub fn classify(stencil: &StructStencil, constant: &[bool]) -> Result<Self, StructError> {
        let size = stencil.size();
        let nconst = constant.iter().filter(|&&c| c).count();
        if nconst == 0 {
            return Ok(ConstantCoefficient::None);
        }
        if nconst >= size {
            return Ok(ConstantCoefficient::All);
        }
        match stencil.diag_rank() {
            Some(d) if !constant[d] && nconst == size - 1 => Ok(ConstantCoefficient::AllButDiagonal),
            _ => Err(StructError::InvalidConstantPattern {
                nconst,
                stencil_size: size,
            }),
        }
    }
}

/// Which index space holds the matrix's storage.
///
/// Returns whether the domain grid is the coarse one, or an error when the
/// maps contradict each other.
pub fn domain_is_coarse(ndim: usize, rmap: Index, dmap: Index) -> Result<Option<bool>, StructError> {
    let mut coarse: Option<bool> = None;
    for d in 0..ndim {
        let (r, m) = (rmap[d], dmap[d]);
        if r <= 0 || m <= 0 {
            return Err(StructError::InconsistentMaps { rmap, dmap });
        }
        if r > m {
            if coarse == Some(true) || r % m != 0 {
                return Err(StructError::InconsistentMaps { rmap, dmap });
            }
            coarse = Some(false);
        } else if m > r {
            if coarse == Some(false) || m % r != 0 {
                return Err(StructError::InconsistentMaps { rmap, dmap });
            }
            coarse = Some(true);
        }
    }
    Ok(coarse)
}

/// Inputs to [`MatrixLayout::compute`].
pub(crate) struct LayoutRequest<'a> {
    pub grid: &'a StructGrid,
    pub user_stencil: &'a StructStencil,
    pub constant: &'a [bool],
    pub symmetric: bool,
    pub num_ghost: GhostWidth,
    pub rmap: Index,
    pub dmap: Index,
}

/// Everything derived from grid, stencil and options before data exists.
#[derive(Clone, Debug)]
pub struct MatrixLayout {
    pub(crate) stencil: StructStencil,
    pub(crate) symm_elements: Vec<Option<usize>>,
    pub(crate) constant: Vec<bool>,
    pub(crate) symmetric: bool,
    pub(crate) domain_is_coarse: bool,
    pub(crate) dmap: Index,
    pub(crate) num_values: usize,
    pub(crate) num_cvalues: usize,
    pub(crate) num_ghost: GhostWidth,
    /// Ghosted grid boxes in range index space.
    pub(crate) data_boxes: BoxArray,
    /// `data_boxes`, mapped into domain index space when the domain is coarse.
    pub(crate) data_space: BoxArray,
    pub(crate) data_indices: Vec<Vec<isize>>,
    pub(crate) data_size: usize,
    pub(crate) global_size: usize,
}

impl MatrixLayout {
    pub(crate) fn compute(req: LayoutRequest<'_>) -> Result<Self, StructError> {
        let ndim = req.grid.ndim();
        if req.user_stencil.ndim() != ndim {
            return Err(StructError::InvalidDimension(req.user_stencil.ndim()));
        }

        let coarse = domain_is_coarse(ndim, req.rmap, req.dmap)?;
        let domain_is_coarse = coarse == Some(true);
        let mut symmetric = req.symmetric;
        if coarse.is_some() && symmetric {
            log::warn!("rectangular matrix cannot use symmetric storage; storing all entries");
            symmetric = false;
        }

        let (stencil, symm_elements, constant) = if symmetric {
            let (full, symm) = req.user_stencil.symmetrize();
            let mut constant = req.constant.to_vec();
            constant.resize(full.size(), false);
            for (j, s) in symm.iter().enumerate() {
                if let Some(i) = *s {
                    constant[j] = constant[i];
                }
            }
            (full, symm, constant)
        } else {
            let n = req.user_stencil.size();
            (req.user_stencil.clone(), vec![None; n], req.constant.to_vec())
        };

        let stored = |j: usize| symm_elements[j].is_none();
        let num_values = (0..stencil.size()).filter(|&j| stored(j) && !constant[j]).count();
        let num_cvalues = (0..stencil.size()).filter(|&j| stored(j) && constant[j]).count();

        let mut num_ghost = req.num_ghost;
        if symmetric {
            for (j, s) in stencil.shape().iter().enumerate() {
                if symm_elements[j].is_some() {
                    for d in 0..ndim {
                        num_ghost[2 * d] = num_ghost[2 * d].max(req.num_ghost[2 * d] - s[d]);
                        num_ghost[2 * d + 1] =
                            num_ghost[2 * d + 1].max(req.num_ghost[2 * d + 1] + s[d]);
                    }
                }
            }
        }

        let data_boxes = req.grid.boxes().map(|b| b.grow(&num_ghost));
        let data_space = if domain_is_coarse {
            data_boxes.map(|b| b.map_floor(req.dmap))
        } else {
            data_boxes.clone()
        };

        let stencil_size = stencil.size();
        let mut data_indices = Vec::with_capacity(data_space.len());
        let mut data_size = stencil_size;
        for b in &data_space {
            let vol = b.volume();
            let mut idx = vec![0isize; stencil_size];
            for j in 0..stencil_size {
                if stored(j) {
                    if constant[j] {
                        idx[j] = j as isize;
                    } else {
                        idx[j] = data_size as isize;
                        data_size += vol;
                    }
                }
            }
            for j in 0..stencil_size {
                if let Some(i) = symm_elements[j] {
                    idx[j] = if constant[j] {
                        idx[i]
                    } else {
                        idx[i] + b.offset_distance(stencil.offset(j))
                    };
                }
            }
            data_indices.push(idx);
        }
        if data_space.is_empty() {
            data_size = 0;
        }

        let global_size = req.grid.global_size() * stencil_size;
        log::debug!(
            "matrix layout: stencil {stencil_size} ({num_values} variable, {num_cvalues} constant stored), \
             {} boxes, data_size {data_size}, ghost {num_ghost:?}",
            data_space.len()
        );

        Ok(Self {
            stencil,
            symm_elements,
            constant,
            symmetric,
            domain_is_coarse,
            dmap: req.dmap,
            num_values,
            num_cvalues,
            num_ghost,
            data_boxes,
            data_space,
            data_indices,
            data_size,
            global_size,
        })
    }

    /// Map a range-space index into data space.
    #[inline]
    pub(crate) fn map_index(&self, index: Index) -> Index {
        if self.domain_is_coarse {
            index::map_floor(index, self.dmap, self.stencil.ndim())
        } else {
            index
        }
    }

    #[inline]
    pub(crate) fn map_box(&self, b: &crate::geometry::grid_box::GridBox) -> crate::geometry::grid_box::GridBox {
        if self.domain_is_coarse {
            b.map_floor(self.dmap)
        } else {
            *b
        }
    }

    #[inline]
    pub(crate) fn is_stored(&self, entry: usize) -> bool {
        self.symm_elements[entry].is_none()
    }

    /// Offset where the variable data region begins.
    #[inline]
    pub(crate) fn vdata_offset(&self) -> usize {
        self.stencil.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::grid_box::GridBox;
    use crate::grid::StructGridBuilder;

    fn grid(boxes: &[(i32, i32)]) -> std::sync::Arc<StructGrid> {
        let mut b = StructGridBuilder::new(1);
        for &(lo, hi) in boxes {
            b = b.add_box(0, GridBox::new(1, [lo, 0, 0], [hi, 0, 0]));
        }
        b.build(0).unwrap()
    }

    fn st(offs: &[i32]) -> StructStencil {
        StructStencil::new(1, offs.iter().map(|&o| [o, 0, 0]).collect()).unwrap()
    }

    fn req<'a>(
        g: &'a StructGrid,
        s: &'a StructStencil,
        c: &'a [bool],
        symmetric: bool,
    ) -> LayoutRequest<'a> {
        LayoutRequest {
            grid: g,
            user_stencil: s,
            constant: c,
            symmetric,
            num_ghost: g.num_ghost(),
            rmap: [1, 1, 1],
            dmap: [1, 1, 1],
        }
    }

    #[test]
    fn maps_classification() {
        assert_eq!(domain_is_coarse(2, [1, 1, 1], [1, 1, 1]), Ok(None));
        assert_eq!(domain_is_coarse(2, [1, 1, 1], [2, 2, 1]), Ok(Some(true)));
        assert_eq!(domain_is_coarse(2, [2, 1, 1], [1, 1, 1]), Ok(Some(false)));
        assert!(domain_is_coarse(2, [2, 1, 1], [1, 2, 1]).is_err());
        assert!(domain_is_coarse(1, [1, 1, 1], [3, 1, 1]).is_ok());
        assert!(domain_is_coarse(1, [2, 1, 1], [3, 1, 1]).is_err());
    }

    #[test]
    fn constant_classification() {
        let s = st(&[-1, 0, 1]);
        assert_eq!(
            ConstantCoefficient::classify(&s, &[false; 3]),
            Ok(ConstantCoefficient::None)
        );
        assert_eq!(
            ConstantCoefficient::classify(&s, &[true; 3]),
            Ok(ConstantCoefficient::All)
        );
        assert_eq!(
            ConstantCoefficient::classify(&s, &[true, false, true]),
            Ok(ConstantCoefficient::AllButDiagonal)
        );
        assert!(ConstantCoefficient::classify(&s, &[true, false, false]).is_err());
        assert!(ConstantCoefficient::classify(&s, &[false, true, true]).is_err());
    }

    #[test]
    fn plain_layout_offsets() {
        let g = grid(&[(0, 3), (10, 11)]);
        let s = st(&[-1, 0, 1]);
        let l = MatrixLayout::compute(req(&g, &s, &[false; 3], false)).unwrap();
        // box 0 data volume 6, box 1 volume 4
        assert_eq!(l.data_indices[0], vec![3, 9, 15]);
        assert_eq!(l.data_indices[1], vec![21, 25, 29]);
        assert_eq!(l.data_size, 33);
        assert_eq!(l.global_size, 18);
        assert_eq!(l.num_values, 3);
    }

    #[test]
    fn symmetric_layout_aliases_mirror() {
        let g = grid(&[(0, 3)]);
        let s = st(&[-1, 0, 1]);
        let l = MatrixLayout::compute(req(&g, &s, &[false; 3], true)).unwrap();
        assert_eq!(l.symm_elements, vec![None, None, Some(0)]);
        assert_eq!(l.num_values, 2);
        // +1 mirror needs one more layer on the high side
        assert_eq!(&l.num_ghost[..2], &[1, 2]);
        let vol: usize = 7;
        assert_eq!(l.data_indices[0][0], 3);
        assert_eq!(l.data_indices[0][1], 3 + vol as isize);
        assert_eq!(l.data_indices[0][2], 3 + 1);
        assert_eq!(l.data_size, 3 + 2 * vol);
    }

    #[test]
    fn constant_entries_use_front_slots() {
        let g = grid(&[(0, 3)]);
        let s = st(&[-1, 0, 1]);
        let l = MatrixLayout::compute(req(&g, &s, &[true, false, true], false)).unwrap();
        assert_eq!(l.data_indices[0], vec![0, 3, 2]);
        assert_eq!(l.num_values, 1);
        assert_eq!(l.num_cvalues, 2);
    }

    #[test]
    fn empty_grid_has_no_data() {
        let g = StructGridBuilder::new(1)
            .add_box(1, GridBox::new(1, [0, 0, 0], [3, 0, 0]))
            .build(0)
            .unwrap();
        let s = st(&[0]);
        let l = MatrixLayout::compute(req(&g, &s, &[false], false)).unwrap();
        assert_eq!(l.data_size, 0);
        assert!(l.data_indices.is_empty());
        assert_eq!(l.global_size, 4);
    }

    #[test]
    fn rectangular_forces_nonsymmetric() {
        let g = grid(&[(0, 7)]);
        let s = st(&[0, 1]);
        let mut r = req(&g, &s, &[false; 2], true);
        r.dmap = [2, 1, 1];
        let l = MatrixLayout::compute(r).unwrap();
        assert!(!l.symmetric);
        assert!(l.domain_is_coarse);
        assert_eq!(l.data_space.get(0).imin()[0], -1);
        assert_eq!(l.data_space.get(0).imax()[0], 4);
    }
}
