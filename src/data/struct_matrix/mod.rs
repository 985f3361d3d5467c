//! Structured matrices: one stencil row per grid point.
//!
//! A [`StructMatrix`] couples every point `p` of its range grid with the
//! points `p + shape[s]` of its domain grid. Coefficients are stored per
//! stencil entry, either per point over the ghosted box (variable entries)
//! or once for the whole matrix (constant entries). A symmetric matrix
//! stores only one entry of each transpose pair and reads the other one
//! at the neighboring point.
//!
//! Lifecycle:
//! 1. [`StructMatrix::new`], then optional setters or
//!    [`StructMatrix::with_options`];
//! 2. [`StructMatrix::initialize`] (or `initialize_shell` +
//!    `initialize_data`) freezes the layout;
//! 3. value operations;
//! 4. [`StructMatrix::assemble`] fills ghost coefficients.

mod assemble;
pub mod entry;
pub mod layout;
mod migrate;
mod values;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use entry::StencilEntry;
pub use layout::{ConstantCoefficient, MatrixLayout};

use crate::algs::comm_pkg::CommPkg;
use crate::data::scalar::Scalar;
use crate::data::storage::{OwnedStorage, Storage, VecStorage};
use crate::debug_invariants::DebugInvariants;
use crate::geometry::grid_box::BoxArray;
use crate::geometry::index::{GhostWidth, Index};
use crate::grid::StructGrid;
use crate::stencil::StructStencil;
use crate::struct_error::StructError;
use layout::LayoutRequest;

/// Layout options, applied before the layout is computed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructMatrixOptions {
    /// Store one entry per transpose pair.
    pub symmetric: bool,
    /// Ghost widths; the grid's widths when `None`.
    pub num_ghost: Option<GhostWidth>,
    /// Stencil entries (by user-stencil position) that are constant.
    pub constant_entries: Vec<usize>,
    /// Range refinement ratio.
    pub rmap: Index,
    /// Domain refinement ratio.
    pub dmap: Index,
}

impl Default for StructMatrixOptions {
    fn default() -> Self {
        Self {
            symmetric: false,
            num_ghost: None,
            constant_entries: Vec::new(),
            rmap: [1, 1, 1],
            dmap: [1, 1, 1],
        }
    }
}

/// A matrix over a [`StructGrid`].
#[derive(Debug)]
pub struct StructMatrix<T: Scalar, S: Storage<T> = VecStorage<T>> {
    grid: Arc<StructGrid>,
    domain_grid: Arc<StructGrid>,
    user_stencil: StructStencil,
    symmetric: bool,
    num_ghost: GhostWidth,
    rmap: Index,
    dmap: Index,
    /// Per user-stencil entry.
    constant: Vec<bool>,
    constant_coefficient: ConstantCoefficient,
    layout: Option<MatrixLayout>,
    data: Option<S>,
    owns_data: bool,
    comm_pkg: Option<CommPkg>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar, S: Storage<T>> StructMatrix<T, S> {
    /// Square matrix on `grid` with stencil `stencil`.
    pub fn new(grid: Arc<StructGrid>, stencil: StructStencil) -> Self {
        let n = stencil.size();
        Self {
            num_ghost: grid.num_ghost(),
            domain_grid: grid.clone(),
            grid,
            user_stencil: stencil,
            symmetric: false,
            rmap: [1, 1, 1],
            dmap: [1, 1, 1],
            constant: vec![false; n],
            constant_coefficient: ConstantCoefficient::None,
            layout: None,
            data: None,
            owns_data: false,
            comm_pkg: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// Apply `options` to a matrix that has no layout yet. Invalid constant
    /// patterns are logged and ignored; use
    /// [`StructMatrix::set_constant_entries`] to see the error.
    pub fn with_options(mut self, options: StructMatrixOptions) -> Self {
        self.symmetric = options.symmetric;
        if let Some(ng) = options.num_ghost {
            self.num_ghost = ng;
        }
        self.rmap = options.rmap;
        self.dmap = options.dmap;
        if let Err(e) = self.set_constant_entries(&options.constant_entries) {
            log::warn!("ignoring constant entries {:?}: {e}", options.constant_entries);
        }
        self
    }

    fn check_mutable(&self, what: &'static str) -> Result<(), StructError> {
        if self.layout.is_some() {
            Err(StructError::LayoutFrozen(what))
        } else {
            Ok(())
        }
    }

    pub fn set_num_ghost(&mut self, num_ghost: GhostWidth) -> Result<(), StructError> {
        self.check_mutable("num_ghost")?;
        self.num_ghost = num_ghost;
        Ok(())
    }

    /// Use a distinct domain grid (rectangular matrix).
    pub fn set_domain_grid(&mut self, grid: Arc<StructGrid>) -> Result<(), StructError> {
        self.check_mutable("domain_grid")?;
        if grid.ndim() != self.grid.ndim() {
            return Err(StructError::InvalidDimension(grid.ndim()));
        }
        self.domain_grid = grid;
        Ok(())
    }

    pub fn set_rmap(&mut self, rmap: Index) -> Result<(), StructError> {
        self.check_mutable("rmap")?;
        self.rmap = rmap;
        Ok(())
    }

    pub fn set_dmap(&mut self, dmap: Index) -> Result<(), StructError> {
        self.check_mutable("dmap")?;
        self.dmap = dmap;
        Ok(())
    }

    pub fn set_symmetric(&mut self, symmetric: bool) -> Result<(), StructError> {
        self.check_mutable("symmetric")?;
        self.symmetric = symmetric;
        Ok(())
    }

    /// Mark the listed user-stencil entries constant and every other entry
    /// variable. The result must be one of the classes of
    /// [`ConstantCoefficient`].
    pub fn set_constant_entries(&mut self, entries: &[usize]) -> Result<(), StructError> {
        self.check_mutable("constant_entries")?;
        let size = self.user_stencil.size();
        let mut constant = vec![false; size];
        for &e in entries {
            if e >= size {
                return Err(StructError::StencilIndexOutOfRange { entry: e, size });
            }
            constant[e] = true;
        }
        self.constant_coefficient = ConstantCoefficient::classify(&self.user_stencil, &constant)?;
        self.constant = constant;
        Ok(())
    }

    /// Mark all entries constant (`All`), all but the diagonal
    /// (`AllButDiagonal`) or none.
    pub fn set_constant_coefficient(&mut self, cc: ConstantCoefficient) -> Result<(), StructError> {
        let diag = self.user_stencil.diag_rank();
        let entries: Vec<usize> = match cc {
            ConstantCoefficient::None => Vec::new(),
            ConstantCoefficient::All => (0..self.user_stencil.size()).collect(),
            ConstantCoefficient::AllButDiagonal => (0..self.user_stencil.size())
                .filter(|&s| Some(s) != diag)
                .collect(),
        };
        self.set_constant_entries(&entries)
    }

    pub fn grid(&self) -> &Arc<StructGrid> {
        &self.grid
    }

    pub fn domain_grid(&self) -> &Arc<StructGrid> {
        &self.domain_grid
    }

    /// The stencil as given by the caller.
    pub fn user_stencil(&self) -> &StructStencil {
        &self.user_stencil
    }

    /// The full stencil (mirrors included) once the layout exists, else the
    /// user stencil.
    pub fn stencil(&self) -> &StructStencil {
        match &self.layout {
            Some(l) => &l.stencil,
            None => &self.user_stencil,
        }
    }

    pub fn symmetric(&self) -> bool {
        match &self.layout {
            Some(l) => l.symmetric,
            None => self.symmetric,
        }
    }

    /// Ghost widths, including symmetric-storage widening once laid out.
    pub fn num_ghost(&self) -> GhostWidth {
        match &self.layout {
            Some(l) => l.num_ghost,
            None => self.num_ghost,
        }
    }

    pub fn rmap(&self) -> Index {
        self.rmap
    }

    pub fn dmap(&self) -> Index {
        self.dmap
    }

    pub fn constant_coefficient(&self) -> ConstantCoefficient {
        self.constant_coefficient
    }

    /// Whether full-stencil entry `s` is constant.
    pub fn is_constant_entry(&self, s: usize) -> bool {
        match &self.layout {
            Some(l) => l.constant.get(s).copied().unwrap_or(false),
            None => self.constant.get(s).copied().unwrap_or(false),
        }
    }

    pub fn owns_data(&self) -> bool {
        self.owns_data
    }

    pub fn is_initialized(&self) -> bool {
        self.data.is_some()
    }

    /// Compute the storage layout. Idempotent; later calls return the
    /// existing layout untouched.
    pub fn initialize_shell(&mut self) -> Result<(), StructError> {
        if self.layout.is_some() {
            return Ok(());
        }
        let layout = MatrixLayout::compute(LayoutRequest {
            grid: &self.grid,
            user_stencil: &self.user_stencil,
            constant: &self.constant,
            symmetric: self.symmetric,
            num_ghost: self.num_ghost,
            rmap: self.rmap,
            dmap: self.dmap,
        })?;
        self.layout = Some(layout);
        Ok(())
    }

    /// Adopt caller-provided storage of exactly `data_size` elements.
    pub fn initialize_data(&mut self, storage: S) -> Result<(), StructError> {
        self.initialize_shell()?;
        let expected = self.data_size()?;
        if storage.len() != expected {
            return Err(StructError::DataSizeMismatch {
                expected,
                found: storage.len(),
            });
        }
        self.data = Some(storage);
        self.owns_data = false;
        Ok(())
    }

    pub fn layout(&self) -> Result<&MatrixLayout, StructError> {
        self.layout
            .as_ref()
            .ok_or(StructError::NotInitialized("StructMatrix"))
    }

    pub fn data_space(&self) -> Result<&BoxArray, StructError> {
        Ok(&self.layout()?.data_space)
    }

    pub fn data_size(&self) -> Result<usize, StructError> {
        Ok(self.layout()?.data_size)
    }

    /// Number of per-point values stored for each grid point.
    pub fn num_values(&self) -> Result<usize, StructError> {
        Ok(self.layout()?.num_values)
    }

    /// Number of coefficients over all ranks (grid points × stencil size).
    pub fn global_size(&self) -> Result<usize, StructError> {
        Ok(self.layout()?.global_size)
    }

    /// Whole flat buffer: constant slots first, then per-box blocks.
    pub fn data(&self) -> Result<&[T], StructError> {
        self.data
            .as_ref()
            .map(Storage::as_slice)
            .ok_or(StructError::NotInitialized("StructMatrix"))
    }

    pub fn data_mut(&mut self) -> Result<&mut [T], StructError> {
        self.data
            .as_mut()
            .map(Storage::as_mut_slice)
            .ok_or(StructError::NotInitialized("StructMatrix"))
    }

    pub(crate) fn parts_mut(&mut self) -> Result<(&MatrixLayout, &mut [T]), StructError> {
        let layout = self
            .layout
            .as_ref()
            .ok_or(StructError::NotInitialized("StructMatrix"))?;
        let data = self
            .data
            .as_mut()
            .ok_or(StructError::NotInitialized("StructMatrix"))?;
        Ok((layout, data.as_mut_slice()))
    }

    pub(crate) fn parts(&self) -> Result<(&MatrixLayout, &[T]), StructError> {
        Ok((self.layout()?, self.data()?))
    }
}

impl<T: Scalar, S: OwnedStorage<T>> StructMatrix<T, S> {
    /// Lay out and allocate a zeroed buffer.
    pub fn initialize(&mut self) -> Result<(), StructError> {
        self.initialize_shell()?;
        let size = self.data_size()?;
        self.data = Some(S::with_len(size, T::zero()));
        self.owns_data = true;
        crate::debug_invariants!(self.validate_invariants(), "StructMatrix::initialize");
        Ok(())
    }
}

impl<T: Scalar, S: Storage<T>> DebugInvariants for StructMatrix<T, S> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "StructMatrix");
    }

    fn validate_invariants(&self) -> Result<(), StructError> {
        let Some(layout) = &self.layout else {
            return Ok(());
        };
        let nboxes = self.grid.boxes().len();
        if layout.data_space.len() != nboxes || layout.data_indices.len() != nboxes {
            return Err(StructError::DataSizeMismatch {
                expected: nboxes,
                found: layout.data_space.len(),
            });
        }
        for (i, (d, g)) in layout.data_boxes.iter().zip(self.grid.boxes()).enumerate() {
            if !d.contains_box(g) {
                return Err(StructError::InsufficientGhost { box_index: i });
            }
        }
        // every stored variable block lies inside the buffer
        for (b, idx) in layout.data_indices.iter().enumerate() {
            let vol = layout.data_space.get(b).volume() as isize;
            for (s, &start) in idx.iter().enumerate() {
                if layout.is_stored(s) && !layout.constant[s] && start + vol > layout.data_size as isize {
                    return Err(StructError::DataSizeMismatch {
                        expected: (start + vol) as usize,
                        found: layout.data_size,
                    });
                }
            }
        }
        if let Some(data) = &self.data {
            if data.len() != layout.data_size {
                return Err(StructError::DataSizeMismatch {
                    expected: layout.data_size,
                    found: data.len(),
                });
            }
        }
        Ok(())
    }
}
