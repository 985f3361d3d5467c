//! Structured vectors: one value per grid point, stored per ghosted box.

use std::sync::Arc;

use crate::algs::comm_info::CommInfo;
use crate::algs::comm_pkg::CommPkg;
use crate::algs::communicator::{Communicator, tags};
use crate::data::action::{ValueAction, ValueScope};
use crate::data::scalar::Scalar;
use crate::data::storage::{OwnedStorage, Storage, VecStorage};
use crate::debug_invariants::DebugInvariants;
use crate::geometry::box_loop::BoxLoop;
use crate::geometry::grid_box::{BoxArray, GridBox};
use crate::geometry::index::{self, GhostWidth, Index};
use crate::grid::StructGrid;
use crate::struct_error::StructError;

#[derive(Clone, Debug)]
pub(crate) struct VectorLayout {
    pub(crate) data_space: BoxArray,
    pub(crate) data_indices: Vec<usize>,
    pub(crate) data_size: usize,
}

/// A vector over a [`StructGrid`].
#[derive(Debug)]
pub struct StructVector<T: Scalar, S: Storage<T> = VecStorage<T>> {
    grid: Arc<StructGrid>,
    num_ghost: GhostWidth,
    layout: Option<VectorLayout>,
    data: Option<S>,
    owns_data: bool,
    comm_pkg: Option<CommPkg>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar, S: Storage<T>> StructVector<T, S> {
    pub fn new(grid: Arc<StructGrid>) -> Self {
        Self {
            num_ghost: grid.num_ghost(),
            grid,
            layout: None,
            data: None,
            owns_data: false,
            comm_pkg: None,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn grid(&self) -> &Arc<StructGrid> {
        &self.grid
    }

    pub fn num_ghost(&self) -> GhostWidth {
        self.num_ghost
    }

    pub fn set_num_ghost(&mut self, num_ghost: GhostWidth) -> Result<(), StructError> {
        if self.layout.is_some() {
            return Err(StructError::LayoutFrozen("num_ghost"));
        }
        self.num_ghost = num_ghost;
        Ok(())
    }

    /// Number of points over all ranks.
    pub fn global_size(&self) -> usize {
        self.grid.global_size()
    }

    pub fn owns_data(&self) -> bool {
        self.owns_data
    }

    /// Compute the storage layout; idempotent.
    pub fn initialize_shell(&mut self) {
        if self.layout.is_some() {
            return;
        }
        let data_space = self.grid.boxes().map(|b| b.grow(&self.num_ghost));
        let mut data_indices = Vec::with_capacity(data_space.len());
        let mut data_size = 0;
        for b in &data_space {
            data_indices.push(data_size);
            data_size += b.volume();
        }
        self.layout = Some(VectorLayout {
            data_space,
            data_indices,
            data_size,
        });
    }

    /// Adopt caller-provided storage of exactly `data_size` elements.
    pub fn initialize_data(&mut self, storage: S) -> Result<(), StructError> {
        self.initialize_shell();
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

    pub fn is_initialized(&self) -> bool {
        self.data.is_some()
    }

    pub(crate) fn layout(&self) -> Result<&VectorLayout, StructError> {
        self.layout.as_ref().ok_or(StructError::NotInitialized("StructVector"))
    }

    pub fn data_space(&self) -> Result<&BoxArray, StructError> {
        Ok(&self.layout()?.data_space)
    }

    pub fn data_size(&self) -> Result<usize, StructError> {
        Ok(self.layout()?.data_size)
    }

    /// Whole flat buffer.
    pub fn data(&self) -> Result<&[T], StructError> {
        self.data
            .as_ref()
            .map(Storage::as_slice)
            .ok_or(StructError::NotInitialized("StructVector"))
    }

    pub fn data_mut(&mut self) -> Result<&mut [T], StructError> {
        self.data
            .as_mut()
            .map(Storage::as_mut_slice)
            .ok_or(StructError::NotInitialized("StructVector"))
    }

    pub(crate) fn parts_mut(&mut self) -> Result<(&VectorLayout, &mut [T]), StructError> {
        let layout = self.layout.as_ref().ok_or(StructError::NotInitialized("StructVector"))?;
        let data = self
            .data
            .as_mut()
            .ok_or(StructError::NotInitialized("StructVector"))?;
        Ok((layout, data.as_mut_slice()))
    }

    /// Values of local box `i`, ghost layer included.
    pub fn box_data(&self, i: usize) -> Result<&[T], StructError> {
        let layout = self.layout()?;
        let data = self.data()?;
        let start = layout.data_indices[i];
        Ok(&data[start..start + layout.data_space.get(i).volume()])
    }

    /// Apply `action` to the value at `index`.
    pub fn point_value(
        &mut self,
        index: Index,
        value: &mut T,
        action: ValueAction,
        scope: ValueScope,
    ) -> Result<(), StructError> {
        let grid = self.grid.clone();
        let (layout, data) = self.parts_mut()?;
        let boxes = if scope.outside {
            &layout.data_space
        } else {
            grid.boxes()
        };
        for i in scope.range(boxes.len()) {
            if boxes.get(i).contains(index) {
                let k = layout.data_indices[i] + layout.data_space.get(i).index_rank(index);
                action.apply(&mut data[k], value);
            }
        }
        Ok(())
    }

    /// Apply `action` over `region`; `values` is laid out over `region`,
    /// dimension 0 fastest.
    pub fn box_values(
        &mut self,
        region: &GridBox,
        values: &mut [T],
        action: ValueAction,
        scope: ValueScope,
    ) -> Result<(), StructError> {
        if values.len() < region.volume() {
            return Err(StructError::ValueLengthMismatch {
                expected: region.volume(),
                found: values.len(),
            });
        }
        let grid = self.grid.clone();
        let (layout, data) = self.parts_mut()?;
        let boxes = if scope.outside {
            &layout.data_space
        } else {
            grid.boxes()
        };
        for i in scope.range(boxes.len()) {
            let int = region.intersect(boxes.get(i));
            if int.is_empty() {
                continue;
            }
            let base = layout.data_indices[i];
            let lp = BoxLoop::new(
                int.size(),
                [
                    (layout.data_space.get(i), int.imin(), index::unit_stride()),
                    (region, int.imin(), index::unit_stride()),
                ],
            );
            lp.for_each(|[di, vi]| action.apply(&mut data[base + di], &mut values[vi]));
        }
        Ok(())
    }

    pub fn set_value(&mut self, index: Index, mut value: T) -> Result<(), StructError> {
        self.point_value(index, &mut value, ValueAction::Set, ValueScope::default())
    }

    pub fn add_to_value(&mut self, index: Index, mut value: T) -> Result<(), StructError> {
        self.point_value(index, &mut value, ValueAction::Add, ValueScope::default())
    }

    /// Value at `index`, or zero when no local box holds it.
    pub fn get_value(&mut self, index: Index) -> Result<T, StructError> {
        let mut v = T::zero();
        self.point_value(index, &mut v, ValueAction::Get, ValueScope::with_ghosts())?;
        Ok(v)
    }

    pub fn set_box_values(&mut self, region: &GridBox, values: &[T]) -> Result<(), StructError> {
        let mut vals = values.to_vec();
        self.box_values(region, &mut vals, ValueAction::Set, ValueScope::default())
    }

    pub fn get_box_values(&mut self, region: &GridBox) -> Result<Vec<T>, StructError> {
        let mut vals = vec![T::zero(); region.volume()];
        self.box_values(region, &mut vals, ValueAction::Get, ValueScope::default())?;
        Ok(vals)
    }

    /// Set every grid point (not ghosts) to `value`.
    pub fn set_constant_values(&mut self, value: T) -> Result<(), StructError> {
        let grid = self.grid.clone();
        let (layout, data) = self.parts_mut()?;
        for (i, b) in grid.boxes().iter().enumerate() {
            let base = layout.data_indices[i];
            let dbox = layout.data_space.get(i);
            let lp = BoxLoop::new(b.size(), [(dbox, b.imin(), index::unit_stride())]);
            let end = base + dbox.volume();
            lp.for_each_mut(&mut data[base..end], |v, _| *v = value);
        }
        Ok(())
    }

    /// Zero every ghost value.
    pub fn clear_ghost_values(&mut self) -> Result<(), StructError> {
        let grid = self.grid.clone();
        let (layout, data) = self.parts_mut()?;
        for (i, b) in grid.boxes().iter().enumerate() {
            let base = layout.data_indices[i];
            let dbox = layout.data_space.get(i);
            let end = base + dbox.volume();
            for ghost in dbox.subtract(b) {
                let lp = BoxLoop::new(ghost.size(), [(dbox, ghost.imin(), index::unit_stride())]);
                lp.for_each_mut(&mut data[base..end], |v, _| *v = T::zero());
            }
        }
        Ok(())
    }

    /// Fill ghost layers from neighboring boxes (and periodic images).
    pub fn assemble<C: Communicator>(&mut self, comm: &C) -> Result<(), StructError> {
        let layout = self
            .layout
            .as_ref()
            .ok_or(StructError::NotInitialized("StructVector"))?;
        if self.comm_pkg.is_none() {
            let info = CommInfo::from_num_ghost(&self.grid, &self.num_ghost);
            self.comm_pkg = Some(CommPkg::new(
                info,
                &layout.data_space,
                &layout.data_space,
                1,
                tags::VECTOR_GHOST,
            ));
        }
        let data = self
            .data
            .as_mut()
            .ok_or(StructError::NotInitialized("StructVector"))?
            .as_mut_slice();
        match &self.comm_pkg {
            Some(pkg) => pkg.exchange_in_place(comm, data),
            None => Ok(()),
        }
    }

    /// Multiply every grid point by `alpha`.
    pub fn scale(&mut self, alpha: T) -> Result<(), StructError> {
        let grid = self.grid.clone();
        let (layout, data) = self.parts_mut()?;
        for (i, b) in grid.boxes().iter().enumerate() {
            let base = layout.data_indices[i];
            let dbox = layout.data_space.get(i);
            let lp = BoxLoop::new(b.size(), [(dbox, b.imin(), index::unit_stride())]);
            lp.for_each_mut(&mut data[base..base + dbox.volume()], |v, _| *v *= alpha);
        }
        Ok(())
    }
}

impl<T: Scalar, S: OwnedStorage<T>> StructVector<T, S> {
    /// Lay out and allocate a zeroed buffer.
    pub fn initialize(&mut self) -> Result<(), StructError> {
        self.initialize_shell();
        let size = self.data_size()?;
        self.data = Some(S::with_len(size, T::zero()));
        self.owns_data = true;
        crate::debug_invariants!(self.validate_invariants(), "StructVector::initialize");
        Ok(())
    }
}

impl<T: Scalar, S: Storage<T>> DebugInvariants for StructVector<T, S> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "StructVector");
    }

    fn validate_invariants(&self) -> Result<(), StructError> {
        let Some(layout) = &self.layout else {
            return Ok(());
        };
        if layout.data_space.len() != self.grid.boxes().len() {
            return Err(StructError::DataSizeMismatch {
                expected: self.grid.boxes().len(),
                found: layout.data_space.len(),
            });
        }
        for (i, (d, g)) in layout.data_space.iter().zip(self.grid.boxes()).enumerate() {
            if !d.contains_box(g) {
                return Err(StructError::InsufficientGhost { box_index: i });
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
