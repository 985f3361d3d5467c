//! Ghost exchange and boundary handling for matrices.

use super::StructMatrix;
use super::layout::{ConstantCoefficient, MatrixLayout};
use crate::algs::comm_info::CommInfo;
use crate::algs::comm_pkg::CommPkg;
use crate::algs::communicator::{Communicator, tags};
use crate::data::scalar::Scalar;
use crate::data::storage::Storage;
use crate::geometry::box_loop::BoxLoop;
use crate::geometry::grid_box::{BoxArray, GridBox};
use crate::geometry::index::{self, Index};
use crate::grid::StructGrid;
use crate::struct_error::StructError;

/// Zero entry `s` of box `b` over `region` (data-space coordinates).
fn zero_entry<T: Scalar>(layout: &MatrixLayout, data: &mut [T], b: usize, s: usize, region: &GridBox) {
    let dbox = layout.data_space.get(b);
    let base = layout.data_indices[b][s];
    let lp = BoxLoop::new(region.size(), [(dbox, region.imin(), index::unit_stride())]);
    lp.for_each(|[di]| data[(base + di as isize) as usize] = T::zero());
}

/// Points of `b` whose neighbor at `offset` lies outside every grid box
/// (periodic images count as inside).
fn boundary_for_offset(grid: &StructGrid, b: &GridBox, offset: Index) -> BoxArray {
    let shifted = b.shift(offset);
    let neighbors: Vec<GridBox> = grid
        .manager()
        .intersect(&shifted)
        .into_iter()
        .map(|e| e.extent)
        .collect();
    let mut outside = BoxArray::from_boxes(vec![shifted]);
    outside.subtract_array(&neighbors);
    outside.map(|r| r.shift(index::neg(offset)))
}

impl<T: Scalar, S: Storage<T>> StructMatrix<T, S> {
    /// Finish assembly.
    ///
    /// Unless every entry is constant, ghost points that lie outside the
    /// grid get the identity row (diagonal 1), and ghost coefficients are
    /// filled from the boxes that own them. The exchange schedule is built
    /// on the first call and reused.
    pub fn assemble<C: Communicator>(&mut self, comm: &C) -> Result<(), StructError> {
        let grid = self.grid.clone();
        let layout = self
            .layout
            .as_ref()
            .ok_or(StructError::NotInitialized("StructMatrix"))?;
        let data = self
            .data
            .as_mut()
            .ok_or(StructError::NotInitialized("StructMatrix"))?
            .as_mut_slice();
        if self.constant_coefficient == ConstantCoefficient::All {
            return Ok(());
        }

        if let Some(diag) = layout.stencil.diag_rank().filter(|&d| !layout.constant[d]) {
            let one = T::one();
            for (i, dbox_range) in layout.data_boxes.iter().enumerate() {
                let neighbors: Vec<GridBox> = grid
                    .manager()
                    .intersect(dbox_range)
                    .into_iter()
                    .map(|e| e.extent)
                    .collect();
                let mut boundary = BoxArray::from_boxes(vec![*dbox_range]);
                boundary.subtract_array(&neighbors);

                let dbox = layout.data_space.get(i);
                let base = layout.data_indices[i][diag] as usize;
                let block = &mut data[base..base + dbox.volume()];
                for r in &boundary {
                    let r = layout.map_box(r);
                    let lp = BoxLoop::new(r.size(), [(dbox, r.imin(), index::unit_stride())]);
                    lp.for_each_mut(block, |v, _| *v = one);
                }
            }
        }

        if self.comm_pkg.is_none() {
            let mut info = CommInfo::from_num_ghost(&grid, &layout.num_ghost);
            if layout.domain_is_coarse {
                info = info.map_floor(layout.dmap);
            }
            self.comm_pkg = Some(CommPkg::new(
                info,
                &layout.data_space,
                &layout.data_space,
                layout.num_values,
                tags::MATRIX_GHOST,
            ));
        }
        log::debug!(
            "assemble: {} boxes, {} values per point",
            layout.data_space.len(),
            layout.num_values
        );
        let vdata = data.get_mut(layout.vdata_offset()..).unwrap_or_default();
        match &self.comm_pkg {
            Some(pkg) => pkg.exchange_in_place(comm, vdata),
            None => Ok(()),
        }
    }

    /// Zero the ghost layer of every stored per-point entry.
    pub fn clear_ghost_values(&mut self) -> Result<(), StructError> {
        let grid = self.grid.clone();
        let (layout, data) = self.parts_mut()?;
        for (i, gbox) in grid.boxes().iter().enumerate() {
            let dbox = layout.data_space.get(i);
            let ghosts = dbox.subtract(&layout.map_box(gbox));
            for s in 0..layout.stencil.size() {
                if !layout.is_stored(s) || layout.constant[s] {
                    continue;
                }
                for g in &ghosts {
                    zero_entry(layout, data, i, s, g);
                }
            }
        }
        Ok(())
    }

    /// Zero every coefficient that couples a grid point to a point outside
    /// the grid. Constant entries are left alone.
    pub fn clear_boundary(&mut self) -> Result<(), StructError> {
        let grid = self.grid.clone();
        let (layout, data) = self.parts_mut()?;
        let ndim = layout.stencil.ndim();
        for (s, &offset) in layout.stencil.shape().iter().enumerate() {
            if index::is_zero(offset, ndim) || layout.constant[s] {
                continue;
            }
            for (i, gbox) in grid.boxes().iter().enumerate() {
                for r in &boundary_for_offset(&grid, gbox, offset) {
                    zero_entry(layout, data, i, s, &layout.map_box(r));
                }
            }
        }
        Ok(())
    }
}
