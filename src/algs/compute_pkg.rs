//! Compute packages: split each box into work that can start before the
//! ghost exchange completes and work that has to wait for it.
//!
//! A point is *independent* when its whole stencil footprint lies inside
//! its own box, so only owned values of the input vector are read. The
//! remaining points form the *dependent* region. Both regions are projected
//! onto the base lattice (`base_index + k * base_stride`) so that strided
//! callers only visit the points they compute.

use bytemuck::Pod;

use crate::algs::comm_info::CommInfo;
use crate::algs::comm_pkg::{CommHandle, CommPkg};
use crate::algs::communicator::{Communicator, tags};
use crate::geometry::grid_box::{BoxArray, GridBox};
use crate::geometry::index::{self, GhostWidth, Index, MAX_DIM};
use crate::grid::StructGrid;
use crate::stencil::StructStencil;
use crate::struct_error::StructError;

/// Shrink `b` by the stencil reach on every side.
fn independent_part(b: &GridBox, reach: &GhostWidth) -> GridBox {
    let mut shrink = [0; 2 * MAX_DIM];
    for (s, r) in shrink.iter_mut().zip(reach.iter()) {
        *s = -r;
    }
    b.grow(&shrink)
}

/// Overlap plan for one (grid, stencil, input data space, stride) combination.
#[derive(Clone, Debug)]
pub struct ComputePkg {
    comm_pkg: CommPkg,
    indt_boxes: Vec<BoxArray>,
    dept_boxes: Vec<BoxArray>,
    stride: Index,
}

impl ComputePkg {
    /// Plan for reading a vector laid out over `x_data_space` through
    /// `stencil` at the points of `grid` congruent to `base_index` modulo
    /// `base_stride`.
    pub fn new(
        grid: &StructGrid,
        stencil: &StructStencil,
        x_data_space: &BoxArray,
        base_index: Index,
        base_stride: Index,
    ) -> Self {
        let reach = stencil.extents();
        let mut indt_boxes = Vec::with_capacity(grid.boxes().len());
        let mut dept_boxes = Vec::with_capacity(grid.boxes().len());
        for b in grid.boxes() {
            let indt = independent_part(b, &reach);
            let dept: BoxArray = if indt.is_empty() {
                BoxArray::from_boxes(vec![*b])
            } else {
                b.subtract(&indt).into_iter().collect()
            };
            let project = |r: &GridBox| r.project(base_index, base_stride);
            let indt: BoxArray = std::iter::once(indt)
                .filter(|r| !r.is_empty())
                .map(|r| project(&r))
                .filter(|r| !r.is_empty())
                .collect();
            let dept: BoxArray = dept
                .iter()
                .map(project)
                .filter(|r| !r.is_empty())
                .collect();
            indt_boxes.push(indt);
            dept_boxes.push(dept);
        }

        let info = CommInfo::from_num_ghost(grid, &reach);
        let comm_pkg = CommPkg::new(info, x_data_space, x_data_space, 1, tags::VECTOR_GHOST);
        log::debug!(
            "compute pkg: {} boxes, stride {base_stride:?}, {} indt / {} dept regions",
            grid.boxes().len(),
            indt_boxes.iter().map(BoxArray::len).sum::<usize>(),
            dept_boxes.iter().map(BoxArray::len).sum::<usize>()
        );
        Self {
            comm_pkg,
            indt_boxes,
            dept_boxes,
            stride: base_stride,
        }
    }

    /// Unit-stride plan over every grid point.
    pub fn unit(grid: &StructGrid, stencil: &StructStencil, x_data_space: &BoxArray) -> Self {
        Self::new(grid, stencil, x_data_space, index::ZERO, index::unit_stride())
    }

    /// Independent regions per local box.
    pub fn indt_boxes(&self) -> &[BoxArray] {
        &self.indt_boxes
    }

    /// Dependent regions per local box.
    pub fn dept_boxes(&self) -> &[BoxArray] {
        &self.dept_boxes
    }

    /// Regions for phase `0` (independent) or `1` (dependent).
    pub(crate) fn phase_boxes(&self, phase: usize) -> &[BoxArray] {
        if phase == 0 {
            &self.indt_boxes
        } else {
            &self.dept_boxes
        }
    }

    pub fn stride(&self) -> Index {
        self.stride
    }

    pub fn comm_pkg(&self) -> &CommPkg {
        &self.comm_pkg
    }

    /// Start the ghost exchange of `x`; never blocks.
    pub fn initialize<'p, C: Communicator, T: Pod>(
        &'p self,
        comm: &C,
        x: &[T],
    ) -> Result<CommHandle<'p, C, T>, StructError> {
        self.comm_pkg.initialize(comm, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::StructGridBuilder;

    fn pkg(lo: i32, hi: i32, stride: i32) -> ComputePkg {
        let grid = StructGridBuilder::new(1)
            .add_box(0, GridBox::new(1, [lo, 0, 0], [hi, 0, 0]))
            .build(0)
            .unwrap();
        let st = StructStencil::new(1, vec![[-1, 0, 0], [0, 0, 0], [1, 0, 0]]).unwrap();
        let space = grid.boxes().map(|b| b.grow(&[1, 1, 0, 0, 0, 0]));
        ComputePkg::new(&grid, &st, &space, [0, 0, 0], [stride, 1, 1])
    }

    #[test]
    fn interior_and_rim_partition_the_box() {
        let p = pkg(0, 7, 1);
        assert_eq!(p.indt_boxes()[0].as_slice(), &[GridBox::new(1, [1, 0, 0], [6, 0, 0])]);
        let dept = p.dept_boxes()[0].as_slice();
        assert_eq!(dept.len(), 2);
        let total: usize = p.indt_boxes()[0].volume() + p.dept_boxes()[0].volume();
        assert_eq!(total, 8);
    }

    #[test]
    fn thin_box_is_all_dependent() {
        let p = pkg(0, 1, 1);
        assert!(p.indt_boxes()[0].is_empty());
        assert_eq!(p.dept_boxes()[0].volume(), 2);
    }

    #[test]
    fn stride_projects_regions() {
        let p = pkg(0, 7, 2);
        // even points only: indt [2, 6] step 2, dept {0}
        assert_eq!(p.indt_boxes()[0].as_slice(), &[GridBox::new(1, [2, 0, 0], [6, 0, 0])]);
        assert_eq!(p.dept_boxes()[0].as_slice(), &[GridBox::new(1, [0, 0, 0], [0, 0, 0])]);
        assert_eq!(p.stride(), [2, 1, 1]);
    }
}
