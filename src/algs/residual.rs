//! Residual `r = b - A x` on a strided subset of grid points.

use serde::{Deserialize, Serialize};

use crate::algs::communicator::Communicator;
use crate::algs::compute_pkg::ComputePkg;
use crate::algs::matvec::{Accumulate, ComputeState, KernelBox, accumulate_region, check_operands, check_same_boxes};
use crate::data::scalar::Scalar;
use crate::data::storage::Storage;
use crate::data::struct_matrix::StructMatrix;
use crate::data::struct_vector::StructVector;
use crate::geometry::box_loop::BoxLoop;
use crate::geometry::grid_box::BoxArray;
use crate::geometry::index::Index;
use crate::struct_error::StructError;

/// Which points the residual is computed at: `base_index + k * base_stride`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualOptions {
    pub base_index: Index,
    pub base_stride: Index,
}

impl Default for ResidualOptions {
    fn default() -> Self {
        Self {
            base_index: [0, 0, 0],
            base_stride: [1, 1, 1],
        }
    }
}

/// Reusable residual plan.
#[derive(Debug)]
pub struct StructResidual {
    options: ResidualOptions,
    base_points: BoxArray,
    compute_pkg: Option<ComputePkg>,
    flops: usize,
    state: ComputeState,
}

impl Default for StructResidual {
    fn default() -> Self {
        Self::new(ResidualOptions::default())
    }
}

impl StructResidual {
    pub fn new(options: ResidualOptions) -> Self {
        Self {
            options,
            base_points: BoxArray::new(),
            compute_pkg: None,
            flops: 0,
            state: ComputeState::Uninitialized,
        }
    }

    /// Change the base lattice; only before setup.
    pub fn set_base(&mut self, base_index: Index, base_stride: Index) -> Result<(), StructError> {
        self.state.expect(ComputeState::Uninitialized)?;
        self.options = ResidualOptions {
            base_index,
            base_stride,
        };
        Ok(())
    }

    pub fn options(&self) -> ResidualOptions {
        self.options
    }

    pub fn state(&self) -> ComputeState {
        self.state
    }

    /// Grid boxes projected onto the base lattice.
    pub fn base_points(&self) -> &BoxArray {
        &self.base_points
    }

    /// Nominal operation count of one [`StructResidual::compute`].
    pub fn flops(&self) -> usize {
        self.flops
    }

    pub fn setup<T, SA, SX, SB, SR>(
        &mut self,
        a: &StructMatrix<T, SA>,
        x: &StructVector<T, SX>,
        b: &StructVector<T, SB>,
        r: &StructVector<T, SR>,
    ) -> Result<(), StructError>
    where
        T: Scalar,
        SA: Storage<T>,
        SX: Storage<T>,
        SB: Storage<T>,
        SR: Storage<T>,
    {
        self.state.expect(ComputeState::Uninitialized)?;
        check_operands(a, x)?;
        let nboxes = a.grid().boxes().len();
        check_same_boxes(nboxes, b)?;
        check_same_boxes(nboxes, r)?;

        let ResidualOptions {
            base_index,
            base_stride,
        } = self.options;
        self.base_points = a.grid().boxes().map(|g| g.project(base_index, base_stride));
        self.compute_pkg = Some(ComputePkg::new(
            a.grid(),
            a.stencil(),
            x.data_space()?,
            base_index,
            base_stride,
        ));
        let stride_volume: usize = base_stride.iter().map(|&s| s.max(1) as usize).product();
        self.flops = (a.global_size()? + x.global_size()) / stride_volume;
        self.state = ComputeState::Ready;
        Ok(())
    }

    /// `r = b - A x` at the base points. Ghost values of `x` are refreshed.
    pub fn compute<C, T, SA, SX, SB, SR>(
        &self,
        comm: &C,
        a: &StructMatrix<T, SA>,
        x: &mut StructVector<T, SX>,
        b: &StructVector<T, SB>,
        r: &mut StructVector<T, SR>,
    ) -> Result<(), StructError>
    where
        C: Communicator,
        T: Scalar,
        SA: Storage<T>,
        SX: Storage<T>,
        SB: Storage<T>,
        SR: Storage<T>,
    {
        self.state.expect(ComputeState::Ready)?;
        let pkg = self
            .compute_pkg
            .as_ref()
            .ok_or(StructError::NotInitialized("StructResidual"))?;
        let stride = pkg.stride();
        let (a_layout, a_data) = a.parts()?;

        let handle = pkg.initialize(comm, x.data()?)?;

        let copied = (|| {
            let b_layout = b.layout()?;
            let b_data = b.data()?;
            let (r_layout, r_data) = r.parts_mut()?;
            for (i, base) in self.base_points.iter().enumerate() {
                let b_box = b_layout.data_space.get(i);
                let r_box = r_layout.data_space.get(i);
                let b_start = b_layout.data_indices[i];
                let r_start = r_layout.data_indices[i];
                let b_slice = &b_data[b_start..b_start + b_box.volume()];
                let lp = BoxLoop::new(
                    base.stride_size(stride),
                    [(r_box, base.imin(), stride), (b_box, base.imin(), stride)],
                );
                lp.for_each_mut(&mut r_data[r_start..r_start + r_box.volume()], |v, [_, bi]| {
                    *v = b_slice[bi]
                });
            }
            Ok::<(), StructError>(())
        })();

        let run = |phase: usize, x: &StructVector<T, SX>, r: &mut StructVector<T, SR>| -> Result<(), StructError> {
            let x_layout = x.layout()?;
            let x_data = x.data()?;
            let (r_layout, r_data) = r.parts_mut()?;
            for (i, regions) in pkg.phase_boxes(phase).iter().enumerate() {
                let r_box = r_layout.data_space.get(i);
                let r_start = r_layout.data_indices[i];
                let x_box = x_layout.data_space.get(i);
                let x_start = x_layout.data_indices[i];
                let kb = KernelBox {
                    a_layout,
                    a_data,
                    x_box,
                    x_data: &x_data[x_start..x_start + x_box.volume()],
                    y_box: r_box,
                };
                let r_slice = &mut r_data[r_start..r_start + r_box.volume()];
                for region in regions {
                    accumulate_region(&kb, i, region, stride, r_slice, Accumulate::Subtract);
                }
            }
            Ok(())
        };

        let indt = copied.and_then(|()| run(0, x, r));
        let finalized = handle.finalize(x.data_mut()?);
        indt?;
        finalized?;
        run(1, x, r)
    }

    /// Release the compute package and base points. Terminal.
    pub fn finalize(&mut self) {
        self.compute_pkg = None;
        self.base_points = BoxArray::new();
        self.state = ComputeState::Finalized;
    }
}

/// One-shot `r = b - A x` over every grid point.
pub fn struct_residual<C, T, SA, SX, SB, SR>(
    comm: &C,
    a: &StructMatrix<T, SA>,
    x: &mut StructVector<T, SX>,
    b: &StructVector<T, SB>,
    r: &mut StructVector<T, SR>,
) -> Result<(), StructError>
where
    C: Communicator,
    T: Scalar,
    SA: Storage<T>,
    SX: Storage<T>,
    SB: Storage<T>,
    SR: Storage<T>,
{
    let mut res = StructResidual::default();
    res.setup(a, x, b, r)?;
    let out = res.compute(comm, a, x, b, r);
    res.finalize();
    out
}
