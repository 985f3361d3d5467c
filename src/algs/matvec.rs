//! Structured matrix-vector product `y = alpha * A x + beta * y`.
//!
//! The ghost exchange of `x` is started first, the independent regions are
//! computed while it is in flight, and the dependent regions once it has
//! completed.

use crate::algs::communicator::Communicator;
use crate::algs::compute_pkg::ComputePkg;
use crate::data::scalar::Scalar;
use crate::data::storage::Storage;
use crate::data::struct_matrix::{MatrixLayout, StructMatrix};
use crate::data::struct_vector::StructVector;
use crate::geometry::box_loop::BoxLoop;
use crate::geometry::grid_box::GridBox;
use crate::geometry::index::{self, Index};
use crate::struct_error::StructError;

/// Lifecycle of a matvec or residual object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComputeState {
    Uninitialized,
    Ready,
    Finalized,
}

impl ComputeState {
    pub fn name(self) -> &'static str {
        match self {
            ComputeState::Uninitialized => "uninitialized",
            ComputeState::Ready => "ready",
            ComputeState::Finalized => "finalized",
        }
    }

    pub(crate) fn expect(self, expected: ComputeState) -> Result<(), StructError> {
        if self == expected {
            Ok(())
        } else {
            Err(StructError::InvalidState {
                expected: expected.name(),
                found: self.name(),
            })
        }
    }
}

/// Sign applied to the stencil sum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Accumulate {
    Add,
    Subtract,
}

/// One local box of the matrix and the two vectors a kernel touches.
pub(crate) struct KernelBox<'a, T> {
    pub a_layout: &'a MatrixLayout,
    pub a_data: &'a [T],
    pub x_box: &'a GridBox,
    pub x_data: &'a [T],
    pub y_box: &'a GridBox,
}

/// `y[p] ±= Σ_s A_s[p] x[p + shape[s]]` over the strided `region` of local
/// box `b`; `y` is that box's slice of the output vector.
pub(crate) fn accumulate_region<T: Scalar>(
    k: &KernelBox<'_, T>,
    b: usize,
    region: &GridBox,
    stride: Index,
    y: &mut [T],
    mode: Accumulate,
) {
    let layout = k.a_layout;
    let a_box = layout.data_space.get(b);
    let loop_size = region.stride_size(stride);
    let start = region.imin();
    for (s, &offset) in layout.stencil.shape().iter().enumerate() {
        let x_start = index::add(start, offset);
        let x = k.x_data;
        if layout.constant[s] {
            // mirrors share the canonical entry's slot
            let coef = k.a_data[layout.data_indices[b][s] as usize];
            let lp = BoxLoop::new(loop_size, [(k.y_box, start, stride), (k.x_box, x_start, stride)]);
            match mode {
                Accumulate::Add => lp.for_each_mut(y, |v, [_, xi]| *v += coef * x[xi]),
                Accumulate::Subtract => lp.for_each_mut(y, |v, [_, xi]| *v -= coef * x[xi]),
            }
        } else {
            let base = layout.data_indices[b][s];
            let a = k.a_data;
            let lp = BoxLoop::new(
                loop_size,
                [
                    (k.y_box, start, stride),
                    (k.x_box, x_start, stride),
                    (a_box, start, stride),
                ],
            );
            let coef = move |ai: usize| a[(base + ai as isize) as usize];
            match mode {
                Accumulate::Add => lp.for_each_mut(y, |v, [_, xi, ai]| *v += coef(ai) * x[xi]),
                Accumulate::Subtract => lp.for_each_mut(y, |v, [_, xi, ai]| *v -= coef(ai) * x[xi]),
            }
        }
    }
}

/// `A` must be square and `x` must share its boxes with ghost layers that
/// cover the stencil reach.
pub(crate) fn check_operands<T, SA, SX>(
    a: &StructMatrix<T, SA>,
    x: &StructVector<T, SX>,
) -> Result<(), StructError>
where
    T: Scalar,
    SA: Storage<T>,
    SX: Storage<T>,
{
    let layout = a.layout()?;
    if layout.domain_is_coarse || a.rmap() != a.dmap() || a.grid().boxes() != a.domain_grid().boxes() {
        return Err(StructError::RectangularUnsupported);
    }
    check_same_boxes(a.grid().boxes().len(), x)?;
    let reach = layout.stencil.extents();
    let x_space = x.data_space()?;
    for (i, g) in a.grid().boxes().iter().enumerate() {
        if !x_space.get(i).contains_box(&g.grow(&reach)) {
            return Err(StructError::InsufficientGhost { box_index: i });
        }
    }
    Ok(())
}

pub(crate) fn check_same_boxes<T: Scalar, S: Storage<T>>(
    nboxes: usize,
    v: &StructVector<T, S>,
) -> Result<(), StructError> {
    let found = v.data_space()?.len();
    if found != nboxes {
        return Err(StructError::DataSizeMismatch {
            expected: nboxes,
            found,
        });
    }
    Ok(())
}

/// Reusable matvec plan.
#[derive(Debug)]
pub struct StructMatvec {
    compute_pkg: Option<ComputePkg>,
    state: ComputeState,
}

impl Default for StructMatvec {
    fn default() -> Self {
        Self::new()
    }
}

impl StructMatvec {
    pub fn new() -> Self {
        Self {
            compute_pkg: None,
            state: ComputeState::Uninitialized,
        }
    }

    pub fn state(&self) -> ComputeState {
        self.state
    }

    /// Build the compute package for `A` and `x`. No communication.
    pub fn setup<T, SA, SX>(
        &mut self,
        a: &StructMatrix<T, SA>,
        x: &StructVector<T, SX>,
    ) -> Result<(), StructError>
    where
        T: Scalar,
        SA: Storage<T>,
        SX: Storage<T>,
    {
        self.state.expect(ComputeState::Uninitialized)?;
        check_operands(a, x)?;
        self.compute_pkg = Some(ComputePkg::unit(a.grid(), a.stencil(), x.data_space()?));
        self.state = ComputeState::Ready;
        Ok(())
    }

    /// `y = alpha * A x + beta * y`. Ghost values of `x` are refreshed.
    pub fn compute<C, T, SA, SX, SY>(
        &self,
        comm: &C,
        alpha: T,
        a: &StructMatrix<T, SA>,
        x: &mut StructVector<T, SX>,
        beta: T,
        y: &mut StructVector<T, SY>,
    ) -> Result<(), StructError>
    where
        C: Communicator,
        T: Scalar,
        SA: Storage<T>,
        SX: Storage<T>,
        SY: Storage<T>,
    {
        self.state.expect(ComputeState::Ready)?;
        let pkg = self
            .compute_pkg
            .as_ref()
            .ok_or(StructError::NotInitialized("StructMatvec"))?;
        let nboxes = a.grid().boxes().len();
        check_same_boxes(nboxes, y)?;

        if alpha == T::zero() {
            return y.scale(beta);
        }

        let temp = beta / alpha;
        if temp != T::one() {
            if temp == T::zero() {
                y.set_constant_values(T::zero())?;
            } else {
                y.scale(temp)?;
            }
        }

        let (a_layout, a_data) = a.parts()?;
        let stride = pkg.stride();
        let handle = pkg.initialize(comm, x.data()?)?;
        let run = |phase: usize, x: &StructVector<T, SX>, y: &mut StructVector<T, SY>| -> Result<(), StructError> {
            let x_layout = x.layout()?;
            let x_data = x.data()?;
            let (y_layout, y_data) = y.parts_mut()?;
            for (b, regions) in pkg.phase_boxes(phase).iter().enumerate() {
                let y_box = y_layout.data_space.get(b);
                let y_start = y_layout.data_indices[b];
                let x_start = x_layout.data_indices[b];
                let x_box = x_layout.data_space.get(b);
                let kb = KernelBox {
                    a_layout,
                    a_data,
                    x_box,
                    x_data: &x_data[x_start..x_start + x_box.volume()],
                    y_box,
                };
                let y_slice = &mut y_data[y_start..y_start + y_box.volume()];
                for r in regions {
                    accumulate_region(&kb, b, r, stride, y_slice, Accumulate::Add);
                }
            }
            Ok(())
        };

        let indt = run(0, x, y);
        let finalized = handle.finalize(x.data_mut()?);
        indt?;
        finalized?;
        run(1, x, y)?;

        if alpha != T::one() {
            y.scale(alpha)?;
        }
        Ok(())
    }

    /// Release the compute package. Terminal.
    pub fn finalize(&mut self) {
        self.compute_pkg = None;
        self.state = ComputeState::Finalized;
    }
}

/// One-shot `y = alpha * A x + beta * y`.
pub fn struct_matvec<C, T, SA, SX, SY>(
    comm: &C,
    alpha: T,
    a: &StructMatrix<T, SA>,
    x: &mut StructVector<T, SX>,
    beta: T,
    y: &mut StructVector<T, SY>,
) -> Result<(), StructError>
where
    C: Communicator,
    T: Scalar,
    SA: Storage<T>,
    SX: Storage<T>,
    SY: Storage<T>,
{
    let mut mv = StructMatvec::new();
    mv.setup(a, x)?;
    let out = mv.compute(comm, alpha, a, x, beta, y);
    mv.finalize();
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::data::struct_matrix::StructMatrixOptions;
    use crate::grid::{StructGrid, StructGridBuilder};
    use crate::stencil::StructStencil;

    fn grid(boxes: &[(i32, i32)]) -> Arc<StructGrid> {
        let mut b = StructGridBuilder::new(1);
        for &(lo, hi) in boxes {
            b = b.add_box(0, GridBox::new(1, [lo, 0, 0], [hi, 0, 0]));
        }
        b.build(0).unwrap()
    }

    fn poisson(g: Arc<StructGrid>, opts: StructMatrixOptions) -> StructMatrix<f64> {
        let st = StructStencil::new(1, vec![[-1, 0, 0], [0, 0, 0], [1, 0, 0]]).unwrap();
        let mut a = StructMatrix::new(g, st).with_options(opts.clone());
        a.initialize().unwrap();
        if opts.constant_entries.is_empty() {
            let all = GridBox::new(1, [0, 0, 0], [7, 0, 0]);
            let vals: Vec<f64> = (0..8).flat_map(|_| [-1.0, 2.0, -1.0]).collect();
            a.set_box_values(&all, &[0, 1, 2], &vals).unwrap();
        } else {
            a.set_constant_values(&[0, 2], &[-1.0, -1.0]).unwrap();
            let all = GridBox::new(1, [0, 0, 0], [7, 0, 0]);
            a.set_box_values(&all, &[1], &[2.0; 8]).unwrap();
        }
        a.assemble(&NoComm).unwrap();
        a
    }

    fn ones(g: Arc<StructGrid>) -> StructVector<f64> {
        let mut x = StructVector::new(g);
        x.initialize().unwrap();
        x.set_constant_values(1.0).unwrap();
        x
    }

    fn values(v: &mut StructVector<f64>) -> Vec<f64> {
        v.get_box_values(&GridBox::new(1, [0, 0, 0], [7, 0, 0])).unwrap()
    }

    #[test]
    fn poisson_rows_sum_to_boundary_indicator() {
        for boxes in [&[(0, 7)][..], &[(0, 2), (3, 7)][..]] {
            let g = grid(boxes);
            let a = poisson(g.clone(), Default::default());
            let mut x = ones(g.clone());
            let mut y: StructVector<f64> = StructVector::new(g);
            y.initialize().unwrap();
            struct_matvec(&NoComm, 1.0, &a, &mut x, 0.0, &mut y).unwrap();
            assert_eq!(values(&mut y), vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn constant_off_diagonals_match_variable() {
        let g = grid(&[(0, 3), (4, 7)]);
        let a = poisson(
            g.clone(),
            StructMatrixOptions {
                constant_entries: vec![0, 2],
                ..Default::default()
            },
        );
        let mut x = ones(g.clone());
        x.set_value([2, 0, 0], 3.0).unwrap();
        let mut y = ones(g);
        struct_matvec(&NoComm, 2.0, &a, &mut x, 1.0, &mut y).unwrap();
        // A x = [1, -2, 4, -2, 0, 0, 0, 1]
        assert_eq!(
            values(&mut y),
            vec![3.0, -3.0, 9.0, -3.0, 1.0, 1.0, 1.0, 3.0]
        );
    }

    #[test]
    fn symmetric_storage_gives_same_product() {
        let g = grid(&[(0, 7)]);
        let a = poisson(
            g.clone(),
            StructMatrixOptions {
                symmetric: true,
                ..Default::default()
            },
        );
        let mut x = ones(g.clone());
        x.set_value([0, 0, 0], 2.0).unwrap();
        let mut y: StructVector<f64> = StructVector::new(g);
        y.initialize().unwrap();
        struct_matvec(&NoComm, 1.0, &a, &mut x, 0.0, &mut y).unwrap();
        assert_eq!(values(&mut y), vec![3.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn symmetric_constant_mirror_reads_canonical_slot() {
        let g = grid(&[(0, 7)]);
        let a = poisson(
            g.clone(),
            StructMatrixOptions {
                symmetric: true,
                constant_entries: vec![0, 2],
                ..Default::default()
            },
        );
        let mut x = ones(g.clone());
        let mut y: StructVector<f64> = StructVector::new(g);
        y.initialize().unwrap();
        struct_matvec(&NoComm, 1.0, &a, &mut x, 0.0, &mut y).unwrap();
        assert_eq!(values(&mut y), vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn alpha_zero_only_scales_y() {
        let g = grid(&[(0, 7)]);
        let a = poisson(g.clone(), Default::default());
        let mut x = ones(g.clone());
        x.set_constant_values(f64::NAN).unwrap();
        let mut y = ones(g);
        struct_matvec(&NoComm, 0.0, &a, &mut x, 3.0, &mut y).unwrap();
        assert_eq!(values(&mut y), vec![3.0; 8]);
    }

    #[test]
    fn state_machine_is_enforced() {
        let g = grid(&[(0, 7)]);
        let a = poisson(g.clone(), Default::default());
        let mut x = ones(g.clone());
        let mut y = ones(g);
        let mut mv = StructMatvec::new();
        assert!(matches!(
            mv.compute(&NoComm, 1.0, &a, &mut x, 0.0, &mut y),
            Err(StructError::InvalidState { expected: "ready", found: "uninitialized" })
        ));
        mv.setup(&a, &x).unwrap();
        mv.compute(&NoComm, 1.0, &a, &mut x, 0.0, &mut y).unwrap();
        mv.compute(&NoComm, 1.0, &a, &mut x, 0.0, &mut y).unwrap();
        mv.finalize();
        assert_eq!(mv.state(), ComputeState::Finalized);
        assert!(mv.setup(&a, &x).is_err());
    }

    #[test]
    fn thin_ghosts_are_rejected() {
        let g = grid(&[(0, 7)]);
        let a = poisson(g.clone(), Default::default());
        let mut x: StructVector<f64> = StructVector::new(g);
        x.set_num_ghost([0; 6]).unwrap();
        x.initialize().unwrap();
        let mut mv = StructMatvec::new();
        assert_eq!(mv.setup(&a, &x), Err(StructError::InsufficientGhost { box_index: 0 }));
    }
}
