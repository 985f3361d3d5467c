#![allow(dead_code)]
use std::sync::Arc;

use struct_mv::algs::communicator::{Communicator, LocalComm};
use struct_mv::prelude::*;

/// 1-D box `[lo, hi]`.
pub fn box1(lo: i32, hi: i32) -> GridBox {
    GridBox::new(1, [lo, 0, 0], [hi, 0, 0])
}

/// 2-D box `[lo, hi]`.
pub fn box2(lo: [i32; 2], hi: [i32; 2]) -> GridBox {
    GridBox::new(2, [lo[0], lo[1], 0], [hi[0], hi[1], 0])
}

/// Three-point Laplacian stencil `{-1, 0, +1}`.
pub fn laplace1() -> StructStencil {
    StructStencil::new(1, vec![[-1, 0, 0], [0, 0, 0], [1, 0, 0]]).unwrap()
}

/// Five-point Laplacian stencil in 2-D.
pub fn laplace2() -> StructStencil {
    StructStencil::new(
        2,
        vec![[0, 0, 0], [-1, 0, 0], [1, 0, 0], [0, -1, 0], [0, 1, 0]],
    )
    .unwrap()
}

/// Serial grid with every box on rank 0.
pub fn serial_grid(ndim: usize, boxes: &[GridBox]) -> Arc<StructGrid> {
    boxes
        .iter()
        .fold(StructGridBuilder::new(ndim), |b, g| b.add_box(0, *g))
        .build(0)
        .unwrap()
}

/// `[-1, 2, -1]` at every point of the local boxes, assembled.
pub fn poisson1<C: Communicator>(comm: &C, grid: Arc<StructGrid>) -> StructMatrix<f64> {
    let mut a: StructMatrix<f64> = StructMatrix::new(grid.clone(), laplace1());
    a.initialize().unwrap();
    for b in grid.boxes().iter() {
        let vals: Vec<f64> = (0..b.volume()).flat_map(|_| [-1.0, 2.0, -1.0]).collect();
        a.set_box_values(b, &[0, 1, 2], &vals).unwrap();
    }
    a.assemble(comm).unwrap();
    a
}

/// Initialized vector filled with `value` on grid points.
pub fn filled(grid: &Arc<StructGrid>, value: f64) -> StructVector<f64> {
    let mut v: StructVector<f64> = StructVector::new(grid.clone());
    v.initialize().unwrap();
    v.set_constant_values(value).unwrap();
    v
}

/// Run `f` once per rank of a fresh in-process world, one thread each,
/// and collect the results in rank order.
pub fn run_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(LocalComm) -> R + Sync,
{
    let comms = LocalComm::world(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|c| {
                let f = &f;
                s.spawn(move || f(c))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Communicator that fails the test on any message.
pub struct PanicComm {
    pub rank: usize,
    pub size: usize,
}

impl Communicator for PanicComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn isend(&self, peer: usize, tag: u16, _buf: &[u8]) {
        panic!("unexpected send to {peer} (tag {tag:#x})");
    }
    fn irecv(&self, peer: usize, tag: u16, _len: usize) {
        panic!("unexpected receive from {peer} (tag {tag:#x})");
    }
}
