mod util;

use struct_mv::prelude::*;
use util::*;

#[test]
fn poisson_two_ranks_matches_boundary_rows() {
    let out = run_ranks(2, |comm| {
        let r = comm.rank() as i32;
        let grid = StructGridBuilder::new(1)
            .assemble(&comm, &[box1(2 * r, 2 * r + 1)])
            .unwrap();
        assert_eq!(grid.global_size(), 4);
        let a = poisson1(&comm, grid.clone());
        let mut x = filled(&grid, 1.0);
        let mut y = filled(&grid, 0.0);
        struct_matvec(&comm, 1.0, &a, &mut x, 0.0, &mut y).unwrap();
        y.get_box_values(&box1(2 * r, 2 * r + 1)).unwrap()
    });
    assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[test]
fn residual_of_exact_rhs_is_zero() {
    let out = run_ranks(2, |comm| {
        let r = comm.rank() as i32;
        let mine = box1(2 * r, 2 * r + 1);
        let grid = StructGridBuilder::new(1).assemble(&comm, &[mine]).unwrap();
        let a = poisson1(&comm, grid.clone());
        let mut x = filled(&grid, 1.0);
        let mut b = filled(&grid, 0.0);
        let rhs = if r == 0 { [1.0, 0.0] } else { [0.0, 1.0] };
        b.set_box_values(&mine, &rhs).unwrap();
        let mut res = filled(&grid, 7.0);
        struct_residual(&comm, &a, &mut x, &b, &mut res).unwrap();
        res.get_box_values(&mine).unwrap()
    });
    assert!(out.iter().flatten().all(|&v| v == 0.0));
}

/// Symmetric `[-1, 2, -1]` on `mine`, off-diagonals constant when asked.
fn symmetric_poisson1<C: Communicator>(
    comm: &C,
    grid: std::sync::Arc<StructGrid>,
    mine: &GridBox,
    constant_offdiag: bool,
) -> StructMatrix<f64> {
    let constant_entries = if constant_offdiag { vec![0, 2] } else { Vec::new() };
    let mut a: StructMatrix<f64> =
        StructMatrix::new(grid, laplace1()).with_options(StructMatrixOptions {
            symmetric: true,
            constant_entries,
            ..Default::default()
        });
    a.initialize().unwrap();
    if constant_offdiag {
        a.set_constant_values(&[0, 2], &[-1.0, -1.0]).unwrap();
        a.set_box_values(mine, &[1], &vec![2.0; mine.volume()]).unwrap();
    } else {
        // entry 2 mirrors entry 0 and is skipped on write
        let vals: Vec<f64> = (0..mine.volume()).flat_map(|_| [-1.0, 2.0, -1.0]).collect();
        a.set_box_values(mine, &[0, 1, 2], &vals).unwrap();
    }
    a.assemble(comm).unwrap();
    a
}

fn boundary_indicator(r: i32, nranks: i32) -> Vec<f64> {
    let mut v = vec![0.0; 4];
    if r == 0 {
        v[0] = 1.0;
    }
    if r == nranks - 1 {
        v[3] = 1.0;
    }
    v
}

#[test]
fn symmetric_constant_matvec_and_residual() {
    let mine = box1(0, 7);
    let grid = serial_grid(1, &[mine]);
    let a = symmetric_poisson1(&NoComm, grid.clone(), &mine, true);
    let mut x = filled(&grid, 1.0);
    let mut y = filled(&grid, 0.0);
    struct_matvec(&NoComm, 1.0, &a, &mut x, 0.0, &mut y).unwrap();
    assert_eq!(
        y.get_box_values(&mine).unwrap(),
        vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]
    );

    let mut res = filled(&grid, 5.0);
    struct_residual(&NoComm, &a, &mut x, &y, &mut res).unwrap();
    assert!(res.get_box_values(&mine).unwrap().iter().all(|&v| v == 0.0));
}

#[test]
fn symmetric_two_ranks_read_ghost_coefficients() {
    for constant_offdiag in [false, true] {
        let out = run_ranks(2, |comm| {
            let r = comm.rank() as i32;
            let mine = box1(4 * r, 4 * r + 3);
            let grid = StructGridBuilder::new(1).assemble(&comm, &[mine]).unwrap();
            let a = symmetric_poisson1(&comm, grid.clone(), &mine, constant_offdiag);
            let mut x = filled(&grid, 1.0);
            x.set_box_values(&mine, &[1.0, 2.0, 3.0, 4.0].map(|v| v + 4.0 * r as f64))
                .unwrap();
            let mut y = filled(&grid, 0.0);
            struct_matvec(&comm, 1.0, &a, &mut x, 0.0, &mut y).unwrap();

            let mut ones = filled(&grid, 1.0);
            let mut b = filled(&grid, 0.0);
            b.set_box_values(&mine, &boundary_indicator(r, 2)).unwrap();
            let mut res = filled(&grid, 3.0);
            struct_residual(&comm, &a, &mut ones, &b, &mut res).unwrap();
            (y.get_box_values(&mine).unwrap(), res.get_box_values(&mine).unwrap())
        });
        // A applied to x = 1..8 leaves only the end rows
        let y: Vec<f64> = out.iter().flat_map(|(y, _)| y.clone()).collect();
        assert_eq!(y, vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 9.0]);
        assert!(out.iter().flat_map(|(_, r)| r).all(|&v| v == 0.0));
    }
}

fn ramp(p: Index) -> f64 {
    (p[0] * 7 + p[1] * 3) as f64 * 0.25
}

fn laplace2_matvec<C: Communicator>(comm: &C, grid: std::sync::Arc<StructGrid>) -> Vec<(Index, f64)> {
    let mut a: StructMatrix<f64> = StructMatrix::new(grid.clone(), laplace2());
    a.initialize().unwrap();
    for b in grid.boxes().iter() {
        let vals: Vec<f64> = (0..b.volume())
            .flat_map(|_| [4.0, -1.0, -1.0, -1.0, -1.0])
            .collect();
        a.set_box_values(b, &[0, 1, 2, 3, 4], &vals).unwrap();
    }
    a.assemble(comm).unwrap();

    let mut x = filled(&grid, 0.0);
    for b in grid.boxes().iter() {
        let vals: Vec<f64> = b.points().map(ramp).collect();
        x.set_box_values(b, &vals).unwrap();
    }
    let mut y = filled(&grid, 1.0);
    let mut mv = StructMatvec::new();
    mv.setup(&a, &x).unwrap();
    mv.compute(comm, 2.0, &a, &mut x, -1.0, &mut y).unwrap();
    // second application reuses the package
    mv.compute(comm, 1.0, &a, &mut x, 0.0, &mut y).unwrap();
    mv.finalize();

    let mut out = Vec::new();
    for b in grid.boxes().iter() {
        let vals = y.get_box_values(b).unwrap();
        out.extend(b.points().zip(vals));
    }
    out
}

#[test]
fn four_ranks_agree_with_one() {
    let whole = serial_grid(2, &[box2([0, 0], [3, 3])]);
    let mut expected = laplace2_matvec(&NoComm, whole);
    expected.sort_by_key(|(p, _)| (p[1], p[0]));

    let parts = run_ranks(4, |comm| {
        let r = comm.rank() as i32;
        let lo = [2 * (r % 2), 2 * (r / 2)];
        let grid = StructGridBuilder::new(2)
            .assemble(&comm, &[box2(lo, [lo[0] + 1, lo[1] + 1])])
            .unwrap();
        laplace2_matvec(&comm, grid)
    });
    let mut got: Vec<(Index, f64)> = parts.into_iter().flatten().collect();
    got.sort_by_key(|(p, _)| (p[1], p[0]));
    assert_eq!(got, expected);
}

#[test]
fn all_constant_assemble_sends_nothing() {
    let grid = StructGridBuilder::new(1)
        .add_box(0, box1(0, 3))
        .add_box(1, box1(4, 7))
        .build(0)
        .unwrap();
    let mut a: StructMatrix<f64> = StructMatrix::new(grid, laplace1());
    a.set_constant_coefficient(ConstantCoefficient::All).unwrap();
    a.initialize().unwrap();
    a.set_constant_values(&[0, 1, 2], &[-1.0, 2.0, -1.0]).unwrap();
    a.assemble(&PanicComm { rank: 0, size: 2 }).unwrap();
    assert_eq!(a.data_size().unwrap(), 3);
}

#[test]
fn zero_alpha_never_reads_x() {
    let grid = serial_grid(1, &[box1(0, 3)]);
    let a = poisson1(&NoComm, grid.clone());
    let mut x = filled(&grid, f64::NAN);
    let mut y = filled(&grid, 2.0);
    struct_matvec(&NoComm, 0.0, &a, &mut x, 0.5, &mut y).unwrap();
    assert_eq!(y.get_box_values(&box1(0, 3)).unwrap(), vec![1.0; 4]);
}
