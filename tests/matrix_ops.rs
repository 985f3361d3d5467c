mod util;

use struct_mv::prelude::*;
use util::*;

fn coeff(p: Index, s: usize) -> f64 {
    (10 * p[0] + s as i32) as f64
}

fn fill_by_position<C: Communicator>(comm: &C, grid: std::sync::Arc<StructGrid>) -> StructMatrix<f64> {
    let mut a: StructMatrix<f64> = StructMatrix::new(grid.clone(), laplace1());
    a.initialize().unwrap();
    for b in grid.boxes().iter() {
        let vals: Vec<f64> = b.points().flat_map(|p| (0..3).map(move |s| coeff(p, s))).collect();
        a.set_box_values(b, &[0, 1, 2], &vals).unwrap();
    }
    a.assemble(comm).unwrap();
    a
}

fn owned_values(a: &mut StructMatrix<f64>) -> Vec<(Index, Vec<f64>)> {
    let boxes: Vec<GridBox> = a.grid().boxes().iter().copied().collect();
    boxes
        .iter()
        .flat_map(|b| b.points().collect::<Vec<_>>())
        .map(|p| (p, a.get_values(p, &[0, 1, 2]).unwrap()))
        .collect()
}

#[test]
fn migrate_between_decompositions_and_back() {
    let out = run_ranks(2, |comm| {
        let r = comm.rank() as i32;
        let halves = StructGridBuilder::new(1)
            .assemble(&comm, &[box1(4 * r, 4 * r + 3)])
            .unwrap();
        let split: Vec<GridBox> = if r == 0 {
            vec![box1(0, 1), box1(6, 7)]
        } else {
            vec![box1(2, 5)]
        };
        let shuffled = StructGridBuilder::new(1).assemble(&comm, &split).unwrap();

        let a = fill_by_position(&comm, halves.clone());
        let mut b: StructMatrix<f64> = StructMatrix::new(shuffled, laplace1());
        b.initialize().unwrap();
        a.migrate(&comm, &mut b).unwrap();

        let mut back: StructMatrix<f64> = StructMatrix::new(halves, laplace1());
        back.initialize().unwrap();
        b.migrate(&comm, &mut back).unwrap();
        (owned_values(&mut b), owned_values(&mut back))
    });

    for (moved, returned) in out {
        for (p, vals) in moved.into_iter().chain(returned) {
            assert_eq!(vals, (0..3).map(|s| coeff(p, s)).collect::<Vec<_>>(), "at {p:?}");
        }
    }
}

#[test]
fn migrate_rejects_other_storage_class() {
    let grid = serial_grid(1, &[box1(0, 3)]);
    let a = fill_by_position(&NoComm, grid.clone());
    let mut b: StructMatrix<f64> = StructMatrix::new(grid, laplace1());
    b.set_constant_coefficient(ConstantCoefficient::AllButDiagonal).unwrap();
    b.initialize().unwrap();
    assert!(matches!(
        a.migrate(&NoComm, &mut b),
        Err(StructError::MigrateMismatch(_))
    ));
}

#[test]
fn symmetric_storage_halves_off_diagonals() {
    let grid = serial_grid(2, &[box2([0, 0], [3, 3])]);
    let mut a: StructMatrix<f64> = StructMatrix::new(grid, laplace2()).with_options(StructMatrixOptions {
        symmetric: true,
        ..Default::default()
    });
    a.initialize().unwrap();
    assert!(a.symmetric());
    // center, west and south are stored; east and north alias them
    assert_eq!(a.num_values().unwrap(), 3);
    assert_eq!(a.stencil().size(), 5);
    assert_eq!(&a.num_ghost()[..4], &[1, 2, 1, 2]);
    a.debug_assert_invariants();
    assert!(a.validate_invariants().is_ok());

    a.set_values([1, 1, 0], &[1], &[-3.0]).unwrap();
    a.assemble(&NoComm).unwrap();
    // east coupling of (0, 1) is the west coupling of (1, 1)
    let east = a.entry_for_offset(0, [1, 0, 0]).unwrap().unwrap();
    let dbox = *a.data_space().unwrap().get(0);
    assert_eq!(a.data().unwrap()[east.index(dbox.index_rank([0, 1, 0]))], -3.0);
}

#[test]
fn variable_path_rejects_constant_entry() {
    let grid = serial_grid(1, &[box1(0, 3)]);
    let mut a: StructMatrix<f64> = StructMatrix::new(grid, laplace1()).with_options(StructMatrixOptions {
        constant_entries: vec![0, 2],
        ..Default::default()
    });
    a.initialize().unwrap();
    assert_eq!(a.constant_coefficient(), ConstantCoefficient::AllButDiagonal);
    let err = a.set_values([1, 0, 0], &[0, 1], &[5.0, 6.0]).unwrap_err();
    assert_eq!(err, StructError::ConstantEntryThroughVariablePath { entry: 0 });
    // the variable entry in the same call was still written
    assert_eq!(a.get_values([1, 0, 0], &[1]).unwrap(), vec![6.0]);
    assert_eq!(
        a.set_constant_values(&[1], &[1.0]).unwrap_err(),
        StructError::VariableEntryThroughConstantPath { entry: 1 }
    );
}

#[test]
fn clear_boundary_drops_outside_couplings_only() {
    let grid = serial_grid(1, &[box1(0, 1), box1(2, 3)]);
    let mut a = poisson1(&NoComm, grid);
    a.clear_boundary().unwrap();
    let rows: Vec<Vec<f64>> = (0..4).map(|p| a.get_values([p, 0, 0], &[0, 1, 2]).unwrap()).collect();
    assert_eq!(rows[0], vec![0.0, 2.0, -1.0]);
    assert_eq!(rows[1], vec![-1.0, 2.0, -1.0]);
    assert_eq!(rows[2], vec![-1.0, 2.0, -1.0]);
    assert_eq!(rows[3], vec![-1.0, 2.0, 0.0]);
}

#[test]
fn print_and_read_on_two_ranks() {
    let dir = std::env::temp_dir().join(format!("struct-mv-par-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("poisson");

    let out = run_ranks(2, |comm| {
        let r = comm.rank() as i32;
        let grid = StructGridBuilder::new(1)
            .assemble(&comm, &[box1(4 * r, 4 * r + 3)])
            .unwrap();
        let mut a = fill_by_position(&comm, grid.clone());
        a.print(&path, false).unwrap();
        comm.barrier();
        let mut b = StructMatrix::<f64>::read(&comm, &path, grid.num_ghost()).unwrap();
        assert_eq!(b.grid().global_size(), 8);
        (owned_values(&mut a), owned_values(&mut b))
    });
    for (written, read) in out {
        assert_eq!(written, read);
    }
    assert!(dir.join("poisson.00001").exists());
    std::fs::remove_dir_all(&dir).unwrap();
}
