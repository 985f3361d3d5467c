use proptest::prelude::*;
use struct_mv::geometry::{BoxLoop, GridBox};

fn arb_box() -> impl Strategy<Value = GridBox> {
    (-4i32..4, -4i32..4, 0i32..6, 0i32..6)
        .prop_map(|(x, y, w, h)| GridBox::new(2, [x, y, 0], [x + w, y + h, 0]))
}

proptest! {
    #[test]
    fn subtract_partitions_the_difference(a in arb_box(), b in arb_box()) {
        let pieces = a.subtract(&b);
        let covered: usize = pieces.iter().map(GridBox::volume).sum();
        prop_assert_eq!(covered + a.intersect(&b).volume(), a.volume());
        for p in a.points() {
            let hits = pieces.iter().filter(|q| q.contains(p)).count();
            prop_assert_eq!(hits, usize::from(!b.contains(p)));
        }
    }

    #[test]
    fn project_keeps_exactly_the_lattice(
        a in arb_box(),
        ox in -3i32..3,
        oy in -3i32..3,
        sx in 1i32..4,
        sy in 1i32..4,
    ) {
        let proj = a.project([ox, oy, 0], [sx, sy, 1]);
        let on_lattice = |p: [i32; 3]| (p[0] - ox).rem_euclid(sx) == 0 && (p[1] - oy).rem_euclid(sy) == 0;
        let expected: Vec<_> = a.points().filter(|&p| on_lattice(p)).collect();
        let mut visited = Vec::new();
        if !proj.is_empty() {
            let lp = BoxLoop::new(proj.stride_size([sx, sy, 1]), [(&a, proj.imin(), [sx, sy, 1])]);
            let pts: Vec<_> = a.points().collect();
            lp.for_each(|[i]| visited.push(pts[i]));
        }
        prop_assert_eq!(visited, expected);
    }
}
