//! Strided iteration over a box region with several offset trackers.
//!
//! A [`BoxLoop`] walks a `loop_size` lattice once and yields, for each
//! point, one flat offset per participating data box. Each tracker has its
//! own data box (which fixes the memory layout), start index and stride, so
//! a single loop can address a matrix coefficient array, an input vector and
//! an output vector that live in differently sized ghosted boxes.
//!
//! Iterations are independent. With the `rayon` feature,
//! [`BoxLoop::for_each_mut`] runs lines of the loop in parallel; the output
//! buffer is split into disjoint line chunks, so no synchronization is
//! involved.

use crate::geometry::grid_box::GridBox;
use crate::geometry::index::{Index, MAX_DIM};

/// Multi-dimensional loop with `N` flat-offset trackers.
#[derive(Clone, Debug)]
pub struct BoxLoop<const N: usize> {
    size: Index,
    base: [isize; N],
    step: [[isize; MAX_DIM]; N],
}

impl<const N: usize> BoxLoop<N> {
    /// Build a loop over `loop_size` points.
    ///
    /// Each tracker is `(data_box, start, stride)`: offsets are ranks in
    /// `data_box`'s flat layout, starting at `start` and advancing by
    /// `stride` per loop step.
    pub fn new(loop_size: Index, trackers: [(&GridBox, Index, Index); N]) -> Self {
        let mut base = [0isize; N];
        let mut step = [[0isize; MAX_DIM]; N];
        for (t, (data_box, start, stride)) in trackers.iter().enumerate() {
            let nx = data_box.extent(0) as isize;
            let ny = data_box.extent(1) as isize;
            base[t] = data_box.index_rank(*start) as isize;
            step[t] = [
                stride[0] as isize,
                stride[1] as isize * nx,
                stride[2] as isize * nx * ny,
            ];
        }
        Self {
            size: loop_size,
            base,
            step,
        }
    }

    /// Number of iterations.
    pub fn volume(&self) -> usize {
        self.size.iter().map(|&s| s.max(0) as usize).product()
    }

    fn line_starts(&self) -> impl Iterator<Item = [isize; N]> + '_ {
        let (ny, nz) = (self.size[1].max(0), self.size[2].max(0));
        (0..nz).flat_map(move |k| {
            (0..ny).map(move |j| {
                let mut start = self.base;
                for (t, s) in start.iter_mut().enumerate() {
                    *s += j as isize * self.step[t][1] + k as isize * self.step[t][2];
                }
                start
            })
        })
    }

    /// Visit every point sequentially.
    pub fn for_each(&self, mut f: impl FnMut([usize; N])) {
        if self.volume() == 0 {
            return;
        }
        let nx = self.size[0] as isize;
        for start in self.line_starts() {
            for i in 0..nx {
                let mut idx = [0usize; N];
                for t in 0..N {
                    idx[t] = (start[t] + i * self.step[t][0]) as usize;
                }
                f(idx);
            }
        }
    }

    /// Visit every point, handing out `&mut out[idx[0]]` for tracker 0.
    #[cfg(not(feature = "rayon"))]
    pub fn for_each_mut<T: Send>(&self, out: &mut [T], f: impl Fn(&mut T, [usize; N]) + Sync) {
        self.for_each(|idx| f(&mut out[idx[0]], idx));
    }

    /// Visit every point, handing out `&mut out[idx[0]]` for tracker 0.
    ///
    /// Lines of constant `(j, k)` occupy disjoint, increasing ranges of the
    /// tracker-0 buffer, which is carved into chunks and processed in parallel.
    #[cfg(feature = "rayon")]
    pub fn for_each_mut<T: Send>(&self, out: &mut [T], f: impl Fn(&mut T, [usize; N]) + Sync) {
        use rayon::prelude::*;

        if self.volume() == 0 {
            return;
        }
        let nx = self.size[0] as usize;
        let s0 = self.step[0][0] as usize;
        let span = (nx - 1) * s0 + 1;

        let mut lines: Vec<(&mut [T], [isize; N])> = Vec::new();
        let mut rest: &mut [T] = out;
        let mut consumed = 0usize;
        for start in self.line_starts() {
            let s = start[0] as usize;
            debug_assert!(s >= consumed, "box loop lines overlap");
            let tail = std::mem::take(&mut rest);
            let (_, tail) = tail.split_at_mut(s - consumed);
            let (chunk, tail) = tail.split_at_mut(span);
            rest = tail;
            consumed = s + span;
            lines.push((chunk, start));
        }

        let step = &self.step;
        lines.into_par_iter().for_each(|(chunk, start)| {
            for i in 0..nx {
                let mut idx = [0usize; N];
                for t in 0..N {
                    idx[t] = (start[t] + i as isize * step[t][0]) as usize;
                }
                f(&mut chunk[i * s0], idx);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tracker_covers_interior() {
        // 4x3 data box with a one-cell ghost; loop over the 2x1 interior.
        let data = GridBox::new(2, [-1, -1, 0], [2, 1, 0]);
        let lp = BoxLoop::new([2, 1, 1], [(&data, [0, 0, 0], [1, 1, 1])]);
        let mut seen = Vec::new();
        lp.for_each(|[i]| seen.push(i));
        assert_eq!(seen, vec![5, 6]);
    }

    #[test]
    fn trackers_advance_independently() {
        let a = GridBox::new(1, [0, 0, 0], [9, 0, 0]);
        let b = GridBox::new(1, [-2, 0, 0], [11, 0, 0]);
        let lp = BoxLoop::new([3, 1, 1], [(&a, [2, 0, 0], [2, 1, 1]), (&b, [2, 0, 0], [2, 1, 1])]);
        let mut pairs = Vec::new();
        lp.for_each(|[i, j]| pairs.push((i, j)));
        assert_eq!(pairs, vec![(2, 4), (4, 6), (6, 8)]);
    }

    #[test]
    fn for_each_mut_writes_every_point_once() {
        let data = GridBox::new(2, [0, 0, 0], [4, 3, 0]);
        let mut buf = vec![0u32; data.volume()];
        let lp = BoxLoop::new([3, 2, 1], [(&data, [1, 1, 0], [1, 1, 1])]);
        lp.for_each_mut(&mut buf, |v, _| *v += 1);
        assert_eq!(buf.iter().sum::<u32>(), 6);
        assert_eq!(buf[data.index_rank([1, 1, 0])], 1);
        assert_eq!(buf[data.index_rank([3, 2, 0])], 1);
        assert_eq!(buf[data.index_rank([0, 0, 0])], 0);
    }

    #[test]
    fn empty_loop_does_nothing() {
        let data = GridBox::new(1, [0, 0, 0], [3, 0, 0]);
        let lp = BoxLoop::new([0, 1, 1], [(&data, [0, 0, 0], [1, 1, 1])]);
        let mut n = 0;
        lp.for_each(|_| n += 1);
        assert_eq!(n, 0);
    }
}
