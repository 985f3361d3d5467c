//! Axis-aligned integer boxes and ordered box arrays.
//!
//! A [`GridBox`] is an inclusive `[imin, imax]` rectangle in up to three
//! dimensions. Flat storage for a box is laid out with dimension 0 varying
//! fastest, which fixes the meaning of [`GridBox::index_rank`] and
//! [`GridBox::offset_distance`].

use serde::{Deserialize, Serialize};

use crate::geometry::index::{self, GhostWidth, Index, MAX_DIM, ZERO};

/// Inclusive integer box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridBox {
    imin: Index,
    imax: Index,
    ndim: usize,
}

impl GridBox {
    /// Create a box from its corners; components past `ndim` are zeroed.
    pub fn new(ndim: usize, imin: Index, imax: Index) -> Self {
        debug_assert!((1..=MAX_DIM).contains(&ndim));
        Self {
            imin: index::truncate(imin, ndim),
            imax: index::truncate(imax, ndim),
            ndim,
        }
    }

    /// An empty box of the given dimension.
    pub fn empty(ndim: usize) -> Self {
        Self::new(ndim, ZERO, index::splat(ndim, -1))
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    #[inline]
    pub fn imin(&self) -> Index {
        self.imin
    }

    #[inline]
    pub fn imax(&self) -> Index {
        self.imax
    }

    /// Extent along `d` (may be negative for empty boxes).
    #[inline]
    pub fn extent(&self, d: usize) -> i32 {
        if d < self.ndim {
            self.imax[d] - self.imin[d] + 1
        } else {
            1
        }
    }

    /// Per-dimension point counts, clamped at zero.
    pub fn size(&self) -> Index {
        let mut out = [1; MAX_DIM];
        for (d, v) in out.iter_mut().enumerate().take(self.ndim) {
            *v = self.extent(d).max(0);
        }
        out
    }

    /// Number of points; zero when any extent is non-positive.
    pub fn volume(&self) -> usize {
        (0..self.ndim)
            .map(|d| self.extent(d).max(0) as usize)
            .product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    /// Point counts of the strided lattice `imin + k*stride` inside the box.
    pub fn stride_size(&self, stride: Index) -> Index {
        let mut out = [1; MAX_DIM];
        for d in 0..self.ndim {
            let e = self.imax[d] - self.imin[d];
            out[d] = if e < 0 { 0 } else { e / stride[d] + 1 };
        }
        out
    }

    pub fn contains(&self, index: Index) -> bool {
        (0..self.ndim).all(|d| index[d] >= self.imin[d] && index[d] <= self.imax[d])
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains_box(&self, other: &GridBox) -> bool {
        other.is_empty() || (self.contains(other.imin) && self.contains(other.imax))
    }

    /// Intersection (possibly empty).
    pub fn intersect(&self, other: &GridBox) -> GridBox {
        let mut imin = ZERO;
        let mut imax = ZERO;
        for d in 0..self.ndim {
            imin[d] = self.imin[d].max(other.imin[d]);
            imax[d] = self.imax[d].min(other.imax[d]);
        }
        GridBox::new(self.ndim, imin, imax)
    }

    /// Expand by per-side widths.
    pub fn grow(&self, width: &GhostWidth) -> GridBox {
        let mut out = *self;
        for d in 0..self.ndim {
            out.imin[d] -= width[2 * d];
            out.imax[d] += width[2 * d + 1];
        }
        out
    }

    /// Translate by `offset`.
    pub fn shift(&self, offset: Index) -> GridBox {
        GridBox::new(
            self.ndim,
            index::add(self.imin, offset),
            index::add(self.imax, offset),
        )
    }

    /// Map both corners into a coarser index space (floor division).
    pub fn map_floor(&self, map: Index) -> GridBox {
        GridBox::new(
            self.ndim,
            index::map_floor(self.imin, map, self.ndim),
            index::map_floor(self.imax, map, self.ndim),
        )
    }

    /// Linear position of `index` in this box's flat storage.
    #[inline]
    pub fn index_rank(&self, index: Index) -> usize {
        let nx = self.extent(0) as isize;
        let ny = self.extent(1) as isize;
        let i = (index[0] - self.imin[0]) as isize;
        let j = (index[1] - self.imin[1]) as isize;
        let k = (index[2] - self.imin[2]) as isize;
        (i + nx * (j + ny * k)) as usize
    }

    /// Linear displacement equivalent to moving by `offset` inside this box.
    #[inline]
    pub fn offset_distance(&self, offset: Index) -> isize {
        let nx = self.extent(0) as isize;
        let ny = self.extent(1) as isize;
        offset[0] as isize + nx * (offset[1] as isize + ny * offset[2] as isize)
    }

    /// Shrink to the points congruent to `index` modulo `stride`.
    pub fn project(&self, index: Index, stride: Index) -> GridBox {
        let mut out = *self;
        for d in 0..self.ndim {
            let s = stride[d];
            let hl = self.imin[d] - index[d];
            let hu = self.imax[d] - index[d];
            let kl = -((-hl).div_euclid(s));
            let ku = hu.div_euclid(s);
            out.imin[d] = index[d] + kl * s;
            out.imax[d] = index[d] + ku * s;
        }
        out
    }

    /// `self - other` as a list of disjoint boxes.
    pub fn subtract(&self, other: &GridBox) -> Vec<GridBox> {
        if self.is_empty() {
            return Vec::new();
        }
        if self.intersect(other).is_empty() {
            return vec![*self];
        }
        let mut pieces = Vec::new();
        let mut cut = *self;
        for d in 0..self.ndim {
            if other.imin[d] > cut.imin[d] {
                let mut piece = cut;
                piece.imax[d] = other.imin[d] - 1;
                pieces.push(piece);
                cut.imin[d] = other.imin[d];
            }
            if other.imax[d] < cut.imax[d] {
                let mut piece = cut;
                piece.imin[d] = other.imax[d] + 1;
                pieces.push(piece);
                cut.imax[d] = other.imax[d];
            }
        }
        pieces
    }

    /// Iterate every point, dimension 0 fastest.
    pub fn points(&self) -> impl Iterator<Item = Index> + '_ {
        let size = self.size();
        let total = self.volume();
        let imin = self.imin;
        (0..total).map(move |r| {
            let r = r as i32;
            let i = r % size[0];
            let j = (r / size[0]) % size[1];
            let k = r / (size[0] * size[1]);
            [imin[0] + i, imin[1] + j, imin[2] + k]
        })
    }
}

/// Ordered sequence of boxes; positions correlate across parallel arrays.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxArray(Vec<GridBox>);

impl BoxArray {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_boxes(boxes: Vec<GridBox>) -> Self {
        Self(boxes)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, b: GridBox) {
        self.0.push(b);
    }

    #[inline]
    pub fn get(&self, i: usize) -> &GridBox {
        &self.0[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &GridBox> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[GridBox] {
        &self.0
    }

    /// Sum of box volumes.
    pub fn volume(&self) -> usize {
        self.0.iter().map(GridBox::volume).sum()
    }

    /// Apply `f` to every box, keeping positions.
    pub fn map(&self, f: impl Fn(&GridBox) -> GridBox) -> BoxArray {
        BoxArray(self.0.iter().map(f).collect())
    }

    /// Remove every box in `other` from every box of `self`; the result is
    /// a disjoint cover of the remaining points.
    pub fn subtract_array(&mut self, other: &[GridBox]) {
        for cut in other {
            let mut next = Vec::with_capacity(self.0.len());
            for b in &self.0 {
                next.extend(b.subtract(cut));
            }
            self.0 = next;
        }
    }
}

impl FromIterator<GridBox> for BoxArray {
    fn from_iter<I: IntoIterator<Item = GridBox>>(iter: I) -> Self {
        BoxArray(iter.into_iter().collect())
    }
}

impl IntoIterator for BoxArray {
    type Item = GridBox;
    type IntoIter = std::vec::IntoIter<GridBox>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a BoxArray {
    type Item = &'a GridBox;
    type IntoIter = std::slice::Iter<'a, GridBox>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b2(lo: [i32; 2], hi: [i32; 2]) -> GridBox {
        GridBox::new(2, [lo[0], lo[1], 0], [hi[0], hi[1], 0])
    }

    #[test]
    fn volume_and_rank() {
        let b = b2([0, 0], [3, 2]);
        assert_eq!(b.volume(), 12);
        assert_eq!(b.index_rank([0, 0, 0]), 0);
        assert_eq!(b.index_rank([1, 1, 0]), 5);
        assert_eq!(b.offset_distance([0, 1, 0]), 4);
        assert_eq!(b.offset_distance([-1, -1, 0]), -5);
    }

    #[test]
    fn empty_box_has_zero_volume() {
        assert!(GridBox::empty(3).is_empty());
        assert!(b2([2, 0], [1, 5]).is_empty());
    }

    #[test]
    fn subtract_center_leaves_frame() {
        let outer = b2([0, 0], [4, 4]);
        let inner = b2([1, 1], [3, 3]);
        let pieces = outer.subtract(&inner);
        let vol: usize = pieces.iter().map(GridBox::volume).sum();
        assert_eq!(vol, 25 - 9);
        for p in &pieces {
            assert!(p.intersect(&inner).is_empty());
        }
    }

    #[test]
    fn project_onto_stride() {
        let b = GridBox::new(1, [-3, 0, 0], [6, 0, 0]);
        let p = b.project([1, 0, 0], [2, 1, 1]);
        assert_eq!(p.imin()[0], -3);
        assert_eq!(p.imax()[0], 5);
        assert_eq!(p.stride_size([2, 1, 1])[0], 5);
    }

    #[test]
    fn points_iterate_dim0_fastest() {
        let b = b2([0, 0], [1, 1]);
        let pts: Vec<_> = b.points().collect();
        assert_eq!(pts, vec![[0, 0, 0], [1, 0, 0], [0, 1, 0], [1, 1, 0]]);
    }

    #[test]
    fn grow_and_map() {
        let b = GridBox::new(1, [0, 0, 0], [3, 0, 0]);
        let g = b.grow(&[1, 2, 0, 0, 0, 0]);
        assert_eq!((g.imin()[0], g.imax()[0]), (-1, 5));
        let m = g.map_floor([2, 1, 1]);
        assert_eq!((m.imin()[0], m.imax()[0]), (-1, 2));
    }
}
