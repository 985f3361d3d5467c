//! Integer grid indices.
//!
//! An [`Index`] always carries `MAX_DIM` components; dimensions past the
//! active `ndim` are kept at zero so that boxes and offsets of any dimension
//! share one representation.

/// Maximum supported grid dimension.
pub const MAX_DIM: usize = 3;

/// A point or offset in an integer index space.
pub type Index = [i32; MAX_DIM];

/// Ghost widths stored as `[lo_0, hi_0, lo_1, hi_1, lo_2, hi_2]`.
pub type GhostWidth = [i32; 2 * MAX_DIM];

/// The all-zero index.
pub const ZERO: Index = [0; MAX_DIM];

/// Index with every active component set to `v` and the rest zero.
#[inline]
pub fn splat(ndim: usize, v: i32) -> Index {
    let mut out = ZERO;
    for d in out.iter_mut().take(ndim) {
        *d = v;
    }
    out
}

/// Unit stride for `ndim` active dimensions (inactive dimensions are also 1
/// so that stride arithmetic never divides by zero).
#[inline]
pub fn unit_stride() -> Index {
    [1; MAX_DIM]
}

/// Component-wise sum.
#[inline]
pub fn add(a: Index, b: Index) -> Index {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Component-wise difference.
#[inline]
pub fn sub(a: Index, b: Index) -> Index {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Component-wise negation.
#[inline]
pub fn neg(a: Index) -> Index {
    [-a[0], -a[1], -a[2]]
}

/// True when all active components are zero.
#[inline]
pub fn is_zero(a: Index, ndim: usize) -> bool {
    a.iter().take(ndim).all(|&v| v == 0)
}

/// Copy an index, zeroing components past `ndim`.
#[inline]
pub fn truncate(a: Index, ndim: usize) -> Index {
    let mut out = ZERO;
    out[..ndim].copy_from_slice(&a[..ndim]);
    out
}

/// Divide by `divisor`, rounding toward negative infinity.
#[inline]
pub fn floor_div(value: i32, divisor: i32) -> i32 {
    let mut v = value;
    if v % divisor < 0 {
        v -= divisor;
    }
    v / divisor
}

/// Map an index into a coarser index space by per-axis floor division.
#[inline]
pub fn map_floor(index: Index, map: Index, ndim: usize) -> Index {
    let mut out = index;
    for d in 0..ndim {
        out[d] = floor_div(index[d], map[d]);
    }
    out
}
