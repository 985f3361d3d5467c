//! Pluggable storage for matrix and vector coefficient buffers.
//!
//! Matrices and vectors keep one flat buffer each. [`VecStorage`] owns its
//! memory; [`BorrowedStorage`] wraps a caller-supplied slice so that a
//! matrix can be laid over memory it does not own.

use core::fmt::{self, Debug};

/// Contiguous, indexable storage for `V` with slice access.
pub trait Storage<V>: Debug {
    /// Current length in elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entire read-only buffer.
    fn as_slice(&self) -> &[V];

    /// Entire mutable buffer.
    fn as_mut_slice(&mut self) -> &mut [V];
}

/// Storage that can allocate itself.
pub trait OwnedStorage<V>: Storage<V> + Sized {
    /// Construct a buffer of `len`, filled with `fill`.
    fn with_len(len: usize, fill: V) -> Self
    where
        V: Clone;
}

/// `Vec`-backed storage (default).
#[derive(Clone)]
pub struct VecStorage<V>(pub(crate) Vec<V>);

impl<V> Debug for VecStorage<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecStorage")
            .field("len", &self.0.len())
            .finish()
    }
}

impl<V> Storage<V> for VecStorage<V> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn as_slice(&self) -> &[V] {
        &self.0
    }

    fn as_mut_slice(&mut self) -> &mut [V] {
        &mut self.0
    }
}

impl<V> OwnedStorage<V> for VecStorage<V> {
    fn with_len(len: usize, fill: V) -> Self
    where
        V: Clone,
    {
        Self(vec![fill; len])
    }
}

impl<V> From<Vec<V>> for VecStorage<V> {
    fn from(v: Vec<V>) -> Self {
        Self(v)
    }
}

/// Caller-owned memory adopted by a matrix or vector.
pub struct BorrowedStorage<'a, V>(&'a mut [V]);

impl<'a, V> BorrowedStorage<'a, V> {
    pub fn new(buf: &'a mut [V]) -> Self {
        Self(buf)
    }
}

impl<V> Debug for BorrowedStorage<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BorrowedStorage")
            .field("len", &self.0.len())
            .finish()
    }
}

impl<V> Storage<V> for BorrowedStorage<'_, V> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn as_slice(&self) -> &[V] {
        self.0
    }

    fn as_mut_slice(&mut self) -> &mut [V] {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrowed_storage_writes_through() {
        let mut buf = vec![0i32; 3];
        {
            let mut s = BorrowedStorage::new(&mut buf);
            s.as_mut_slice()[2] = 7;
            assert_eq!(s.len(), 3);
        }
        assert_eq!(buf, vec![0, 0, 7]);
    }
}
