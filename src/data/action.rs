//! Read/write actions shared by matrix and vector value operations.

use num_traits::Zero;

/// What a value operation does with each addressed coefficient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueAction {
    /// `stored += value`
    Add,
    /// `stored = value`
    Set,
    /// `value = stored`
    Get,
    /// `value = stored; stored = 0`
    GetAndZero,
}

impl ValueAction {
    /// Apply to one stored coefficient and its caller-side value.
    #[inline]
    pub fn apply<T: Copy + std::ops::AddAssign + Zero>(self, stored: &mut T, value: &mut T) {
        match self {
            ValueAction::Add => *stored += *value,
            ValueAction::Set => *stored = *value,
            ValueAction::Get => *value = *stored,
            ValueAction::GetAndZero => {
                *value = *stored;
                *stored = T::zero();
            }
        }
    }
}

/// Which boxes a value operation visits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValueScope {
    /// Restrict to one local box.
    pub boxnum: Option<usize>,
    /// Match against ghosted data boxes instead of grid boxes, so ghost
    /// points can be addressed.
    pub outside: bool,
}

impl ValueScope {
    pub fn with_ghosts() -> Self {
        Self {
            boxnum: None,
            outside: true,
        }
    }

    pub fn in_box(boxnum: usize) -> Self {
        Self {
            boxnum: Some(boxnum),
            outside: false,
        }
    }

    /// Local box positions to visit out of `nboxes`.
    pub(crate) fn range(&self, nboxes: usize) -> std::ops::Range<usize> {
        match self.boxnum {
            Some(b) if b < nboxes => b..b + 1,
            Some(_) => 0..0,
            None => 0..nboxes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions() {
        let mut stored = 2.0f64;
        let mut v = 3.0;
        ValueAction::Add.apply(&mut stored, &mut v);
        assert_eq!(stored, 5.0);
        ValueAction::Set.apply(&mut stored, &mut v);
        assert_eq!(stored, 3.0);
        let mut out = 0.0;
        ValueAction::GetAndZero.apply(&mut stored, &mut out);
        assert_eq!((stored, out), (0.0, 3.0));
    }

    #[test]
    fn scope_range() {
        assert_eq!(ValueScope::default().range(3), 0..3);
        assert_eq!(ValueScope::in_box(1).range(3), 1..2);
        assert_eq!(ValueScope::in_box(5).range(3), 0..0);
    }
}
