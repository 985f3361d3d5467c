//! Coefficient scalar types.

use std::fmt::{Debug, LowerExp};
use std::str::FromStr;

use bytemuck::Pod;
use num_traits::NumAssign;

/// Numeric type stored in matrices and vectors.
///
/// `Pod` lets coefficient blocks travel as raw bytes during ghost exchange;
/// `LowerExp` and `FromStr` back the text file format.
pub trait Scalar:
    Pod + NumAssign + PartialOrd + Default + Debug + LowerExp + FromStr + Send + Sync + 'static
{
}

impl Scalar for f32 {}
impl Scalar for f64 {}
