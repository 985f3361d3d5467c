//! Data module: coefficient storage, structured vectors and matrices.

pub mod action;
pub mod scalar;
pub mod storage;
pub mod struct_matrix;
pub mod struct_vector;

pub use action::{ValueAction, ValueScope};
pub use scalar::Scalar;
pub use storage::{BorrowedStorage, OwnedStorage, Storage, VecStorage};
pub use struct_matrix::{
    ConstantCoefficient, MatrixLayout, StencilEntry, StructMatrix, StructMatrixOptions,
};
pub use struct_vector::StructVector;

/// Alias for the common Vec-backed matrix.
pub type CpuMatrix<T> = StructMatrix<T, VecStorage<T>>;

/// Alias for the common Vec-backed vector.
pub type CpuVector<T> = StructVector<T, VecStorage<T>>;
