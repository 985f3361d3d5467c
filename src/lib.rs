#![cfg_attr(docsrs, feature(doc_cfg))]
//! # struct-mv
//!
//! struct-mv stores sparse matrices and vectors on logically rectangular
//! grids made of index boxes, and applies them with stencil kernels whose
//! ghost exchange overlaps with computation. It targets the inner loops of
//! structured multigrid and Krylov solvers.
//!
//! ## Features
//! - Box-union grids with periodic directions and a box manager for
//!   neighbor lookup
//! - Stencil matrices with symmetric storage, constant coefficients and
//!   coarse/fine range and domain maps
//! - Ghosted vectors and matrices with assemble, clear-boundary and migrate
//! - Matvec `y = alpha A x + beta y` and strided residual `r = b - A x`
//! - Pluggable communication backends (serial, in-process threads, MPI)
//! - Per-rank text files for matrices
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! struct-mv = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon", "check-invariants"]
//! ```
//!
//! ## Determinism
//!
//! Box loops visit points with dimension 0 fastest, and every ghost exchange
//! applies incoming values in a fixed order, so results do not depend on
//! message arrival order.

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod geometry;
pub mod grid;
pub mod io;
pub mod stencil;
pub mod struct_error;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, LocalComm, NoComm};
    pub use crate::algs::{
        ComputeState, ResidualOptions, StructMatvec, StructResidual, struct_matvec,
        struct_residual,
    };
    pub use crate::data::action::{ValueAction, ValueScope};
    pub use crate::data::scalar::Scalar;
    pub use crate::data::struct_matrix::{ConstantCoefficient, StructMatrix, StructMatrixOptions};
    pub use crate::data::struct_vector::StructVector;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::geometry::grid_box::{BoxArray, GridBox};
    pub use crate::geometry::index::{GhostWidth, Index};
    pub use crate::grid::{StructGrid, StructGridBuilder};
    pub use crate::stencil::StructStencil;
    pub use crate::struct_error::StructError;
}
