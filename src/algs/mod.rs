//! Communication schedules and the stencil kernels built on them.

pub mod comm_info;
pub mod comm_pkg;
pub mod communicator;
pub mod compute_pkg;
pub mod matvec;
pub mod residual;
pub mod wire;

pub use comm_info::CommInfo;
pub use comm_pkg::{CommHandle, CommPkg};
pub use compute_pkg::ComputePkg;
pub use matvec::{ComputeState, StructMatvec, struct_matvec};
pub use residual::{ResidualOptions, StructResidual, struct_residual};
