//! Moving matrix coefficients between two partitions of the same index space.

use super::StructMatrix;
use crate::algs::comm_info::CommInfo;
use crate::algs::comm_pkg::CommPkg;
use crate::algs::communicator::{Communicator, tags};
use crate::data::scalar::Scalar;
use crate::data::storage::Storage;
use crate::struct_error::StructError;

impl<T: Scalar, S: Storage<T>> StructMatrix<T, S> {
    /// Copy every owned coefficient of `self` into `to`, whose grid covers
    /// the same points with a different box decomposition. Ghost
    /// coefficients of `to` are not touched; assemble it afterwards if they
    /// are needed.
    pub fn migrate<C, S2>(&self, comm: &C, to: &mut StructMatrix<T, S2>) -> Result<(), StructError>
    where
        C: Communicator,
        S2: Storage<T>,
    {
        let (from_layout, from_data) = self.parts()?;
        if self.constant_coefficient != to.constant_coefficient {
            return Err(StructError::MigrateMismatch(format!(
                "constant coefficient {} vs {}",
                self.constant_coefficient.tag(),
                to.constant_coefficient.tag()
            )));
        }
        let to_grid = to.grid.clone();
        let (to_layout, to_data) = to.parts_mut()?;
        if from_layout.num_values != to_layout.num_values {
            return Err(StructError::MigrateMismatch(format!(
                "{} values per point vs {}",
                from_layout.num_values, to_layout.num_values
            )));
        }
        if from_layout.stencil.size() != to_layout.stencil.size() {
            return Err(StructError::MigrateMismatch(format!(
                "stencil size {} vs {}",
                from_layout.stencil.size(),
                to_layout.stencil.size()
            )));
        }

        let ss = from_layout.vdata_offset();
        if from_data.len() >= ss && to_data.len() >= ss {
            to_data[..ss].copy_from_slice(&from_data[..ss]);
        }

        let mut info = CommInfo::from_grids(&self.grid, &to_grid);
        if from_layout.domain_is_coarse {
            info = info.map_floor(from_layout.dmap);
        }
        let pkg = CommPkg::new(
            info,
            &from_layout.data_space,
            &to_layout.data_space,
            from_layout.num_values,
            tags::MIGRATE,
        );
        log::debug!(
            "migrate: {} -> {} local boxes, {} values per point",
            from_layout.data_space.len(),
            to_layout.data_space.len(),
            from_layout.num_values
        );
        let src = from_data.get(ss..).unwrap_or_default();
        let dst = to_data.get_mut(ss..).unwrap_or_default();
        pkg.exchange(comm, src, dst)
    }
}
