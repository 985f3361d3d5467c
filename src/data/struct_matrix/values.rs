//! Setting, adding, reading and clearing matrix coefficients.
//!
//! Entries are addressed by position in the full stencil. Mirror entries of
//! a symmetric matrix own no storage and are skipped. Per-point paths
//! reject constant entries and the constant path rejects variable ones; in
//! both cases the remaining entries are still processed and the first
//! error is returned at the end.

use super::StructMatrix;
use super::layout::MatrixLayout;
use crate::data::action::{ValueAction, ValueScope};
use crate::data::scalar::Scalar;
use crate::data::storage::Storage;
use crate::geometry::box_loop::BoxLoop;
use crate::geometry::grid_box::GridBox;
use crate::geometry::index::{self, Index};
use crate::struct_error::StructError;

/// Which per-point entries to touch and the first rejected one.
fn variable_entries(
    layout: &MatrixLayout,
    entries: &[usize],
) -> Result<(Vec<(usize, usize)>, Option<StructError>), StructError> {
    let size = layout.stencil.size();
    let mut maybe_err = None;
    let mut out = Vec::with_capacity(entries.len());
    for (k, &s) in entries.iter().enumerate() {
        if s >= size {
            return Err(StructError::StencilIndexOutOfRange { entry: s, size });
        }
        if !layout.is_stored(s) {
            continue;
        }
        if layout.constant[s] {
            maybe_err.get_or_insert(StructError::ConstantEntryThroughVariablePath { entry: s });
            continue;
        }
        out.push((k, s));
    }
    Ok((out, maybe_err))
}

fn check_len(expected: usize, found: usize) -> Result<(), StructError> {
    if found < expected {
        Err(StructError::ValueLengthMismatch { expected, found })
    } else {
        Ok(())
    }
}

impl<T: Scalar, S: Storage<T>> StructMatrix<T, S> {
    /// Apply `action` to entries `entries` of the row at `index`;
    /// `values[k]` pairs with `entries[k]`.
    pub fn point_values(
        &mut self,
        index: Index,
        entries: &[usize],
        values: &mut [T],
        action: ValueAction,
        scope: ValueScope,
    ) -> Result<(), StructError> {
        check_len(entries.len(), values.len())?;
        let grid = self.grid.clone();
        let (layout, data) = self.parts_mut()?;
        let (targets, maybe_err) = variable_entries(layout, entries)?;

        let boxes = if scope.outside {
            &layout.data_boxes
        } else {
            grid.boxes()
        };
        let dindex = layout.map_index(index);
        for i in scope.range(boxes.len()) {
            if !boxes.get(i).contains(index) {
                continue;
            }
            let rank = layout.data_space.get(i).index_rank(dindex) as isize;
            for &(k, s) in &targets {
                let at = (layout.data_indices[i][s] + rank) as usize;
                action.apply(&mut data[at], &mut values[k]);
            }
        }
        maybe_err.map_or(Ok(()), Err)
    }

    /// Apply `action` over `region`. `values` holds, for each point of
    /// `region` (dimension 0 fastest), one value per entry of `entries`.
    pub fn box_values(
        &mut self,
        region: &GridBox,
        entries: &[usize],
        values: &mut [T],
        action: ValueAction,
        scope: ValueScope,
    ) -> Result<(), StructError> {
        let nentries = entries.len();
        check_len(region.volume() * nentries, values.len())?;
        let grid = self.grid.clone();
        let (layout, data) = self.parts_mut()?;
        let (targets, maybe_err) = variable_entries(layout, entries)?;

        let boxes = if scope.outside {
            &layout.data_boxes
        } else {
            grid.boxes()
        };
        for i in scope.range(boxes.len()) {
            let int = region.intersect(boxes.get(i));
            if int.is_empty() {
                continue;
            }
            let dbox = layout.data_space.get(i);
            if layout.domain_is_coarse {
                for p in int.points() {
                    let rank = dbox.index_rank(layout.map_index(p)) as isize;
                    let vi = region.index_rank(p) * nentries;
                    for &(k, s) in &targets {
                        let at = (layout.data_indices[i][s] + rank) as usize;
                        action.apply(&mut data[at], &mut values[vi + k]);
                    }
                }
                continue;
            }
            let lp = BoxLoop::new(
                int.size(),
                [
                    (dbox, int.imin(), index::unit_stride()),
                    (region, int.imin(), index::unit_stride()),
                ],
            );
            for &(k, s) in &targets {
                let base = layout.data_indices[i][s];
                lp.for_each(|[di, vi]| {
                    let at = (base + di as isize) as usize;
                    action.apply(&mut data[at], &mut values[vi * nentries + k]);
                });
            }
        }
        maybe_err.map_or(Ok(()), Err)
    }

    /// Apply `action` to the shared coefficient of each constant entry.
    pub fn constant_values(
        &mut self,
        entries: &[usize],
        values: &mut [T],
        action: ValueAction,
    ) -> Result<(), StructError> {
        check_len(entries.len(), values.len())?;
        let (layout, data) = self.parts_mut()?;
        let size = layout.stencil.size();
        let mut maybe_err = None;
        for (k, &s) in entries.iter().enumerate() {
            if s >= size {
                return Err(StructError::StencilIndexOutOfRange { entry: s, size });
            }
            if !layout.constant[s] {
                maybe_err.get_or_insert(StructError::VariableEntryThroughConstantPath { entry: s });
                continue;
            }
            // no local boxes means no buffer
            if !layout.is_stored(s) || s >= data.len() {
                continue;
            }
            action.apply(&mut data[s], &mut values[k]);
        }
        maybe_err.map_or(Ok(()), Err)
    }

    pub fn set_values(&mut self, index: Index, entries: &[usize], values: &[T]) -> Result<(), StructError> {
        let mut vals = values.to_vec();
        self.point_values(index, entries, &mut vals, ValueAction::Set, ValueScope::default())
    }

    pub fn add_to_values(
        &mut self,
        index: Index,
        entries: &[usize],
        values: &[T],
    ) -> Result<(), StructError> {
        let mut vals = values.to_vec();
        self.point_values(index, entries, &mut vals, ValueAction::Add, ValueScope::default())
    }

    /// Values of `entries` at `index`; zero where no local box holds it.
    pub fn get_values(&mut self, index: Index, entries: &[usize]) -> Result<Vec<T>, StructError> {
        let mut vals = vec![T::zero(); entries.len()];
        self.point_values(index, entries, &mut vals, ValueAction::Get, ValueScope::default())?;
        Ok(vals)
    }

    pub fn set_box_values(
        &mut self,
        region: &GridBox,
        entries: &[usize],
        values: &[T],
    ) -> Result<(), StructError> {
        let mut vals = values.to_vec();
        self.box_values(region, entries, &mut vals, ValueAction::Set, ValueScope::default())
    }

    pub fn add_to_box_values(
        &mut self,
        region: &GridBox,
        entries: &[usize],
        values: &[T],
    ) -> Result<(), StructError> {
        let mut vals = values.to_vec();
        self.box_values(region, entries, &mut vals, ValueAction::Add, ValueScope::default())
    }

    pub fn get_box_values(&mut self, region: &GridBox, entries: &[usize]) -> Result<Vec<T>, StructError> {
        let mut vals = vec![T::zero(); region.volume() * entries.len()];
        self.box_values(region, entries, &mut vals, ValueAction::Get, ValueScope::default())?;
        Ok(vals)
    }

    /// Zero `entries` at `index`.
    pub fn clear_values(
        &mut self,
        index: Index,
        entries: &[usize],
        scope: ValueScope,
    ) -> Result<(), StructError> {
        let mut scratch = vec![T::zero(); entries.len()];
        self.point_values(index, entries, &mut scratch, ValueAction::GetAndZero, scope)
    }

    /// Zero `entries` over `region`.
    pub fn clear_box_values(
        &mut self,
        region: &GridBox,
        entries: &[usize],
        scope: ValueScope,
    ) -> Result<(), StructError> {
        let mut scratch = vec![T::zero(); region.volume() * entries.len()];
        self.box_values(region, entries, &mut scratch, ValueAction::GetAndZero, scope)
    }

    pub fn set_constant_values(&mut self, entries: &[usize], values: &[T]) -> Result<(), StructError> {
        let mut vals = values.to_vec();
        self.constant_values(entries, &mut vals, ValueAction::Set)
    }

    pub fn add_to_constant_values(&mut self, entries: &[usize], values: &[T]) -> Result<(), StructError> {
        let mut vals = values.to_vec();
        self.constant_values(entries, &mut vals, ValueAction::Add)
    }

    pub fn get_constant_values(&mut self, entries: &[usize]) -> Result<Vec<T>, StructError> {
        let mut vals = vec![T::zero(); entries.len()];
        self.constant_values(entries, &mut vals, ValueAction::Get)?;
        Ok(vals)
    }
}
