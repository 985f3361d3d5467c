//! Global box directory for spatial neighbor queries.
//!
//! Every process keeps the full list of grid boxes together with their
//! owning rank and position in that rank's local box array. Periodic grids
//! add translated images of each box (shifts of -1, 0, +1 periods along each
//! periodic axis), so that a query near the domain edge also finds the
//! wrap-around neighbors.

use itertools::Itertools;

use crate::geometry::grid_box::GridBox;
use crate::geometry::index::{Index, ZERO};

/// One box (or periodic image) known to the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxManEntry {
    /// Extent, already translated by `shift`.
    pub extent: GridBox,
    /// Owning rank.
    pub proc: usize,
    /// Position in the owner's local box array.
    pub local_index: usize,
    /// Periodic translation applied to the original box.
    pub shift: Index,
}

impl BoxManEntry {
    /// True for the untranslated copy of a box.
    pub fn is_base(&self) -> bool {
        self.shift == ZERO
    }
}

/// Spatial directory of all boxes of a grid.
#[derive(Clone, Debug, Default)]
pub struct BoxManager {
    entries: Vec<BoxManEntry>,
    num_base: usize,
}

impl BoxManager {
    /// Build from `(proc, local_index, box)` triples in global order.
    pub fn new(ndim: usize, boxes: &[(usize, usize, GridBox)], periodic: Index) -> Self {
        let mut entries: Vec<BoxManEntry> = boxes
            .iter()
            .map(|&(proc, local_index, extent)| BoxManEntry {
                extent,
                proc,
                local_index,
                shift: ZERO,
            })
            .collect();
        let num_base = entries.len();

        let axes: Vec<usize> = (0..ndim).filter(|&d| periodic[d] > 0).collect();
        if !axes.is_empty() {
            let shifts: Vec<Index> = axes
                .iter()
                .map(|_| -1..=1)
                .multi_cartesian_product()
                .filter(|m: &Vec<i32>| m.iter().any(|&v| v != 0))
                .map(|m| {
                    let mut s = ZERO;
                    for (&d, &k) in axes.iter().zip(m.iter()) {
                        s[d] = k * periodic[d];
                    }
                    s
                })
                .collect();
            for &(proc, local_index, extent) in boxes {
                for &shift in &shifts {
                    entries.push(BoxManEntry {
                        extent: extent.shift(shift),
                        proc,
                        local_index,
                        shift,
                    });
                }
            }
        }
        Self { entries, num_base }
    }

    /// Untranslated entries, in global order.
    pub fn base_entries(&self) -> &[BoxManEntry] {
        &self.entries[..self.num_base]
    }

    /// All entries including periodic images.
    pub fn entries(&self) -> &[BoxManEntry] {
        &self.entries
    }

    /// Entries whose extent overlaps `query`.
    pub fn intersect(&self, query: &GridBox) -> Vec<&BoxManEntry> {
        self.entries
            .iter()
            .filter(|e| !e.extent.intersect(query).is_empty())
            .collect()
    }
}
