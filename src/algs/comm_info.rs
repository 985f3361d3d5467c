//! Communication schedules derived from box overlap.
//!
//! Every rank enumerates the same global list of transfers (source box
//! region → destination box region) in the same order, then keeps the ones
//! it takes part in. Because both ends derive their lists independently from
//! identical input, the sender's packing order always matches the receiver's
//! unpacking order and no schedule needs to be exchanged.

use std::collections::BTreeMap;

use crate::geometry::grid_box::GridBox;
use crate::geometry::index::{self, GhostWidth, Index};
use crate::grid::StructGrid;
use crate::stencil::StructStencil;

/// One region moved between two local boxes of different ranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    /// Local box index on this rank.
    pub local_box: usize,
    /// Region in that box's index space.
    pub region: GridBox,
}

/// All transfers exchanged with one peer, in schedule order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommBlock {
    pub peer: usize,
    pub transfers: Vec<Transfer>,
}

impl CommBlock {
    /// Points moved per value.
    pub fn num_points(&self) -> usize {
        self.transfers.iter().map(|t| t.region.volume()).sum()
    }
}

/// A transfer whose source and destination both live on this rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalCopy {
    pub src: Transfer,
    pub dst: Transfer,
}

/// This rank's share of a global communication schedule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommInfo {
    pub sends: Vec<CommBlock>,
    pub recvs: Vec<CommBlock>,
    pub copies: Vec<LocalCopy>,
}

struct GlobalTransfer {
    src_proc: usize,
    src: Transfer,
    dst_proc: usize,
    dst: Transfer,
}

impl CommInfo {
    /// Ghost exchange for data on `grid` with ghost layers of `num_ghost`.
    pub fn from_num_ghost(grid: &StructGrid, num_ghost: &GhostWidth) -> Self {
        let transfers = enumerate(grid, grid, |b| b.grow(num_ghost), true);
        Self::filter(grid.rank(), transfers)
    }

    /// Ghost exchange covering the reach of `stencil`.
    pub fn from_stencil(grid: &StructGrid, stencil: &StructStencil) -> Self {
        Self::from_num_ghost(grid, &stencil.extents())
    }

    /// Redistribution of owned points from one partition to another.
    pub fn from_grids(from: &StructGrid, to: &StructGrid) -> Self {
        let transfers = enumerate(from, to, |b| *b, false);
        Self::filter(to.rank(), transfers)
    }

    /// Map every region into a coarser index space.
    pub fn map_floor(&self, map: Index) -> Self {
        let map_block = |blk: &CommBlock| CommBlock {
            peer: blk.peer,
            transfers: blk
                .transfers
                .iter()
                .map(|t| Transfer {
                    local_box: t.local_box,
                    region: t.region.map_floor(map),
                })
                .collect(),
        };
        let map_t = |t: &Transfer| Transfer {
            local_box: t.local_box,
            region: t.region.map_floor(map),
        };
        Self {
            sends: self.sends.iter().map(map_block).collect(),
            recvs: self.recvs.iter().map(map_block).collect(),
            copies: self
                .copies
                .iter()
                .map(|c| LocalCopy {
                    src: map_t(&c.src),
                    dst: map_t(&c.dst),
                })
                .collect(),
        }
    }

    /// True when this rank neither sends nor receives.
    pub fn is_local_only(&self) -> bool {
        self.sends.is_empty() && self.recvs.is_empty()
    }

    fn filter(rank: usize, transfers: Vec<GlobalTransfer>) -> Self {
        let mut sends: BTreeMap<usize, Vec<Transfer>> = BTreeMap::new();
        let mut recvs: BTreeMap<usize, Vec<Transfer>> = BTreeMap::new();
        let mut copies = Vec::new();
        for t in transfers {
            match (t.src_proc == rank, t.dst_proc == rank) {
                (true, true) => copies.push(LocalCopy {
                    src: t.src,
                    dst: t.dst,
                }),
                (true, false) => sends.entry(t.dst_proc).or_default().push(t.src),
                (false, true) => recvs.entry(t.src_proc).or_default().push(t.dst),
                (false, false) => {}
            }
        }
        let blocks = |m: BTreeMap<usize, Vec<Transfer>>| {
            m.into_iter()
                .map(|(peer, transfers)| CommBlock { peer, transfers })
                .collect()
        };
        Self {
            sends: blocks(sends),
            recvs: blocks(recvs),
            copies,
        }
    }
}

/// Enumerate every transfer from boxes of `src` into the `reach` of each
/// box of `dst`, in global order.
fn enumerate(
    src: &StructGrid,
    dst: &StructGrid,
    reach: impl Fn(&GridBox) -> GridBox,
    with_images: bool,
) -> Vec<GlobalTransfer> {
    let same_grid = std::ptr::eq(src, dst);
    let candidates = if with_images {
        src.manager().entries()
    } else {
        src.manager().base_entries()
    };

    let mut out = Vec::new();
    for target in dst.manager().base_entries() {
        let want = reach(&target.extent);
        for source in candidates {
            if same_grid
                && source.is_base()
                && source.proc == target.proc
                && source.local_index == target.local_index
            {
                continue;
            }
            let region = want.intersect(&source.extent);
            if region.is_empty() {
                continue;
            }
            out.push(GlobalTransfer {
                src_proc: source.proc,
                src: Transfer {
                    local_box: source.local_index,
                    region: region.shift(index::neg(source.shift)),
                },
                dst_proc: target.proc,
                dst: Transfer {
                    local_box: target.local_index,
                    region,
                },
            });
        }
    }
    out
}
