//! Distributed structured grids.
//!
//! A [`StructGrid`] records every box of the global partition (so that any
//! rank can answer neighbor queries without communication) together with the
//! subset owned by the local rank. Grids are immutable once built and shared
//! through `Arc`; the last owner frees them.

use std::mem::size_of;
use std::sync::Arc;

use crate::algs::communicator::{Communicator, Wait, tags};
use crate::algs::wire::{WireBox, WireCount, cast_slice, collect_from, expect_exact_len};
use crate::geometry::box_manager::BoxManager;
use crate::geometry::grid_box::{BoxArray, GridBox};
use crate::geometry::index::{GhostWidth, Index, MAX_DIM, ZERO};
use crate::struct_error::StructError;

/// A distributed box partition of a logically rectangular index space.
#[derive(Clone, Debug)]
pub struct StructGrid {
    ndim: usize,
    rank: usize,
    boxes: BoxArray,
    manager: BoxManager,
    periodic: Index,
    num_ghost: GhostWidth,
    global_size: usize,
}

impl StructGrid {
    #[inline]
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Rank this view of the grid was built for.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Boxes owned by this rank, in local order.
    #[inline]
    pub fn boxes(&self) -> &BoxArray {
        &self.boxes
    }

    #[inline]
    pub fn manager(&self) -> &BoxManager {
        &self.manager
    }

    /// Period per axis; 0 means not periodic.
    #[inline]
    pub fn periodic(&self) -> Index {
        self.periodic
    }

    /// Default ghost width for data laid out on this grid.
    #[inline]
    pub fn num_ghost(&self) -> GhostWidth {
        self.num_ghost
    }

    /// Number of points over all ranks.
    #[inline]
    pub fn global_size(&self) -> usize {
        self.global_size
    }
}

/// Collects boxes and grid attributes, then builds a [`StructGrid`].
#[derive(Clone, Debug)]
pub struct StructGridBuilder {
    ndim: usize,
    boxes: Vec<(usize, GridBox)>,
    periodic: Index,
    num_ghost: GhostWidth,
}

impl StructGridBuilder {
    pub fn new(ndim: usize) -> Self {
        let mut num_ghost = [0; 2 * MAX_DIM];
        for g in num_ghost.iter_mut().take(2 * ndim.min(MAX_DIM)) {
            *g = 1;
        }
        Self {
            ndim,
            boxes: Vec::new(),
            periodic: ZERO,
            num_ghost,
        }
    }

    /// Add a box owned by `proc`.
    pub fn add_box(mut self, proc: usize, b: GridBox) -> Self {
        self.boxes.push((proc, b));
        self
    }

    pub fn periodic(mut self, periodic: Index) -> Self {
        self.periodic = periodic;
        self
    }

    pub fn num_ghost(mut self, num_ghost: GhostWidth) -> Self {
        self.num_ghost = num_ghost;
        self
    }

    /// Build the view of the grid seen by `rank`.
    ///
    /// Boxes keep their insertion order within each owner; owners are
    /// ordered by rank.
    pub fn build(self, rank: usize) -> Result<Arc<StructGrid>, StructError> {
        if !(1..=MAX_DIM).contains(&self.ndim) {
            return Err(StructError::InvalidDimension(self.ndim));
        }
        if let Some((_, b)) = self.boxes.iter().find(|(_, b)| b.ndim() != self.ndim) {
            return Err(StructError::InvalidDimension(b.ndim()));
        }

        let mut ordered = self.boxes;
        ordered.sort_by_key(|&(proc, _)| proc);

        for i in 0..ordered.len() {
            for j in i + 1..ordered.len() {
                if !ordered[i].1.intersect(&ordered[j].1).is_empty() {
                    return Err(StructError::OverlappingBoxes(i, j));
                }
            }
        }

        let mut triples = Vec::with_capacity(ordered.len());
        let mut boxes = BoxArray::new();
        let mut next_local = 0usize;
        let mut current = usize::MAX;
        for &(proc, b) in &ordered {
            if proc != current {
                current = proc;
                next_local = 0;
            }
            triples.push((proc, next_local, b));
            next_local += 1;
            if proc == rank {
                boxes.push(b);
            }
        }

        let global_size = ordered.iter().map(|(_, b)| b.volume()).sum();
        let manager = BoxManager::new(self.ndim, &triples, self.periodic);
        log::debug!(
            "grid built for rank {rank}: {} local / {} global boxes, {global_size} points",
            boxes.len(),
            triples.len()
        );

        Ok(Arc::new(StructGrid {
            ndim: self.ndim,
            rank,
            boxes,
            manager,
            periodic: self.periodic,
            num_ghost: self.num_ghost,
            global_size,
        }))
    }

    /// Collective build: every rank contributes its own boxes and receives
    /// everyone else's. Boxes already added to the builder are kept.
    pub fn assemble<C: Communicator>(
        mut self,
        comm: &C,
        local_boxes: &[GridBox],
    ) -> Result<Arc<StructGrid>, StructError> {
        let me = comm.rank();
        let peers: Vec<usize> = (0..comm.size()).filter(|&p| p != me).collect();
        let count_tag = tags::GRID_ASSEMBLE;
        let box_tag = tags::GRID_ASSEMBLE.offset(1);

        // Phase 1: counts.
        let recv_counts: Vec<_> = peers
            .iter()
            .map(|&p| (p, comm.irecv(p, count_tag.as_u16(), size_of::<WireCount>())))
            .collect();
        let count = WireCount::new(local_boxes.len());
        let sends: Vec<_> = peers
            .iter()
            .map(|&p| comm.isend(p, count_tag.as_u16(), cast_slice(std::slice::from_ref(&count))))
            .collect();

        let mut maybe_err = None;
        let mut counts = Vec::with_capacity(peers.len());
        for (p, h) in recv_counts {
            let n = match h.wait() {
                Some(data) => match expect_exact_len(data.len(), size_of::<WireCount>()) {
                    Ok(()) => collect_from::<WireCount>(&data)[0].get(),
                    Err(msg) => {
                        maybe_err.get_or_insert(StructError::CommError {
                            neighbor: p,
                            source: msg.into(),
                        });
                        0
                    }
                },
                None => {
                    maybe_err.get_or_insert(StructError::CommError {
                        neighbor: p,
                        source: format!("failed to receive box count from rank {p}").into(),
                    });
                    0
                }
            };
            counts.push((p, n));
        }
        for s in sends {
            let _ = s.wait();
        }
        if let Some(err) = maybe_err {
            return Err(err);
        }

        // Phase 2: boxes.
        let wire: Vec<WireBox> = local_boxes.iter().map(WireBox::of).collect();
        let recv_boxes: Vec<_> = counts
            .iter()
            .map(|&(p, n)| {
                let len = n * size_of::<WireBox>();
                (p, len, comm.irecv(p, box_tag.as_u16(), len))
            })
            .collect();
        let sends: Vec<_> = peers
            .iter()
            .map(|&p| comm.isend(p, box_tag.as_u16(), cast_slice(&wire)))
            .collect();

        let mut gathered: Vec<(usize, Vec<GridBox>)> = Vec::with_capacity(comm.size());
        gathered.push((me, local_boxes.to_vec()));
        for (p, len, h) in recv_boxes {
            match h.wait() {
                Some(data) if data.len() == len => {
                    let boxes = collect_from::<WireBox>(&data).iter().map(WireBox::get).collect();
                    gathered.push((p, boxes));
                }
                other => {
                    let got = other.map_or(0, |d| d.len());
                    maybe_err.get_or_insert(StructError::CommError {
                        neighbor: p,
                        source: format!("expected {len} bytes of boxes, got {got}").into(),
                    });
                }
            }
        }
        for s in sends {
            let _ = s.wait();
        }
        if let Some(err) = maybe_err {
            return Err(err);
        }

        gathered.sort_by_key(|(p, _)| *p);
        for (p, boxes) in gathered {
            for b in boxes {
                self.boxes.push((p, b));
            }
        }
        self.build(me)
    }
}
