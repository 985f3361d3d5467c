//! Communication packages: a [`CommInfo`] bound to concrete data layouts.
//!
//! Data for box `i` of a space starts at a cumulative offset and holds
//! `num_values` consecutive blocks of the box's volume (value-major). A
//! message to one peer is the concatenation of its transfers in schedule
//! order; each transfer contributes `num_values` runs of its region's points,
//! dimension 0 fastest.

use std::mem::size_of;

use bytemuck::Pod;

use crate::algs::comm_info::{CommInfo, Transfer};
use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{cast_slice, collect_from};
use crate::geometry::box_loop::BoxLoop;
use crate::geometry::grid_box::{BoxArray, GridBox};
use crate::geometry::index;
use crate::struct_error::StructError;

/// One side (source or destination) of a package.
#[derive(Clone, Debug)]
struct Space {
    boxes: BoxArray,
    offsets: Vec<usize>,
    len: usize,
}

impl Space {
    fn new(boxes: &BoxArray, num_values: usize) -> Self {
        let mut offsets = Vec::with_capacity(boxes.len());
        let mut len = 0;
        for b in boxes {
            offsets.push(len);
            len += num_values * b.volume();
        }
        Self {
            boxes: boxes.clone(),
            offsets,
            len,
        }
    }

    fn for_each_index(&self, t: &Transfer, num_values: usize, mut f: impl FnMut(usize)) {
        let data_box: &GridBox = self.boxes.get(t.local_box);
        let vol = data_box.volume();
        let base = self.offsets[t.local_box];
        let lp = BoxLoop::new(
            t.region.size(),
            [(data_box, t.region.imin(), index::unit_stride())],
        );
        for v in 0..num_values {
            let start = base + v * vol;
            lp.for_each(|[i]| f(start + i));
        }
    }
}

/// A reusable ghost-exchange or redistribution schedule.
#[derive(Clone, Debug)]
pub struct CommPkg {
    info: CommInfo,
    src: Space,
    dst: Space,
    num_values: usize,
    tag: CommTag,
}

impl CommPkg {
    pub fn new(
        info: CommInfo,
        src_space: &BoxArray,
        dst_space: &BoxArray,
        num_values: usize,
        tag: CommTag,
    ) -> Self {
        log::debug!(
            "comm pkg: {} sends, {} recvs, {} local copies, {num_values} values/point",
            info.sends.len(),
            info.recvs.len(),
            info.copies.len()
        );
        Self {
            src: Space::new(src_space, num_values),
            dst: Space::new(dst_space, num_values),
            info,
            num_values,
            tag,
        }
    }

    #[inline]
    pub fn num_values(&self) -> usize {
        self.num_values
    }

    #[inline]
    pub fn info(&self) -> &CommInfo {
        &self.info
    }

    /// Pack and post every send, pack local copies, and post every receive.
    /// Never blocks.
    pub fn initialize<'p, C, T>(
        &'p self,
        comm: &C,
        src: &[T],
    ) -> Result<CommHandle<'p, C, T>, StructError>
    where
        C: Communicator,
        T: Pod,
    {
        if src.len() < self.src.len {
            return Err(StructError::DataSizeMismatch {
                expected: self.src.len,
                found: src.len(),
            });
        }
        let nv = self.num_values;
        let tag = self.tag.as_u16();
        if nv == 0 {
            return Ok(CommHandle::empty(self));
        }

        let recvs = self
            .info
            .recvs
            .iter()
            .enumerate()
            .map(|(b, blk)| {
                let len = blk.num_points() * nv * size_of::<T>();
                (b, len, comm.irecv(blk.peer, tag, len))
            })
            .collect();

        let mut sends = Vec::with_capacity(self.info.sends.len());
        for blk in &self.info.sends {
            let mut buf: Vec<T> = Vec::with_capacity(blk.num_points() * nv);
            for t in &blk.transfers {
                self.src.for_each_index(t, nv, |i| buf.push(src[i]));
            }
            let bytes = cast_slice(&buf);
            log::trace!("send {} bytes to rank {} (tag {tag:#x})", bytes.len(), blk.peer);
            sends.push(comm.isend(blk.peer, tag, bytes));
        }

        let mut copies = Vec::new();
        for c in &self.info.copies {
            self.src.for_each_index(&c.src, nv, |i| copies.push(src[i]));
        }

        Ok(CommHandle {
            pkg: self,
            sends,
            recvs,
            copies,
        })
    }

    /// Blocking exchange from `src` into `dst`.
    pub fn exchange<C: Communicator, T: Pod>(
        &self,
        comm: &C,
        src: &[T],
        dst: &mut [T],
    ) -> Result<(), StructError> {
        self.initialize(comm, src)?.finalize(dst)
    }

    /// Blocking exchange where source and destination share one buffer.
    pub fn exchange_in_place<C: Communicator, T: Pod>(
        &self,
        comm: &C,
        data: &mut [T],
    ) -> Result<(), StructError> {
        self.initialize(comm, data)?.finalize(data)
    }
}

/// An exchange in flight. Dropping it without [`CommHandle::finalize`]
/// leaves receives unmatched.
#[must_use = "an exchange must be finalized"]
pub struct CommHandle<'p, C: Communicator, T> {
    pkg: &'p CommPkg,
    sends: Vec<C::SendHandle>,
    recvs: Vec<(usize, usize, C::RecvHandle)>,
    copies: Vec<T>,
}

impl<'p, C: Communicator, T: Pod> CommHandle<'p, C, T> {
    fn empty(pkg: &'p CommPkg) -> Self {
        Self {
            pkg,
            sends: Vec::new(),
            recvs: Vec::new(),
            copies: Vec::new(),
        }
    }

    /// Wait for every message and unpack into `dst`. All handles are drained
    /// even when one of them fails; the first failure is returned.
    pub fn finalize(self, dst: &mut [T]) -> Result<(), StructError> {
        let pkg = self.pkg;
        let nv = pkg.num_values;
        if nv > 0 && dst.len() < pkg.dst.len {
            for (_, _, h) in self.recvs {
                let _ = h.wait();
            }
            for s in self.sends {
                let _ = s.wait();
            }
            return Err(StructError::DataSizeMismatch {
                expected: pkg.dst.len,
                found: dst.len(),
            });
        }

        let mut values = self.copies.into_iter();
        for c in &pkg.info.copies {
            pkg.dst.for_each_index(&c.dst, nv, |i| {
                if let Some(v) = values.next() {
                    dst[i] = v;
                }
            });
        }

        let mut maybe_err = None;
        for (b, len, h) in self.recvs {
            let blk = &pkg.info.recvs[b];
            match h.wait() {
                Some(data) if data.len() == len => {
                    log::trace!("recv {len} bytes from rank {}", blk.peer);
                    if maybe_err.is_none() {
                        let vals: Vec<T> = collect_from(&data);
                        let mut it = vals.into_iter();
                        for t in &blk.transfers {
                            pkg.dst.for_each_index(t, nv, |i| {
                                if let Some(v) = it.next() {
                                    dst[i] = v;
                                }
                            });
                        }
                    }
                }
                other => {
                    let got = other.map_or(0, |d| d.len());
                    maybe_err.get_or_insert(StructError::CommError {
                        neighbor: blk.peer,
                        source: format!("expected {len} bytes, got {got}").into(),
                    });
                }
            }
        }

        for s in self.sends {
            let _ = s.wait();
        }

        match maybe_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
