//! Per-rank text files for structured matrices.
//!
//! # Format
//! One file per rank, named `<path>.<rank:05>`:
//!
//! ```text
//! StructMatrix
//!
//! Symmetric: 1
//!
//! ConstantCoefficient: 0
//!
//! Grid:
//! 1
//! 2
//! 0:  (0)  x  (3)
//! 1:  (4)  x  (7)
//!
//! Periodic: 0 0 0
//!
//! Stencil:
//! 2
//! 0: -1
//! 1: 0
//!
//! Constant Data:
//!
//! Data:
//! 0: (0; 0) -1.00000000000000e0
//! ```
//!
//! The grid section lists this rank's boxes; the stencil section lists the
//! stored entries with their full-stencil index. Constant data lines read
//! `*: (*; entry) value`; data lines read `box: (index; entry) value`, one
//! line per point and stored variable entry, dimension 0 fastest.
//!
//! Values are written with 14 fractional digits, so a read reproduces
//! them bit for bit only when they are exactly representable at that
//! precision.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::algs::communicator::Communicator;
use crate::data::action::{ValueAction, ValueScope};
use crate::data::scalar::Scalar;
use crate::data::storage::{Storage, VecStorage};
use crate::data::struct_matrix::{ConstantCoefficient, StructMatrix};
use crate::geometry::grid_box::GridBox;
use crate::geometry::index::{GhostWidth, Index, ZERO};
use crate::grid::StructGridBuilder;
use crate::stencil::StructStencil;
use crate::struct_error::StructError;

/// Name of the file written by `rank` for `path`.
pub fn rank_file_name(path: &Path, rank: usize) -> String {
    format!("{}.{rank:05}", path.display())
}

fn io_err(path: &str) -> impl Fn(std::io::Error) -> StructError + '_ {
    move |e| StructError::Io {
        path: path.to_string(),
        message: e.to_string(),
    }
}

fn fmt_index(index: Index, ndim: usize) -> String {
    index[..ndim]
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl<T: Scalar, S: Storage<T>> StructMatrix<T, S> {
    /// Write this rank's part of the matrix. With `all`, ghost points are
    /// included in the data section.
    pub fn write_to<W: Write>(&self, w: &mut W, all: bool) -> std::io::Result<()> {
        let layout = self
            .layout()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let data = self
            .data()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let grid = self.grid();
        let ndim = grid.ndim();

        writeln!(w, "StructMatrix")?;
        writeln!(w, "\nSymmetric: {}", u8::from(layout.symmetric))?;
        writeln!(w, "\nConstantCoefficient: {}", self.constant_coefficient().tag())?;

        writeln!(w, "\nGrid:")?;
        writeln!(w, "{ndim}")?;
        writeln!(w, "{}", grid.boxes().len())?;
        for (i, b) in grid.boxes().iter().enumerate() {
            writeln!(
                w,
                "{i}:  ({})  x  ({})",
                fmt_index(b.imin(), ndim),
                fmt_index(b.imax(), ndim)
            )?;
        }
        let p = grid.periodic();
        writeln!(w, "\nPeriodic: {} {} {}", p[0], p[1], p[2])?;

        writeln!(w, "\nStencil:")?;
        let stored: Vec<usize> = (0..layout.stencil.size())
            .filter(|&s| layout.is_stored(s))
            .collect();
        writeln!(w, "{}", stored.len())?;
        for &s in &stored {
            let off: Vec<String> = layout.stencil.offset(s)[..ndim]
                .iter()
                .map(|v| v.to_string())
                .collect();
            writeln!(w, "{s}: {}", off.join(" "))?;
        }

        writeln!(w, "\nConstant Data:")?;
        if layout.data_size > 0 {
            for &s in stored.iter().filter(|&&s| layout.constant[s]) {
                writeln!(w, "*: (*; {s}) {:.14e}", data[s])?;
            }
        }

        writeln!(w, "\nData:")?;
        let variable: Vec<usize> = stored
            .iter()
            .copied()
            .filter(|&s| !layout.constant[s])
            .collect();
        for (b, gbox) in grid.boxes().iter().enumerate() {
            let dbox = layout.data_space.get(b);
            let region = if all { *dbox } else { layout.map_box(gbox) };
            for p in region.points() {
                let rank = dbox.index_rank(p) as isize;
                for &s in &variable {
                    let v = data[(layout.data_indices[b][s] + rank) as usize];
                    writeln!(w, "{b}: ({}; {s}) {v:.14e}", fmt_index(p, ndim))?;
                }
            }
        }
        Ok(())
    }

    /// Write this rank's file `<path>.<rank:05>`.
    pub fn print(&self, path: impl AsRef<Path>, all: bool) -> Result<(), StructError> {
        let name = rank_file_name(path.as_ref(), self.grid().rank());
        let file = File::create(&name).map_err(io_err(&name))?;
        let mut w = BufWriter::new(file);
        self.write_to(&mut w, all).map_err(io_err(&name))?;
        w.flush().map_err(io_err(&name))?;
        log::debug!("matrix written to {name}");
        Ok(())
    }
}

fn strip_parens(s: &str) -> &str {
    s.trim().trim_start_matches('(').trim_end_matches(')')
}

/// Line cursor that reports positions in parse errors.
struct LineCursor<'a> {
    name: &'a str,
    lines: std::iter::Peekable<std::iter::Enumerate<std::str::Lines<'a>>>,
    last: usize,
}

impl<'a> LineCursor<'a> {
    fn new(name: &'a str, text: &'a str) -> Self {
        Self {
            name,
            lines: text.lines().enumerate().peekable(),
            last: 0,
        }
    }

    fn err(&self, message: impl Into<String>) -> StructError {
        StructError::Parse {
            path: self.name.to_string(),
            line: self.last,
            message: message.into(),
        }
    }

    /// Next non-blank line, trimmed.
    fn next(&mut self) -> Result<&'a str, StructError> {
        for (n, line) in self.lines.by_ref() {
            self.last = n + 1;
            let t = line.trim();
            if !t.is_empty() {
                return Ok(t);
            }
        }
        Err(self.err("unexpected end of file"))
    }

    fn peek_is(&mut self, pred: impl Fn(&str) -> bool) -> bool {
        while let Some((_, line)) = self.lines.peek() {
            if line.trim().is_empty() {
                self.lines.next();
            } else {
                return pred(line.trim());
            }
        }
        false
    }

    fn is_done(&mut self) -> bool {
        !self.peek_is(|_| true)
    }

    fn expect(&mut self, header: &str) -> Result<(), StructError> {
        let line = self.next()?;
        if line == header {
            Ok(())
        } else {
            Err(self.err(format!("expected `{header}`, found `{line}`")))
        }
    }

    /// `key: value` on one line.
    fn field<V: std::str::FromStr>(&mut self, key: &str) -> Result<V, StructError> {
        let line = self.next()?;
        let rest = line
            .strip_prefix(key)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| self.err(format!("expected `{key}:`")))?;
        self.parse(rest.trim())
    }

    fn parse<V: std::str::FromStr>(&self, raw: &str) -> Result<V, StructError> {
        raw.trim()
            .parse::<V>()
            .map_err(|_| self.err(format!("invalid value `{raw}`")))
    }

    fn parse_index(&self, raw: &str, ndim: usize) -> Result<Index, StructError> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != ndim {
            return Err(self.err(format!("expected {ndim} coordinates in `{raw}`")));
        }
        let mut out = ZERO;
        for (d, p) in parts.iter().enumerate() {
            out[d] = self.parse(p)?;
        }
        Ok(out)
    }

    /// `label: (coords; id) value`, returning the raw pieces.
    fn split_value_line(&self, line: &'a str) -> Result<(&'a str, &'a str, &'a str, &'a str), StructError> {
        let (label, rest) = line
            .split_once(':')
            .ok_or_else(|| self.err("missing `:`"))?;
        let rest = rest
            .trim()
            .strip_prefix('(')
            .ok_or_else(|| self.err("missing `(`"))?;
        let (inside, value) = rest.split_once(')').ok_or_else(|| self.err("missing `)`"))?;
        let (coords, id) = inside.split_once(';').ok_or_else(|| self.err("missing `;`"))?;
        Ok((label.trim(), coords.trim(), id.trim(), value.trim()))
    }
}

impl<T: Scalar> StructMatrix<T, VecStorage<T>> {
    /// Collectively read the files written by [`StructMatrix::print`].
    /// Every rank of `comm` reads its own file.
    pub fn read<C: Communicator>(
        comm: &C,
        path: impl AsRef<Path>,
        num_ghost: GhostWidth,
    ) -> Result<Self, StructError> {
        let name = rank_file_name(path.as_ref(), comm.rank());
        let mut text = String::new();
        File::open(&name)
            .and_then(|mut f| f.read_to_string(&mut text))
            .map_err(io_err(&name))?;
        Self::read_from(comm, &name, &text, num_ghost)
    }

    /// Parse one rank's file contents. `name` is only used in errors.
    pub fn read_from<C: Communicator>(
        comm: &C,
        name: &str,
        text: &str,
        num_ghost: GhostWidth,
    ) -> Result<Self, StructError> {
        let mut cur = LineCursor::new(name, text);

        cur.expect("StructMatrix")?;
        let symmetric: u8 = cur.field("Symmetric")?;
        let cc_tag: u8 = cur.field("ConstantCoefficient")?;
        let cc = ConstantCoefficient::from_tag(cc_tag)
            .ok_or_else(|| cur.err(format!("unknown constant coefficient {cc_tag}")))?;

        cur.expect("Grid:")?;
        let line = cur.next()?;
        let ndim: usize = cur.parse(line)?;
        if !(1..=3).contains(&ndim) {
            return Err(StructError::InvalidDimension(ndim));
        }
        let line = cur.next()?;
        let nboxes: usize = cur.parse(line)?;
        let mut local_boxes = Vec::with_capacity(nboxes);
        for _ in 0..nboxes {
            let line = cur.next()?;
            let (_, rest) = line.split_once(':').ok_or_else(|| cur.err("missing `:`"))?;
            let (lo, hi) = rest.split_once(" x ").ok_or_else(|| cur.err("missing ` x `"))?;
            let imin = cur.parse_index(strip_parens(lo), ndim)?;
            let imax = cur.parse_index(strip_parens(hi), ndim)?;
            local_boxes.push(GridBox::new(ndim, imin, imax));
        }
        let periodic_line = cur.next()?;
        let periodic_raw = periodic_line
            .strip_prefix("Periodic:")
            .ok_or_else(|| cur.err("expected `Periodic:`"))?;
        let mut periodic = ZERO;
        for (d, v) in periodic_raw.split_whitespace().take(3).enumerate() {
            periodic[d] = cur.parse(v)?;
        }

        cur.expect("Stencil:")?;
        let line = cur.next()?;
        let nentries: usize = cur.parse(line)?;
        let mut ids = Vec::with_capacity(nentries);
        let mut shape = Vec::with_capacity(nentries);
        for _ in 0..nentries {
            let line = cur.next()?;
            let (id, rest) = line.split_once(':').ok_or_else(|| cur.err("missing `:`"))?;
            let mut off = ZERO;
            let comps: Vec<&str> = rest.split_whitespace().collect();
            if comps.len() != ndim {
                return Err(cur.err(format!("expected {ndim} offset components")));
            }
            for (d, c) in comps.iter().enumerate() {
                off[d] = cur.parse(c)?;
            }
            ids.push(cur.parse::<usize>(id)?);
            shape.push(off);
        }

        let grid = StructGridBuilder::new(ndim)
            .periodic(periodic)
            .assemble(comm, &local_boxes)?;
        let stencil = StructStencil::new(ndim, shape.clone())?;
        let mut matrix: StructMatrix<T> = StructMatrix::new(grid, stencil);
        matrix.set_symmetric(symmetric != 0)?;
        matrix.set_num_ghost(num_ghost)?;
        matrix.set_constant_coefficient(cc)?;
        matrix.initialize()?;

        // file entry id -> entry of the rebuilt stencil
        let entry_of = |id: usize, cur: &LineCursor<'_>| -> Result<usize, StructError> {
            ids.iter()
                .position(|&i| i == id)
                .and_then(|k| matrix.stencil().element_rank(shape[k]))
                .ok_or_else(|| cur.err(format!("unknown stencil entry {id}")))
        };

        cur.expect("Constant Data:")?;
        let mut constants = Vec::new();
        while cur.peek_is(|l| l.starts_with('*')) {
            let line = cur.next()?;
            let (_, _, id, value) = cur.split_value_line(line)?;
            let s = entry_of(cur.parse(id)?, &cur)?;
            constants.push((s, cur.parse::<T>(value)?));
        }

        cur.expect("Data:")?;
        let mut points = Vec::new();
        while !cur.is_done() {
            let line = cur.next()?;
            let (b, coords, id, value) = cur.split_value_line(line)?;
            let b: usize = cur.parse(b)?;
            let p = cur.parse_index(coords, ndim)?;
            let s = entry_of(cur.parse(id)?, &cur)?;
            points.push((b, p, s, cur.parse::<T>(value)?));
        }

        for (s, v) in constants {
            matrix.set_constant_values(&[s], &[v])?;
        }
        for (b, p, s, mut v) in points {
            matrix.point_values(
                p,
                &[s],
                std::slice::from_mut(&mut v),
                ValueAction::Set,
                ValueScope {
                    boxnum: Some(b),
                    outside: true,
                },
            )?;
        }
        matrix.assemble(comm)?;
        log::debug!("matrix read from {name}");
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::data::struct_matrix::StructMatrixOptions;

    fn sample(opts: StructMatrixOptions) -> StructMatrix<f64> {
        let grid = StructGridBuilder::new(2)
            .add_box(0, GridBox::new(2, [0, 0, 0], [2, 1, 0]))
            .add_box(0, GridBox::new(2, [3, 0, 0], [4, 1, 0]))
            .build(0)
            .unwrap();
        let st = StructStencil::new(2, vec![[0, 0, 0], [-1, 0, 0], [0, -1, 0]]).unwrap();
        let mut a = StructMatrix::new(grid, st).with_options(opts);
        a.initialize().unwrap();
        a
    }

    #[test]
    fn text_roundtrip_symmetric() {
        let mut a = sample(StructMatrixOptions {
            symmetric: true,
            ..Default::default()
        });
        let all = GridBox::new(2, [0, 0, 0], [4, 1, 0]);
        let vals: Vec<f64> = (0..30).map(|v| v as f64 * 0.5 - 3.0).collect();
        a.set_box_values(&all, &[0, 1, 2], &vals).unwrap();
        a.assemble(&NoComm).unwrap();

        let mut buf = Vec::new();
        a.write_to(&mut buf, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("StructMatrix\n\nSymmetric: 1\n"));
        assert!(text.contains("1: -1 0\n"));

        let b: StructMatrix<f64> = StructMatrix::read_from(&NoComm, "mem", &text, a.grid().num_ghost()).unwrap();
        assert!(b.symmetric());
        assert_eq!(b.stencil(), a.stencil());
        assert_eq!(b.data().unwrap(), a.data().unwrap());
    }

    #[test]
    fn text_roundtrip_constant_off_diagonals() {
        let mut a = sample(StructMatrixOptions {
            constant_entries: vec![1, 2],
            ..Default::default()
        });
        a.set_constant_values(&[1, 2], &[-1.0, -0.25]).unwrap();
        let all = GridBox::new(2, [0, 0, 0], [4, 1, 0]);
        a.set_box_values(&all, &[0], &[4.0; 10]).unwrap();
        a.assemble(&NoComm).unwrap();

        let mut buf = Vec::new();
        a.write_to(&mut buf, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("ConstantCoefficient: 2"));
        assert!(text.contains("*: (*; 2) -2.50000000000000e-1"));

        let mut b: StructMatrix<f64> =
            StructMatrix::read_from(&NoComm, "mem", &text, a.grid().num_ghost()).unwrap();
        assert_eq!(b.constant_coefficient(), ConstantCoefficient::AllButDiagonal);
        assert_eq!(b.get_constant_values(&[1, 2]).unwrap(), vec![-1.0, -0.25]);
        assert_eq!(b.get_values([4, 1, 0], &[0]).unwrap(), vec![4.0]);
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let text = "StructMatrix\n\nSymmetric: x\n";
        let err = StructMatrix::<f64>::read_from(&NoComm, "bad", text, [1; 6]).unwrap_err();
        assert_eq!(
            err,
            StructError::Parse {
                path: "bad".into(),
                line: 3,
                message: "invalid value `x`".into()
            }
        );
    }

    #[test]
    fn print_and_read_files() {
        let dir = std::env::temp_dir().join(format!("struct-mv-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("A");
        let mut a = sample(Default::default());
        a.set_values([1, 1, 0], &[0, 1, 2], &[4.0, -1.0, -1.0]).unwrap();
        a.print(&path, false).unwrap();
        assert!(dir.join("A.00000").exists());
        let mut b = StructMatrix::<f64>::read(&NoComm, &path, a.grid().num_ghost()).unwrap();
        assert_eq!(b.get_values([1, 1, 0], &[0, 1, 2]).unwrap(), vec![4.0, -1.0, -1.0]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = StructMatrix::<f64>::read(&NoComm, "/nonexistent/struct-mv/A", [1; 6]).unwrap_err();
        assert!(matches!(err, StructError::Io { .. }));
    }
}
