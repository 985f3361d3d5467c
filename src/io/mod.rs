//! Text I/O for structured matrices.
//!
//! Each rank writes and reads its own file; see [`matrix_file`] for the
//! format.

pub mod matrix_file;

pub use matrix_file::rank_file_name;
