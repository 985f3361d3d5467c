//! StructError: Unified error type for struct-mv public APIs
//!
//! Every condition that a structured-grid matrix or vector operation can
//! detect is surfaced here as a typed variant, so callers see the failure at
//! the call site instead of polling shared state after a batch of calls.

use thiserror::Error;

use crate::geometry::index::Index;

/// Unified error type for struct-mv operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StructError {
    /// Dimension outside `1..=MAX_DIM`, or two objects disagree on it.
    #[error("invalid dimension {0} (expected 1..=3 and consistent across objects)")]
    InvalidDimension(usize),
    /// Range/domain refinement ratios contradict each other or do not divide evenly.
    #[error("inconsistent range/domain maps: rmap={rmap:?}, dmap={dmap:?}")]
    InconsistentMaps { rmap: Index, dmap: Index },
    /// Mix of constant and variable stencil entries that is not one of the
    /// three supported classes (none, all, all-but-diagonal).
    #[error("unsupported constant-coefficient pattern: {nconst} of {stencil_size} entries constant")]
    InvalidConstantPattern { nconst: usize, stencil_size: usize },
    /// A constant stencil entry was addressed through a per-point value path.
    #[error("stencil entry {entry} is constant; use the constant-values path")]
    ConstantEntryThroughVariablePath { entry: usize },
    /// A variable stencil entry was addressed through the constant-values path.
    #[error("stencil entry {entry} is not constant")]
    VariableEntryThroughConstantPath { entry: usize },
    /// Stencil entry index past the end of the stencil.
    #[error("stencil entry {entry} out of range (stencil size {size})")]
    StencilIndexOutOfRange { entry: usize, size: usize },
    /// Local box index past the number of local boxes.
    #[error("local box {boxnum} out of range ({nboxes} local boxes)")]
    BoxIndexOutOfRange { boxnum: usize, nboxes: usize },
    /// Two boxes of a grid overlap.
    #[error("grid boxes {0} and {1} overlap")]
    OverlappingBoxes(usize, usize),
    /// Data was accessed before the object was initialized.
    #[error("{0} used before initialization")]
    NotInitialized(&'static str),
    /// Layout-affecting setter called after the layout was computed.
    #[error("{0} cannot change after the storage layout is computed")]
    LayoutFrozen(&'static str),
    /// Compute object used out of its `setup → compute* → finalize` order.
    #[error("invalid state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },
    /// A vector's ghost layer is too thin for the stencil reach.
    #[error("box {box_index}: ghost layer too thin for stencil reach")]
    InsufficientGhost { box_index: usize },
    /// Kernel requires range and domain to share one index space.
    #[error("operation not supported for rectangular matrices")]
    RectangularUnsupported,
    /// Source and destination matrices of a migration disagree.
    #[error("migrate mismatch: {0}")]
    MigrateMismatch(String),
    /// An adopted buffer does not match the computed data size.
    #[error("data buffer has {found} entries, layout needs {expected}")]
    DataSizeMismatch { expected: usize, found: usize },
    /// A values slice is shorter than the operation requires.
    #[error("values slice has {found} entries, operation needs {expected}")]
    ValueLengthMismatch { expected: usize, found: usize },
    /// Communication with a neighbor failed.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: CommFailure,
    },
    /// A file could not be opened or written.
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
    /// A file did not match the expected text format.
    #[error("parse error in {path} line {line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },
}

/// Opaque description of a communication failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CommFailure(pub String);

impl From<String> for CommFailure {
    fn from(s: String) -> Self {
        CommFailure(s)
    }
}

impl From<&str> for CommFailure {
    fn from(s: &str) -> Self {
        CommFailure(s.to_string())
    }
}
