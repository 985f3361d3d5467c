//! Box geometry: indices, boxes, strided box loops and the box manager.

pub mod box_loop;
pub mod box_manager;
pub mod grid_box;
pub mod index;

pub use box_loop::BoxLoop;
pub use box_manager::{BoxManEntry, BoxManager};
pub use grid_box::{BoxArray, GridBox};
pub use index::{GhostWidth, Index, MAX_DIM};
