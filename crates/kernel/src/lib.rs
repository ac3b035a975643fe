//! Kernel data model and WGSL assembly for PuzzleForge.
//!
//! A puzzle author writes a kernel *body* (plus an optional module-scope
//! header) against named input and output arrays. This crate turns that
//! description into a complete, compilable WGSL compute shader with a fixed
//! parameter ordering that the execution backend binds buffers against.

pub mod array;
pub mod assemble;
pub mod geometry;
pub mod scan;
pub mod spec;

pub use array::*;
pub use assemble::*;
pub use geometry::*;
pub use scan::*;
pub use spec::*;
