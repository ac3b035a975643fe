//! Verification engine: pairs an assembled kernel with host inputs and a
//! reference function, runs it on a [`ComputeRuntime`], and compares the
//! device output against the reference within a tolerance.
//!
//! [`ComputeRuntime`]: puzzleforge_backend_gpu::ComputeRuntime

pub mod problem;
pub mod trace;
pub mod verify;

pub use problem::{CheckError, Problem};
pub use trace::{render_source, thread_map};
pub use verify::{compare, CheckReport, Tolerance, VerificationError};
