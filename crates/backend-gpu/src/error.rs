//! Error taxonomy for the compute backend.

use thiserror::Error;

/// The native compiler rejected the assembled shader. The diagnostic is
/// propagated verbatim; `body_line` tells the learner where their own code
/// begins in the assembled source the diagnostic refers to.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("kernel `{kernel}` failed to compile (kernel body starts at line {body_line} of the assembled source): {diagnostic}")]
pub struct CompileError {
    pub kernel: String,
    pub diagnostic: String,
    pub body_line: usize,
}

/// The launch geometry was rejected before or by the dispatch capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("launch extents must be positive: grid {grid:?}, threadgroup {threadgroup:?}")]
    NonPositiveExtent {
        grid: (u32, u32, u32),
        threadgroup: (u32, u32, u32),
    },
    #[error("thread-group of {invocations} invocations exceeds the device limit of {limit}")]
    GroupTooLarge { invocations: u32, limit: u32 },
    #[error("thread-group extent {extent} on the {axis} axis exceeds the device limit of {limit}")]
    AxisTooLarge {
        axis: &'static str,
        extent: u32,
        limit: u32,
    },
}

/// Any failure the runtime can produce during one execute call.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("device error: {0}")]
    Device(String),
}
