//! Native GPU compute capability for PuzzleForge.
//!
//! The harness talks to the GPU through the [`ComputeRuntime`] trait;
//! [`WgpuRuntime`] implements it on wgpu, which maps to Metal on macOS and
//! Vulkan/DX12 elsewhere.

pub mod error;
pub mod runtime;

pub use error::*;
pub use runtime::*;
